// src/driver/simple.rs

//! Plain fork/exec backend: `args[0]` is run with `args[1..]`.

use std::time::Duration;

use tokio::process::Command;

use crate::driver::unit::{StopMethod, UnitTable};
use crate::driver::{DriverFuture, Dyno, DynoDriver};
use crate::errors::{Result, SupervisorError};
use crate::types::{ExitStatus, Release};

#[derive(Debug)]
pub struct SimpleDynoDriver {
    units: UnitTable,
}

impl SimpleDynoDriver {
    pub fn new(stop_timeout: Duration) -> Self {
        Self {
            units: UnitTable::new(stop_timeout),
        }
    }
}

/// Build the command for a dyno's args, with the release environment applied.
pub(crate) fn dyno_command(dyno: &Dyno, program: impl AsRef<std::ffi::OsStr>) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(dyno.args().iter().skip(1));
    cmd.envs(dyno.env());
    cmd
}

pub(crate) fn program_of(dyno: &Dyno) -> Result<&str> {
    dyno.args().first().map(String::as_str).ok_or_else(|| {
        SupervisorError::DriverError(format!("dyno {} has no program to run", dyno.name()))
    })
}

impl DynoDriver for SimpleDynoDriver {
    fn build<'a>(&'a self, _release: &'a mut Release) -> DriverFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn start<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let cmd = dyno_command(dyno, program_of(dyno)?);
            self.units.spawn(dyno, cmd, StopMethod::Terminate)
        })
    }

    fn stop<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move { self.units.request_stop(dyno) })
    }

    fn wait<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, ExitStatus> {
        Box::pin(self.units.wait(dyno))
    }
}
