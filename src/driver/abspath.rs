// src/driver/abspath.rs

//! Runs dynos from a fixed application root (the unpacked slug).
//!
//! Relative programs resolve under the root, the working directory is the
//! root, and `HOME` points at it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::simple::{dyno_command, program_of};
use crate::driver::unit::{StopMethod, UnitTable};
use crate::driver::{DriverFuture, Dyno, DynoDriver};
use crate::errors::{Result, SupervisorError};
use crate::types::{ExitStatus, Release};

#[derive(Debug)]
pub struct AbsPathDynoDriver {
    app_root: PathBuf,
    units: UnitTable,
}

impl AbsPathDynoDriver {
    pub fn new(app_root: PathBuf, stop_timeout: Duration) -> Self {
        Self {
            app_root,
            units: UnitTable::new(stop_timeout),
        }
    }

    pub fn app_root(&self) -> &Path {
        &self.app_root
    }

    /// Absolute path of `program`; absolute inputs are kept as given.
    pub fn resolve(&self, program: &str) -> PathBuf {
        let p = Path::new(program);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.app_root.join(p)
        }
    }
}

impl DynoDriver for AbsPathDynoDriver {
    fn build<'a>(&'a self, release: &'a mut Release) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let meta = tokio::fs::metadata(&self.app_root).await;
            match meta {
                Ok(m) if m.is_dir() => Ok(()),
                _ => Err(SupervisorError::BuildFailed {
                    release: release.name(),
                    reason: format!("app root {:?} is not a directory", self.app_root),
                }),
            }
        })
    }

    fn start<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let program = self.resolve(program_of(dyno)?);
            let mut cmd = dyno_command(dyno, &program);
            cmd.current_dir(&self.app_root).env("HOME", &self.app_root);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_joins_relative_programs_under_root() {
        let d = AbsPathDynoDriver::new(PathBuf::from("/app"), Duration::from_secs(1));
        assert_eq!(d.resolve("bin/web"), PathBuf::from("/app/bin/web"));
        assert_eq!(d.resolve("/usr/bin/env"), PathBuf::from("/usr/bin/env"));
    }
}
