// src/driver/libcontainer.rs

//! Isolation backend: each dyno runs in fresh UTS/IPC/mount namespaces,
//! chrooted into a prepared root filesystem, as an unprivileged user.
//!
//! The settings are validated when the driver config is resolved; `build`
//! re-checks that the root exists and the user resolves before any unit is
//! started.

use crate::config::LibContainerSettings;
use crate::driver::unit::UnitTable;
use crate::driver::{DriverFuture, Dyno, DynoDriver};
use crate::errors::Result;
use crate::types::{ExitStatus, Release};

#[derive(Debug)]
pub struct LibContainerDynoDriver {
    settings: LibContainerSettings,
    units: UnitTable,
}

impl LibContainerDynoDriver {
    pub fn new(settings: LibContainerSettings) -> Self {
        let grace = settings.stop_timeout;
        Self {
            settings,
            units: UnitTable::new(grace),
        }
    }

    pub fn settings(&self) -> &LibContainerSettings {
        &self.settings
    }
}

#[cfg(target_os = "linux")]
mod imp {
    use nix::sched::{unshare, CloneFlags};
    use nix::unistd::{chdir, chroot, sethostname, setgid, setgroups, setuid, Gid, Uid, User};

    use super::*;
    use crate::driver::simple::{dyno_command, program_of};
    use crate::driver::unit::StopMethod;
    use crate::errors::SupervisorError;

    impl LibContainerDynoDriver {
        fn resolve_user(&self) -> Result<(Uid, Gid)> {
            let user = User::from_name(&self.settings.user)
                .map_err(|e| {
                    SupervisorError::DriverError(format!(
                        "looking up user {}: {e}",
                        self.settings.user
                    ))
                })?
                .ok_or_else(|| {
                    SupervisorError::DriverError(format!(
                        "user {} does not exist",
                        self.settings.user
                    ))
                })?;
            Ok((user.uid, user.gid))
        }

        pub(super) async fn check(&self, release: &Release) -> Result<()> {
            let root_ok = tokio::fs::metadata(&self.settings.new_root)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !root_ok {
                return Err(SupervisorError::BuildFailed {
                    release: release.name(),
                    reason: format!("new root {:?} is not a directory", self.settings.new_root),
                });
            }
            self.resolve_user().map(|_| ())
        }

        pub(super) fn spawn(&self, dyno: &Dyno) -> Result<()> {
            let (uid, gid) = self.resolve_user()?;
            let root = self.settings.new_root.clone();
            let hostname = self.settings.hostname.clone();

            let mut cmd = dyno_command(dyno, program_of(dyno)?);

            // SAFETY: the closure runs between fork and exec and only issues
            // raw syscalls on values prepared before the fork.
            unsafe {
                cmd.pre_exec(move || {
                    unshare(
                        CloneFlags::CLONE_NEWUTS
                            | CloneFlags::CLONE_NEWIPC
                            | CloneFlags::CLONE_NEWNS,
                    )?;
                    sethostname(&hostname)?;
                    chroot(root.as_path())?;
                    chdir("/")?;
                    setgroups(&[gid])?;
                    setgid(gid)?;
                    setuid(uid)?;
                    Ok(())
                });
            }

            self.units.spawn(dyno, cmd, StopMethod::Terminate)
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod imp {
    use super::*;
    use crate::errors::SupervisorError;

    fn unsupported() -> SupervisorError {
        SupervisorError::DriverError("the libcontainer driver requires linux".to_string())
    }

    impl LibContainerDynoDriver {
        pub(super) async fn check(&self, _release: &Release) -> Result<()> {
            Err(unsupported())
        }

        pub(super) fn spawn(&self, _dyno: &Dyno) -> Result<()> {
            Err(unsupported())
        }
    }
}

impl DynoDriver for LibContainerDynoDriver {
    fn build<'a>(&'a self, release: &'a mut Release) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move { self.check(release).await })
    }

    fn start<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move { self.spawn(dyno) })
    }

    fn stop<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move { self.units.request_stop(dyno) })
    }

    fn wait<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, ExitStatus> {
        Box::pin(self.units.wait(dyno))
    }
}
