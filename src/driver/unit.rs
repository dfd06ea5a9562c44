// src/driver/unit.rs

//! Live unit table shared by the process-based drivers.
//!
//! Each started unit is a `tokio::process::Child` owned by a reaper task. The
//! reaper forwards the child's output to tracing, resolves its exit status,
//! and performs graceful termination when asked. Drivers only see three
//! operations: [`UnitTable::spawn`], [`UnitTable::request_stop`] and
//! [`UnitTable::wait`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::driver::Dyno;
use crate::errors::{Result, SupervisorError};
use crate::types::ExitStatus;

/// How a unit is asked to shut down before being killed.
#[derive(Debug, Clone)]
pub enum StopMethod {
    /// Send SIGTERM to the child (plain kill where signals are unavailable).
    Terminate,
    /// Run this command (e.g. `docker stop <name>`) and keep waiting.
    Command(Vec<String>),
}

struct Unit {
    exit: Option<oneshot::Receiver<ExitStatus>>,
    stop: Option<oneshot::Sender<()>>,
}

/// Units currently owned by one driver, keyed by [`Dyno::key`].
pub struct UnitTable {
    units: Mutex<HashMap<String, Unit>>,
    grace: Duration,
}

impl std::fmt::Debug for UnitTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitTable")
            .field("grace", &self.grace)
            .finish_non_exhaustive()
    }
}

impl UnitTable {
    /// `grace` is how long a stopping unit may take before it is killed.
    pub fn new(grace: Duration) -> Self {
        Self {
            units: Mutex::new(HashMap::new()),
            grace,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Spawn `cmd` as the unit backing `dyno`, replacing any previous entry.
    pub fn spawn(&self, dyno: &Dyno, mut cmd: Command, stop: StopMethod) -> Result<()> {
        let name = dyno.name();

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for dyno '{}'", name))?;

        info!(dyno = %name, pid = ?child.id(), "unit started");

        if let Some(stdout) = child.stdout.take() {
            forward_lines(name.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(name.clone(), "stderr", stderr);
        }

        let (exit_tx, exit_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let grace = self.grace;

        tokio::spawn(async move {
            let status = reap(&name, child, stop_rx, stop, grace).await;
            debug!(dyno = %name, %status, "unit reaped");
            let _ = exit_tx.send(status);
        });

        self.lock().insert(
            dyno.key(),
            Unit {
                exit: Some(exit_rx),
                stop: Some(stop_tx),
            },
        );

        Ok(())
    }

    /// Ask the unit to shut down. Returns immediately.
    pub fn request_stop(&self, dyno: &Dyno) -> Result<()> {
        let mut units = self.lock();
        match units.get_mut(&dyno.key()).and_then(|u| u.stop.take()) {
            Some(stop) => {
                if stop.send(()).is_err() {
                    debug!(dyno = %dyno.name(), "unit already exited while stopping");
                }
            }
            None => {
                debug!(dyno = %dyno.name(), "no running unit to stop");
            }
        }
        Ok(())
    }

    /// Resolve once the unit exits.
    pub async fn wait(&self, dyno: &Dyno) -> ExitStatus {
        let key = dyno.key();
        let exit = self.lock().get_mut(&key).and_then(|u| u.exit.take());

        let Some(exit) = exit else {
            return ExitStatus::failed(SupervisorError::UnitNotFound(dyno.name()));
        };

        let status = exit
            .await
            .unwrap_or_else(|_| ExitStatus::failed("unit reaper went away"));

        self.lock().remove(&key);
        status
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Unit>> {
        self.units.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Own `child` until it exits; on a stop request, terminate it gracefully and
/// kill it once `grace` has elapsed.
async fn reap(
    name: &str,
    mut child: Child,
    stop_rx: oneshot::Receiver<()>,
    stop: StopMethod,
    grace: Duration,
) -> ExitStatus {
    let result = tokio::select! {
        res = child.wait() => res,
        Ok(()) = stop_rx => {
            info!(dyno = %name, "stop requested; terminating unit");
            terminate(name, &mut child, &stop).await;

            match timeout(grace, child.wait()).await {
                Ok(res) => res,
                Err(_) => {
                    warn!(
                        dyno = %name,
                        grace_secs = grace.as_secs(),
                        "unit did not exit within grace period; killing"
                    );
                    if let Err(e) = child.kill().await {
                        warn!(dyno = %name, error = %e, "failed to kill unit");
                    }
                    child.wait().await
                }
            }
        }
    };

    match result {
        Ok(status) => ExitStatus::from(status),
        Err(e) => ExitStatus::failed(format!("waiting for dyno {name}: {e}")),
    }
}

async fn terminate(name: &str, child: &mut Child, stop: &StopMethod) {
    match stop {
        StopMethod::Terminate => send_sigterm(name, child),
        StopMethod::Command(argv) => {
            let Some((program, args)) = argv.split_first() else {
                return;
            };
            let status = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .status()
                .await;
            match status {
                Ok(s) if s.success() => {}
                Ok(s) => warn!(dyno = %name, status = %s, "stop command failed"),
                Err(e) => warn!(dyno = %name, error = %e, "could not run stop command"),
            }
        }
    }
}

#[cfg(unix)]
fn send_sigterm(name: &str, child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(dyno = %name, error = %e, "failed to send SIGTERM");
    }
}

#[cfg(not(unix))]
fn send_sigterm(name: &str, child: &mut Child) {
    if let Err(e) = child.start_kill() {
        warn!(dyno = %name, error = %e, "failed to kill unit");
    }
}

fn forward_lines<R>(dyno: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            info!(dyno = %dyno, stream, "{}", line);
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::types::Release;

    fn dyno() -> Dyno {
        let release = Arc::new(Release::new("shop", 1, HashMap::new(), None));
        Dyno::new(release, "web", "1", vec!["bin/web".to_string()])
    }

    #[tokio::test]
    async fn wait_without_a_unit_fails() {
        let units = UnitTable::new(Duration::from_secs(1));
        let status = units.wait(&dyno()).await;
        assert_eq!(
            status,
            ExitStatus::failed(SupervisorError::UnitNotFound("web.1".to_string()))
        );
        assert!(status.to_string().contains("no unit is running for dyno web.1"));
    }

    #[test]
    fn stopping_an_unknown_unit_is_ok() {
        let units = UnitTable::new(Duration::from_secs(1));
        assert!(units.request_stop(&dyno()).is_ok());
    }
}
