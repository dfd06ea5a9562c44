use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use dynosup::driver::{DriverFuture, Dyno, DynoDriver};
use dynosup::errors::{Result, SupervisorError};
use dynosup::types::{ExitStatus, Release};

/// Code a fake unit reports after being asked to stop (128 + SIGTERM).
pub const STOPPED_CODE: i32 = 143;

/// Code a fake unit reports when crashed from a test.
pub const CRASH_CODE: i32 = 1;

/// Something the driver was asked to do, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// Release name.
    Build(String),
    /// Dyno key (`<release>/<type>.<id>`).
    Start(String),
    Stop(String),
    Exit(String, ExitStatus),
}

#[derive(Default)]
struct FakeUnit {
    exit_tx: Option<oneshot::Sender<ExitStatus>>,
    exit_rx: Option<oneshot::Receiver<ExitStatus>>,
}

#[derive(Default)]
struct Script {
    build_failure: Option<String>,
    /// Dyno names (`run.2`) or process types (`web`) whose start fails.
    start_failures: HashSet<String>,
    /// Dyno names that exit with the given code as soon as they start.
    exit_codes: HashMap<String, i32>,
}

/// In-memory [`DynoDriver`].
///
/// - records every call as a [`DriverEvent`]
/// - units run until stopped, crashed, or scripted to exit immediately
/// - builds and starts can be made to fail
#[derive(Clone, Default)]
pub struct FakeDriver {
    events: Arc<Mutex<Vec<DriverEvent>>>,
    units: Arc<Mutex<HashMap<String, FakeUnit>>>,
    script: Arc<Mutex<Script>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_build(self, reason: &str) -> Self {
        self.script.lock().unwrap().build_failure = Some(reason.to_string());
        self
    }

    /// `target` is either a dyno name (`run.2`) or a process type (`web`).
    pub fn fail_start(self, target: &str) -> Self {
        self.script.lock().unwrap().start_failures.insert(target.to_string());
        self
    }

    /// Make the dyno called `name` exit with `code` right after starting.
    pub fn exit_with(self, name: &str, code: i32) -> Self {
        self.script.lock().unwrap().exit_codes.insert(name.to_string(), code);
        self
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn starts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::Start(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn stops(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::Stop(key) => Some(key),
                _ => None,
            })
            .collect()
    }

    pub fn start_count(&self, key: &str) -> usize {
        self.starts().iter().filter(|k| *k == key).count()
    }

    /// Make the live unit for `key` exit with [`CRASH_CODE`].
    ///
    /// Returns false if nothing is running under that key.
    pub fn crash(&self, key: &str) -> bool {
        self.finish(key, ExitStatus::Exited(CRASH_CODE))
    }

    /// Poll the event log until `pred` holds, giving up after 5 seconds.
    pub async fn wait_until<F>(&self, mut pred: F)
    where
        F: FnMut(&[DriverEvent]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if pred(&self.events.lock().unwrap()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("condition not met; events: {:?}", self.events());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn record(&self, event: DriverEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn finish(&self, key: &str, status: ExitStatus) -> bool {
        let tx = self
            .units
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(|u| u.exit_tx.take());
        match tx {
            Some(tx) => tx.send(status).is_ok(),
            None => false,
        }
    }
}

impl DynoDriver for FakeDriver {
    fn build<'a>(&'a self, release: &'a mut Release) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(DriverEvent::Build(release.name()));
            match self.script.lock().unwrap().build_failure.clone() {
                Some(reason) => Err(SupervisorError::BuildFailed {
                    release: release.name(),
                    reason,
                }),
                None => Ok(()),
            }
        })
    }

    fn start<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let key = dyno.key();
            self.record(DriverEvent::Start(key.clone()));

            let (fails, exit_code) = {
                let script = self.script.lock().unwrap();
                let fails = script.start_failures.contains(&dyno.name())
                    || script.start_failures.contains(dyno.process_type());
                (fails, script.exit_codes.get(&dyno.name()).copied())
            };
            if fails {
                return Err(SupervisorError::DriverError(format!(
                    "scripted start failure for {}",
                    dyno.name()
                )));
            }

            let (tx, rx) = oneshot::channel();
            let exit_tx = match exit_code {
                Some(code) => {
                    let _ = tx.send(ExitStatus::Exited(code));
                    None
                }
                None => Some(tx),
            };
            self.units.lock().unwrap().insert(
                key,
                FakeUnit {
                    exit_tx,
                    exit_rx: Some(rx),
                },
            );
            Ok(())
        })
    }

    fn stop<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>> {
        Box::pin(async move {
            let key = dyno.key();
            self.record(DriverEvent::Stop(key.clone()));
            self.finish(&key, ExitStatus::Exited(STOPPED_CODE));
            Ok(())
        })
    }

    fn wait<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, ExitStatus> {
        Box::pin(async move {
            let key = dyno.key();
            let rx = self
                .units
                .lock()
                .unwrap()
                .get_mut(&key)
                .and_then(|u| u.exit_rx.take());

            let status = match rx {
                Some(rx) => rx
                    .await
                    .unwrap_or_else(|_| ExitStatus::failed("fake unit dropped")),
                None => ExitStatus::failed(format!("no unit for {key}")),
            };
            self.record(DriverEvent::Exit(key, status.clone()));
            status
        })
    }
}
