// src/engine/processes.rs

//! A realised topology: one release, its formations, and the executors
//! running them.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::driver::{Dyno, DynoDriver};
use crate::engine::exit_code::DynoExit;
use crate::errors::Result;
use crate::executor::{DynoInput, Executor, ExecutorHandle};
use crate::types::{ExitStatus, Formation, Release};

/// Process type used for the slots of a one-shot `run`.
pub const RUN_PROCESS_TYPE: &str = "run";

/// What to realise from a topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Keep every formation's dynos running.
    Start,
    /// Run `args` to completion, once per slot.
    Run { args: Vec<String> },
}

/// Future resolving to every one-shot slot's terminal status, in slot order.
pub type StatusesFuture = Pin<Box<dyn Future<Output = Vec<DynoExit>> + Send>>;

/// Replica count for a formation: a non-negative override wins, otherwise
/// the declared quantity.
pub fn effective_concurrency(concurrency: Option<usize>, declared: usize) -> usize {
    concurrency.unwrap_or(declared)
}

pub struct Processes {
    release: Release,
    formations: Vec<Formation>,
    driver: Arc<dyn DynoDriver>,
    one_shot: bool,
    statuses_taken: bool,
    executors: Vec<ExecutorHandle>,
}

impl fmt::Debug for Processes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processes")
            .field("release", &self.release.name())
            .field("formations", &self.formations)
            .field("one_shot", &self.one_shot)
            .field("executors", &self.executors.len())
            .finish_non_exhaustive()
    }
}

impl Processes {
    pub fn new(release: Release, formations: Vec<Formation>, driver: Arc<dyn DynoDriver>) -> Self {
        Self {
            release,
            formations,
            driver,
            one_shot: false,
            statuses_taken: false,
            executors: Vec::new(),
        }
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn formations(&self) -> &[Formation] {
        &self.formations
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    pub fn executors(&self) -> &[ExecutorHandle] {
        &self.executors
    }

    /// Build the release, create the executors for `command` and start them
    /// all concurrently.
    ///
    /// A build failure is returned as-is and no executor is created.
    pub async fn start(&mut self, command: &Command, concurrency: Option<usize>) -> Result<()> {
        if let Err(e) = self.driver.build(&mut self.release).await {
            error!(
                release = %self.release.name(),
                error = %e,
                "could not build release"
            );
            return Err(e);
        }

        let first = self.executors.len();
        let executors = self.realize(command, concurrency);
        self.start_parallel(executors, first);
        Ok(())
    }

    /// Create the `Stopped` executors for `command`, keeping their handles.
    fn realize(&mut self, command: &Command, concurrency: Option<usize>) -> Vec<Executor> {
        let release = Arc::new(self.release.clone());
        let mut executors = Vec::new();

        match command {
            Command::Start => {
                for form in self.formations.iter() {
                    let conc = effective_concurrency(concurrency, form.quantity());
                    info!(quantity = conc, process_type = %form.process_type(), "formation");

                    for i in 1..=conc {
                        let dyno = Dyno::new(
                            Arc::clone(&release),
                            form.process_type(),
                            i.to_string(),
                            form.args().to_vec(),
                        );
                        executors.push(Executor::new(dyno, Arc::clone(&self.driver), false));
                    }
                }
            }
            Command::Run { args } => {
                self.one_shot = true;
                let conc = effective_concurrency(concurrency, 1);
                info!(quantity = conc, args = ?args, "one-shot run");

                for i in 1..=conc {
                    let dyno = Dyno::new(
                        Arc::clone(&release),
                        RUN_PROCESS_TYPE,
                        i.to_string(),
                        args.clone(),
                    );
                    executors.push(Executor::new(dyno, Arc::clone(&self.driver), true));
                }
            }
        }

        executors
            .into_iter()
            .map(|(executor, handle)| {
                self.executors.push(handle);
                executor
            })
            .collect()
    }

    /// Fan out: every executor gets `StayStarted` and its own drive task.
    ///
    /// `first` is the index of the first handle belonging to `executors`.
    fn start_parallel(&self, executors: Vec<Executor>, first: usize) {
        for (mut executor, handle) in executors.into_iter().zip(self.executors[first..].iter()) {
            handle.trigger(DynoInput::StayStarted);

            tokio::spawn(async move {
                let name = executor.name();
                info!(dyno = %name, "beginning tick loop");
                executor.drive().await;
                info!(dyno = %name, "executor completes");
            });
        }
    }

    /// Fan in: retire every executor concurrently, then block until all of
    /// them have completed. Stopping an already-stopped topology is a no-op.
    pub async fn stop(&self) {
        info!(
            release = %self.release.name(),
            executors = self.executors.len(),
            "stopping everything"
        );

        for handle in self.executors.iter() {
            handle.trigger(DynoInput::Retire);
        }
        for handle in self.executors.iter() {
            handle.completed().await;
            debug!(dyno = %handle.name(), "retired");
        }
    }

    /// Future resolving to all one-shot statuses.
    ///
    /// `None` unless this is a one-shot topology whose statuses have not been
    /// taken yet. A one-shot topology without slots resolves to no statuses.
    pub fn take_statuses(&mut self) -> Option<StatusesFuture> {
        if !self.one_shot || self.statuses_taken {
            return None;
        }
        self.statuses_taken = true;

        let receivers: Vec<_> = self
            .executors
            .iter_mut()
            .filter_map(|e| e.take_status().map(|rx| (e.name().to_string(), rx)))
            .collect();

        Some(Box::pin(async move {
            let mut exits = Vec::with_capacity(receivers.len());
            for (name, rx) in receivers {
                let status = rx.await.unwrap_or_else(|_| {
                    ExitStatus::failed("executor went away without reporting a status")
                });
                debug!(dyno = %name, %status, "got a status");
                exits.push(DynoExit { name, status });
            }
            exits
        }))
    }
}
