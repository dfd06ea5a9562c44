// src/engine/supervisor.rs

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::engine::exit_code::{aggregate_exit_code, DynoExit, FATAL_EXIT_CODE};
use crate::engine::processes::{Command, Processes, StatusesFuture};
use crate::errors::Result;

/// Top-level reconciliation loop.
///
/// Owns the one "current" topology and reacts to:
/// - a new topology from the poller (stop the current one, start the new one)
/// - all one-shot statuses being available (aggregate and finish)
/// - a termination signal (stop the current one and finish with 1)
///
/// Only this loop ever replaces or mutates the current [`Processes`].
pub struct Supervisor<S> {
    command: Command,
    concurrency: Option<usize>,
    topology_rx: mpsc::Receiver<Processes>,
    shutdown: S,
}

impl<S> fmt::Debug for Supervisor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("command", &self.command)
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl<S> Supervisor<S>
where
    S: Future<Output = String> + Send,
{
    /// `shutdown` resolves with the name of the caught signal.
    pub fn new(
        command: Command,
        concurrency: Option<usize>,
        topology_rx: mpsc::Receiver<Processes>,
        shutdown: S,
    ) -> Self {
        Self {
            command,
            concurrency,
            topology_rx,
            shutdown,
        }
    }

    /// Run until the process should exit, returning its exit code.
    ///
    /// A topology that fails to start is returned as an error; the previous
    /// topology has already been stopped by then.
    pub async fn run(self) -> Result<i32> {
        let Supervisor {
            command,
            concurrency,
            mut topology_rx,
            shutdown,
        } = self;
        tokio::pin!(shutdown);

        let mut current: Option<Processes> = None;
        let mut statuses: Option<StatusesFuture> = None;
        let mut topologies_open = true;

        info!(?command, ?concurrency, "supervisor started");

        loop {
            tokio::select! {
                next = topology_rx.recv(), if topologies_open => {
                    let Some(mut procs) = next else {
                        info!("topology source closed; keeping current topology");
                        topologies_open = false;
                        continue;
                    };

                    if let Some(old) = current.take() {
                        old.stop().await;
                    }

                    info!(release = %procs.release().name(), "starting topology");
                    if let Err(e) = procs.start(&command, concurrency).await {
                        error!(error = %e, "could not start process");
                        return Err(e);
                    }

                    statuses = procs.take_statuses();
                    current = Some(procs);
                }
                exits = next_statuses(&mut statuses) => {
                    let code = aggregate_exit_code(&exits);
                    info!(code, "one-shot run finished");
                    return Ok(code);
                }
                signal = &mut shutdown => {
                    info!(%signal, "caught a deadly signal");
                    if let Some(procs) = current.as_ref() {
                        procs.stop().await;
                    }
                    return Ok(FATAL_EXIT_CODE);
                }
            }
            debug!("supervisor loop iteration complete");
        }
    }
}

async fn next_statuses(statuses: &mut Option<StatusesFuture>) -> Vec<DynoExit> {
    match statuses {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}
