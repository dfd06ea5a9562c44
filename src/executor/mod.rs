// src/executor/mod.rs

//! Per-dyno lifecycle state machine.
//!
//! An [`Executor`] owns one dyno slot. The orchestration layer expresses what
//! it wants through [`ExecutorHandle::trigger`] (stay started, or retire);
//! the executor gets there one [`Executor::tick`] at a time, including
//! restarting a long-lived dyno that exits on its own.
//!
//! ```text
//!  Stopped --StayStarted--> Running --Retire--> Retiring --exit--> Complete
//!     |                       |  ^
//!     |                       |  | exit (long-lived, no retire pending): restart
//!     |                       +--+
//!     |                       | exit (one-shot)
//!     +--Retire--> Complete <-+
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::driver::{Dyno, DynoDriver};
use crate::types::ExitStatus;

/// Desired-state instruction delivered to an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DynoInput {
    StayStarted,
    Retire,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    /// Built but not started.
    Stopped,
    /// Unit started and being waited on.
    Running,
    /// Stop requested; waiting for the unit to exit.
    Retiring,
    /// Terminal.
    Complete,
}

/// Result of a single [`Executor::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Advanced,
    /// The slot has fully stopped; the caller's drive loop should end.
    Complete,
}

type ExitFuture = Pin<Box<dyn Future<Output = ExitStatus> + Send>>;

/// State machine for one dyno slot.
pub struct Executor {
    dyno: Arc<Dyno>,
    driver: Arc<dyn DynoDriver>,
    one_shot: bool,
    state: ExecutorState,

    input_rx: mpsc::UnboundedReceiver<DynoInput>,
    inputs_closed: bool,

    /// Outstanding `wait` on the current unit.
    exit: Option<ExitFuture>,
    restarts: u64,

    status_tx: Option<oneshot::Sender<ExitStatus>>,
    complete_tx: watch::Sender<bool>,
    final_status: Option<ExitStatus>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("dyno", &self.dyno.name())
            .field("one_shot", &self.one_shot)
            .field("state", &self.state)
            .field("restarts", &self.restarts)
            .finish_non_exhaustive()
    }
}

/// Control side of an executor, held by the orchestration layer.
#[derive(Debug)]
pub struct ExecutorHandle {
    name: String,
    input_tx: mpsc::UnboundedSender<DynoInput>,
    complete_rx: watch::Receiver<bool>,
    status_rx: Option<oneshot::Receiver<ExitStatus>>,
}

impl Executor {
    /// Create a slot in the `Stopped` state and its control handle.
    ///
    /// One-shot slots publish their terminal status through the handle
    /// ([`ExecutorHandle::take_status`]) and are never restarted.
    pub fn new(dyno: Dyno, driver: Arc<dyn DynoDriver>, one_shot: bool) -> (Self, ExecutorHandle) {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (complete_tx, complete_rx) = watch::channel(false);
        let (status_tx, status_rx) = if one_shot {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let name = dyno.name();
        let executor = Self {
            dyno: Arc::new(dyno),
            driver,
            one_shot,
            state: ExecutorState::Stopped,
            input_rx,
            inputs_closed: false,
            exit: None,
            restarts: 0,
            status_tx,
            complete_tx,
            final_status: None,
        };
        let handle = ExecutorHandle {
            name,
            input_tx,
            complete_rx,
            status_rx,
        };
        (executor, handle)
    }

    /// `<type>.<id>`.
    pub fn name(&self) -> String {
        self.dyno.name()
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    /// How many times a long-lived unit was restarted after exiting.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Terminal status, once `Complete`.
    pub fn final_status(&self) -> Option<&ExitStatus> {
        self.final_status.as_ref()
    }

    /// Tick until `Complete`.
    pub async fn drive(&mut self) {
        while self.tick().await != Tick::Complete {}
    }

    /// Advance the state machine by one step: consume the next control input
    /// or the next unit exit, whichever is ready first.
    pub async fn tick(&mut self) -> Tick {
        if self.state == ExecutorState::Complete {
            return Tick::Complete;
        }

        tokio::select! {
            input = self.input_rx.recv(), if !self.inputs_closed => {
                match input {
                    Some(DynoInput::StayStarted) => self.stay_started().await,
                    Some(DynoInput::Retire) => self.retire().await,
                    None => {
                        debug!(dyno = %self.dyno.name(), "control channel closed; retiring");
                        self.inputs_closed = true;
                        self.retire().await;
                    }
                }
            }
            status = next_exit(&mut self.exit) => {
                self.on_exit(status).await;
            }
        }

        if self.state == ExecutorState::Complete {
            Tick::Complete
        } else {
            Tick::Advanced
        }
    }

    async fn stay_started(&mut self) {
        match self.state {
            ExecutorState::Stopped => self.launch().await,
            state => {
                debug!(dyno = %self.dyno.name(), ?state, "StayStarted ignored");
            }
        }
    }

    async fn retire(&mut self) {
        match self.state {
            ExecutorState::Stopped => {
                self.complete(ExitStatus::failed("retired before it was started"));
            }
            ExecutorState::Running => {
                if let Err(e) = self.driver.stop(&self.dyno).await {
                    warn!(dyno = %self.dyno.name(), error = %e, "stop failed; still waiting for exit");
                }
                self.state = ExecutorState::Retiring;
            }
            ExecutorState::Retiring | ExecutorState::Complete => {}
        }
    }

    /// Start the unit and begin waiting on it in the background. A start
    /// failure is recorded as the unit's exit status.
    async fn launch(&mut self) {
        let exit: ExitFuture = match self.driver.start(&self.dyno).await {
            Ok(()) => {
                let driver = Arc::clone(&self.driver);
                let dyno = Arc::clone(&self.dyno);
                let handle = tokio::spawn(async move { driver.wait(&dyno).await });
                Box::pin(async move {
                    handle
                        .await
                        .unwrap_or_else(|e| ExitStatus::failed(format!("wait task failed: {e}")))
                })
            }
            Err(e) => {
                warn!(dyno = %self.dyno.name(), error = %e, "could not start dyno");
                Box::pin(std::future::ready(ExitStatus::failed(e)))
            }
        };

        self.exit = Some(exit);
        self.state = ExecutorState::Running;
    }

    async fn on_exit(&mut self, status: ExitStatus) {
        self.exit = None;

        if self.one_shot || self.state == ExecutorState::Retiring {
            self.complete(status);
            return;
        }

        if self.retire_pending() {
            debug!(dyno = %self.dyno.name(), "exit raced with retire; not restarting");
            self.complete(status);
            return;
        }

        self.restarts += 1;
        warn!(
            dyno = %self.dyno.name(),
            %status,
            restarts = self.restarts,
            "dyno exited on its own; restarting"
        );
        self.state = ExecutorState::Stopped;
        // A start that fails synchronously hands back a ready exit; without
        // this the restart loop never returns Pending.
        tokio::task::yield_now().await;
        self.launch().await;
    }

    /// Drain queued inputs, reporting whether a retire is among them.
    fn retire_pending(&mut self) -> bool {
        if self.inputs_closed {
            return true;
        }
        loop {
            match self.input_rx.try_recv() {
                Ok(DynoInput::Retire) => return true,
                Ok(DynoInput::StayStarted) => continue,
                Err(TryRecvError::Empty) => return false,
                Err(TryRecvError::Disconnected) => {
                    self.inputs_closed = true;
                    return true;
                }
            }
        }
    }

    fn complete(&mut self, status: ExitStatus) {
        info!(dyno = %self.dyno.name(), %status, "dyno complete");
        self.state = ExecutorState::Complete;

        if let Some(tx) = self.status_tx.take() {
            let _ = tx.send(status.clone());
        }
        self.final_status = Some(status);
        self.complete_tx.send_replace(true);
    }
}

async fn next_exit(exit: &mut Option<ExitFuture>) -> ExitStatus {
    match exit {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

impl ExecutorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver a control input. Never blocks; inputs to a completed executor
    /// are dropped.
    pub fn trigger(&self, input: DynoInput) {
        if self.input_tx.send(input).is_err() {
            debug!(dyno = %self.name, ?input, "executor already complete; input dropped");
        }
    }

    pub fn is_complete(&self) -> bool {
        *self.complete_rx.borrow() || self.input_tx.is_closed()
    }

    /// Resolve once the executor has fully stopped. May be awaited any number
    /// of times.
    pub async fn completed(&self) {
        let mut rx = self.complete_rx.clone();
        // An Err means the executor was dropped, which is also terminal.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Receiver for the terminal status of a one-shot slot. Returns `None`
    /// for long-lived slots or once taken.
    pub fn take_status(&mut self) -> Option<oneshot::Receiver<ExitStatus>> {
        self.status_rx.take()
    }
}
