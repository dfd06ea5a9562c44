// src/engine/mod.rs

//! Orchestration engine for dynosup.
//!
//! This module ties together:
//! - realising a topology into executors and fanning them out / in
//!   ([`processes`])
//! - turning one-shot statuses into a process exit code ([`exit_code`])
//! - the top-level reconciliation loop that reacts to new topologies,
//!   one-shot completion and shutdown signals ([`supervisor`])

pub mod exit_code;
pub mod processes;
pub mod supervisor;

pub use exit_code::{aggregate_exit_code, DynoExit, EXEC_FAILURE_CODE, FATAL_EXIT_CODE};
pub use processes::{effective_concurrency, Command, Processes, StatusesFuture, RUN_PROCESS_TYPE};
pub use supervisor::Supervisor;
