// src/poll/mod.rs

//! Topology sources.
//!
//! A [`Poller`] turns some external notion of "desired state" into a stream
//! of complete [`Processes`] snapshots for the supervisor. The supervisor
//! does not care how they are produced.
//!
//! - [`dir`] watches a local control directory for `release.toml`.

pub mod dir;

use tokio::sync::mpsc;

use crate::engine::Processes;
use crate::errors::Result;

pub use dir::DirPoller;

pub trait Poller: Send {
    /// Start producing snapshots. Each value is self-contained.
    fn poll(self: Box<Self>) -> Result<mpsc::Receiver<Processes>>;
}
