// src/driver/mod.rs

//! Pluggable execution backends ("dyno drivers").
//!
//! The supervisor talks to a [`DynoDriver`] instead of spawning processes
//! itself. This keeps the executor state machine independent of *how* a unit
//! is materialised, and lets tests swap in a fake driver.
//!
//! - [`simple`] runs the dyno's args directly.
//! - [`abspath`] runs them from a fixed application root.
//! - [`docker`] builds an image per release and runs one container per dyno.
//! - [`libcontainer`] runs each dyno inside fresh namespaces under a new root.
//! - [`unit`] is the process table and reaper shared by all of the above.

pub mod abspath;
pub mod docker;
pub mod libcontainer;
pub mod simple;
pub mod unit;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::DriverConfig;
use crate::errors::Result;
use crate::types::{ExitStatus, Release};

pub use abspath::AbsPathDynoDriver;
pub use docker::DockerDynoDriver;
pub use libcontainer::LibContainerDynoDriver;
pub use simple::SimpleDynoDriver;

/// Boxed future returned by every driver operation.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identity and launch context of one dyno slot, handed to the driver on
/// every call.
#[derive(Debug, Clone)]
pub struct Dyno {
    release: Arc<Release>,
    process_type: String,
    process_id: String,
    args: Vec<String>,
}

impl Dyno {
    pub fn new(
        release: Arc<Release>,
        process_type: impl Into<String>,
        process_id: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        Self {
            release,
            process_type: process_type.into(),
            process_id: process_id.into(),
            args,
        }
    }

    /// `<type>.<id>`, e.g. `web.2`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.process_type, self.process_id)
    }

    /// Key unique across releases, used by drivers to index live units.
    pub fn key(&self) -> String {
        format!("{}/{}", self.release.name(), self.name())
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn process_type(&self) -> &str {
        &self.process_type
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment for the unit: release config plus `DYNO=<name>`.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env: Vec<(String, String)> = self
            .release
            .config()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env.push(("DYNO".to_string(), self.name()));
        env
    }
}

/// Contract every execution backend fulfils.
///
/// - `build` prepares a release once per realised topology.
/// - `start` launches the unit backing a dyno.
/// - `stop` *requests* graceful termination and returns promptly; completion
///   is observed through `wait`.
/// - `wait` resolves once the unit exits. It may run concurrently with
///   `stop` issued from another task.
pub trait DynoDriver: Send + Sync {
    fn build<'a>(&'a self, release: &'a mut Release) -> DriverFuture<'a, Result<()>>;

    fn start<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>>;

    fn stop<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, Result<()>>;

    fn wait<'a>(&'a self, dyno: &'a Dyno) -> DriverFuture<'a, ExitStatus>;
}

/// Construct the driver selected at process entry.
pub fn from_config(config: &DriverConfig) -> Arc<dyn DynoDriver> {
    match config {
        DriverConfig::Simple { stop_timeout } => Arc::new(SimpleDynoDriver::new(*stop_timeout)),
        DriverConfig::AbsPath {
            app_root,
            stop_timeout,
        } => Arc::new(AbsPathDynoDriver::new(app_root.clone(), *stop_timeout)),
        DriverConfig::Docker {
            base_image,
            stop_timeout,
        } => Arc::new(DockerDynoDriver::new(base_image.clone(), *stop_timeout)),
        DriverConfig::LibContainer(settings) => {
            Arc::new(LibContainerDynoDriver::new(settings.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn dyno() -> Dyno {
        let mut config = HashMap::new();
        config.insert("PORT".to_string(), "5000".to_string());
        let release = Arc::new(Release::new("app", 3, config, None));
        Dyno::new(release, "web", "2", vec!["bin/web".to_string()])
    }

    #[test]
    fn dyno_name_and_key() {
        let d = dyno();
        assert_eq!(d.name(), "web.2");
        assert_eq!(d.key(), "app-3/web.2");
    }

    #[test]
    fn dyno_env_carries_config_and_dyno_name() {
        let env = dyno().env();
        assert!(env.contains(&("PORT".to_string(), "5000".to_string())));
        assert!(env.contains(&("DYNO".to_string(), "web.2".to_string())));
    }
}
