// src/config/driver.rs

//! Dyno driver selection, resolved once at process entry.
//!
//! The command line picks the backend (`--dynodriver`); backend parameters
//! come from the environment. Missing required parameters fail here, before
//! any release is built.

use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;

use crate::errors::{Result, SupervisorError};

pub const ENV_NEWROOT: &str = "DYNOSUP_NEWROOT";
pub const ENV_HOSTNAME: &str = "DYNOSUP_HOSTNAME";
pub const ENV_USER: &str = "DYNOSUP_USER";
pub const ENV_APP_ROOT: &str = "DYNOSUP_APP_ROOT";
pub const ENV_DOCKER_BASE_IMAGE: &str = "DYNOSUP_DOCKER_BASE_IMAGE";
pub const ENV_STOP_TIMEOUT: &str = "DYNOSUP_STOP_TIMEOUT_SECS";

const DEFAULT_APP_ROOT: &str = "/app";
const DEFAULT_BASE_IMAGE: &str = "heroku/cedar:14";
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Backend names accepted by `--dynodriver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DriverKind {
    Simple,
    Abspath,
    Docker,
    Libcontainer,
}

/// Parameters of the namespace/chroot backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibContainerSettings {
    pub new_root: PathBuf,
    pub hostname: String,
    pub user: String,
    pub stop_timeout: Duration,
}

/// Fully resolved driver selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverConfig {
    Simple {
        stop_timeout: Duration,
    },
    AbsPath {
        app_root: PathBuf,
        stop_timeout: Duration,
    },
    Docker {
        base_image: String,
        stop_timeout: Duration,
    },
    LibContainer(LibContainerSettings),
}

impl DriverConfig {
    /// Resolve from the process environment.
    pub fn from_env(kind: DriverKind) -> Result<Self> {
        Self::resolve(kind, |key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment values.
    pub fn resolve<F>(kind: DriverKind, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| {
            optional(key).ok_or_else(|| SupervisorError::ConfigError(format!("{key} empty")))
        };

        let stop_timeout = match optional(ENV_STOP_TIMEOUT) {
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                SupervisorError::ConfigError(format!("{ENV_STOP_TIMEOUT}={raw:?}: {e}"))
            })?,
            None => DEFAULT_STOP_TIMEOUT,
        };

        let config = match kind {
            DriverKind::Simple => DriverConfig::Simple { stop_timeout },
            DriverKind::Abspath => DriverConfig::AbsPath {
                app_root: PathBuf::from(
                    optional(ENV_APP_ROOT).unwrap_or_else(|| DEFAULT_APP_ROOT.to_string()),
                ),
                stop_timeout,
            },
            DriverKind::Docker => DriverConfig::Docker {
                base_image: optional(ENV_DOCKER_BASE_IMAGE)
                    .unwrap_or_else(|| DEFAULT_BASE_IMAGE.to_string()),
                stop_timeout,
            },
            DriverKind::Libcontainer => DriverConfig::LibContainer(LibContainerSettings {
                new_root: PathBuf::from(required(ENV_NEWROOT)?),
                hostname: required(ENV_HOSTNAME)?,
                user: required(ENV_USER)?,
                stop_timeout,
            }),
        };

        Ok(config)
    }
}
