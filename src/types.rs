// src/types.rs

//! Plain data shared by every layer: what to run ([`Release`], [`Formation`])
//! and how a unit ended ([`ExitStatus`]).

use std::collections::HashMap;
use std::fmt;

/// A versioned bundle of application code and config.
///
/// Immutable once constructed, except for the backend handle (the built
/// image reference) which the owning driver records during `build`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    app_name: String,
    version: u64,
    config: HashMap<String, String>,
    slug_url: Option<String>,

    // docker driver handle
    image_name: Option<String>,
}

impl Release {
    pub fn new(
        app_name: impl Into<String>,
        version: u64,
        config: HashMap<String, String>,
        slug_url: Option<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            version,
            config,
            slug_url,
            image_name: None,
        }
    }

    /// Stable external identifier: `<app>-<version>`.
    pub fn name(&self) -> String {
        format!("{}-{}", self.app_name, self.version)
    }

    /// Config rendered as `KEY=VALUE` entries.
    ///
    /// Order is unspecified; callers must not rely on it.
    pub fn config_slice(&self) -> Vec<String> {
        self.config
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect()
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn config(&self) -> &HashMap<String, String> {
        &self.config
    }

    pub fn slug_url(&self) -> Option<&str> {
        self.slug_url.as_deref()
    }

    pub fn image_name(&self) -> Option<&str> {
        self.image_name.as_deref()
    }

    /// Record the image a driver built for this release.
    pub fn set_image_name(&mut self, image: impl Into<String>) {
        self.image_name = Some(image.into());
    }
}

/// One process-type declaration: `quantity` replicas of `args`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formation {
    process_type: String,
    quantity: usize,
    args: Vec<String>,
}

impl Formation {
    pub fn new(process_type: impl Into<String>, quantity: usize, args: Vec<String>) -> Self {
        Self {
            process_type: process_type.into(),
            quantity,
            args,
        }
    }

    pub fn process_type(&self) -> &str {
        &self.process_type
    }

    pub fn quantity(&self) -> usize {
        self.quantity
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

/// Terminal status of one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// The unit ran to completion with this exit code.
    Exited(i32),
    /// The unit could not be started or waited on.
    Failed(String),
}

impl ExitStatus {
    pub fn failed(err: impl fmt::Display) -> Self {
        ExitStatus::Failed(err.to_string())
    }

    /// Real exit code, if the unit ran.
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Failed(_) => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExitStatus::Failed(_))
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exited with code {code}"),
            ExitStatus::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    /// Units killed by a signal report `128 + signo`, the shell convention.
    fn from(status: std::process::ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitStatus::Exited(code);
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitStatus::Exited(128 + sig);
            }
        }

        ExitStatus::Exited(-1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_name_joins_app_and_version() {
        let r = Release::new("myapp", 12, HashMap::new(), None);
        assert_eq!(r.name(), "myapp-12");
    }

    #[test]
    fn config_slice_renders_every_pair() {
        let mut config = HashMap::new();
        config.insert("A".to_string(), "1".to_string());
        config.insert("B".to_string(), "x=y".to_string());
        let r = Release::new("app", 1, config, None);

        let mut slice = r.config_slice();
        slice.sort();
        assert_eq!(slice, vec!["A=1".to_string(), "B=x=y".to_string()]);
    }

    #[test]
    fn image_name_starts_empty() {
        let mut r = Release::new("app", 1, HashMap::new(), None);
        assert!(r.image_name().is_none());
        r.set_image_name("dynosup/app:1");
        assert_eq!(r.image_name(), Some("dynosup/app:1"));
    }

    #[test]
    fn exit_status_code_only_for_exited() {
        assert_eq!(ExitStatus::Exited(3).code(), Some(3));
        assert_eq!(ExitStatus::failed("boom").code(), None);
        assert!(ExitStatus::failed("boom").is_failure());
    }
}
