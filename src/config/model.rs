// src/config/model.rs

use std::collections::HashMap;

use serde::Deserialize;

use crate::types::{Formation, Release};

/// Release control file as read from TOML, before validation.
///
/// ```toml
/// [app]
/// name = "myapp"
/// version = 7
/// slug_url = "https://example.com/slug.tgz"
///
/// [app.env]
/// DATABASE_URL = "postgres://localhost/myapp"
///
/// [[process]]
/// type = "web"
/// quantity = 2
/// args = ["bin/web", "--port", "5000"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawReleaseFile {
    pub app: AppSection,

    /// `[[process]]` entries; a release may declare none.
    #[serde(default)]
    pub process: Vec<ProcessSection>,
}

/// `[app]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    pub name: String,

    pub version: u64,

    /// Where the application code lives, for drivers that fetch it.
    #[serde(default)]
    pub slug_url: Option<String>,

    /// Config vars exported to every dyno.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// One `[[process]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSection {
    #[serde(rename = "type")]
    pub process_type: String,

    #[serde(default = "default_quantity")]
    pub quantity: usize,

    pub args: Vec<String>,
}

fn default_quantity() -> usize {
    1
}

/// A validated release control file.
///
/// Only obtainable through `TryFrom<RawReleaseFile>` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ReleaseFile {
    pub app: AppSection,
    pub process: Vec<ProcessSection>,
}

impl ReleaseFile {
    pub(crate) fn new_unchecked(app: AppSection, process: Vec<ProcessSection>) -> Self {
        Self { app, process }
    }

    pub fn release(&self) -> Release {
        Release::new(
            self.app.name.clone(),
            self.app.version,
            self.app.env.clone(),
            self.app.slug_url.clone(),
        )
    }

    pub fn formations(&self) -> Vec<Formation> {
        self.process
            .iter()
            .map(|p| Formation::new(p.process_type.clone(), p.quantity, p.args.clone()))
            .collect()
    }
}
