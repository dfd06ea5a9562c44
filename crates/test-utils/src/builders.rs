#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use dynosup::driver::DynoDriver;
use dynosup::engine::Processes;
use dynosup::types::{Formation, Release};

/// Builder for a [`Release`] plus its formations, producing a [`Processes`]
/// topology ready to be started.
pub struct ReleaseBuilder {
    app: String,
    version: u64,
    config: HashMap<String, String>,
    slug_url: Option<String>,
    formations: Vec<Formation>,
}

impl ReleaseBuilder {
    pub fn new(app: &str, version: u64) -> Self {
        Self {
            app: app.to_string(),
            version,
            config: HashMap::new(),
            slug_url: None,
            formations: Vec::new(),
        }
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.insert(key.to_string(), value.to_string());
        self
    }

    pub fn slug_url(mut self, url: &str) -> Self {
        self.slug_url = Some(url.to_string());
        self
    }

    pub fn formation(mut self, formation: Formation) -> Self {
        self.formations.push(formation);
        self
    }

    pub fn release(&self) -> Release {
        Release::new(
            self.app.clone(),
            self.version,
            self.config.clone(),
            self.slug_url.clone(),
        )
    }

    pub fn processes(self, driver: Arc<dyn DynoDriver>) -> Processes {
        let release = self.release();
        Processes::new(release, self.formations, driver)
    }
}

/// Builder for a [`Formation`].
pub struct FormationBuilder {
    process_type: String,
    quantity: usize,
    args: Vec<String>,
}

impl FormationBuilder {
    pub fn new(process_type: &str) -> Self {
        Self {
            process_type: process_type.to_string(),
            quantity: 1,
            args: vec![format!("bin/{process_type}")],
        }
    }

    pub fn quantity(mut self, quantity: usize) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn args(mut self, args: &[&str]) -> Self {
        self.args = args.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn build(self) -> Formation {
        Formation::new(self.process_type, self.quantity, self.args)
    }
}
