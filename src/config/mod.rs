// src/config/mod.rs

//! Configuration loading and validation for dynosup.
//!
//! Responsibilities:
//! - Define the TOML-backed release control file (`model.rs`).
//! - Load a control file from disk (`loader.rs`).
//! - Validate app, formation and env invariants (`validate.rs`).
//! - Resolve the dyno driver selection once at startup (`driver.rs`).

pub mod driver;
pub mod loader;
pub mod model;
pub mod validate;

pub use driver::{DriverConfig, DriverKind, LibContainerSettings};
pub use loader::{load_and_validate, load_from_path, CONTROL_FILE_NAME};
pub use model::{AppSection, ProcessSection, RawReleaseFile, ReleaseFile};
