// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawReleaseFile, ReleaseFile};
use crate::errors::Result;

/// File name the directory poller looks for inside the control directory.
pub const CONTROL_FILE_NAME: &str = "release.toml";

/// Load a control file from a given path and return the raw `RawReleaseFile`.
///
/// This only performs TOML deserialization; use [`load_and_validate`] for the
/// semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawReleaseFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Parse control file contents that were already read.
pub fn parse_str(contents: &str) -> Result<RawReleaseFile> {
    let raw: RawReleaseFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load a control file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ReleaseFile> {
    let raw = load_from_path(&path)?;
    ReleaseFile::try_from(raw)
}
