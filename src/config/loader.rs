// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{ProcessDefinition, RawProcessFile};
use crate::errors::Result;

/// Load a process definition from a given path and return the raw
/// `RawProcessFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawProcessFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_raw(&contents)
}

/// Parse TOML text into a `RawProcessFile`.
pub fn parse_raw(contents: &str) -> Result<RawProcessFile> {
    let raw: RawProcessFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load a process definition from path and validate it.
///
/// Checks unknown flow/attachment references, boundary and timer placement
/// rules, literal timer syntax and reachability from the start events.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ProcessDefinition> {
    let raw = load_from_path(&path)?;
    ProcessDefinition::try_from(raw)
}
