// src/config/mod.rs

//! Process definition loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a definition file from disk (`loader.rs`).
//! - Validate references, boundary attachment and timer placement rules
//!   (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_raw};
pub use model::{
    FlowConfig, NodeConfig, ProcessDefinition, ProcessSection, RawProcessFile, RuntimeSection,
    TimerDefinition,
};
