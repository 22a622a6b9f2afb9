// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::activity::ActivityState;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A timer definition could not be turned into a duration.
    #[error("Timer resolution error: {0}")]
    TimerResolution(String),

    /// A snapshot does not fit the process graph it is resumed against.
    #[error("State mismatch: {0}")]
    StateMismatch(String),

    /// An operation was issued to an instance in a state that does not allow it.
    #[error("Invalid transition: cannot {op} node '{id}' in state {state:?}")]
    InvalidTransition {
        id: String,
        state: ActivityState,
        op: &'static str,
    },

    #[error("Node not found: {0}")]
    UnknownNode(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    pub(crate) fn invalid(id: &str, state: ActivityState, op: &'static str) -> Self {
        FlowError::InvalidTransition {
            id: id.to_string(),
            state,
            op,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowError>;
