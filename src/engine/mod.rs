// src/engine/mod.rs

//! Execution engine for procflow.
//!
//! This module ties together:
//! - the activity instances of one process graph
//! - the host/boundary attachment records
//! - take/discard propagation over sequence flows
//! - timer arming and elapse handling
//! - stop/resume
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use serde_json::Value;

use crate::config::model::RuntimeSection;
use crate::timer::TimerId;
use crate::types::NodeId;

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// If true, the core requests exit once no instance holds a token.
    pub exit_when_complete: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            exit_when_complete: true,
        }
    }
}

impl From<RuntimeSection> for RuntimeOptions {
    fn from(section: RuntimeSection) -> Self {
        Self {
            exit_when_complete: section.exit_when_complete,
        }
    }
}

/// Events flowing into the runtime from the CLI, timers, etc.
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeEvent {
    /// Activate every instance and run the start events.
    Start,
    /// Complete a waiting instance, or fire a timer-armed one early.
    Signal {
        node: NodeId,
        payload: Option<Value>,
    },
    /// Explicitly cancel an instance.
    Cancel { node: NodeId },
    /// Explicitly discard an instance.
    Discard { node: NodeId },
    /// A scheduled timer elapsed.
    TimerElapsed { timer: TimerId },
    /// Suspend the process to a snapshot.
    Stop,
    /// Graceful shutdown requested (e.g. Ctrl-C); suspends like `Stop`.
    ShutdownRequested,
}

pub mod attachment;
pub mod core;
pub mod event_handlers;
pub mod propagation;
pub mod runtime;

pub use attachment::Attachment;
pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use runtime::{RunOutcome, Runtime};
