// src/config/model.rs

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::NodeType;

/// Process definition as read from a TOML file, before validation.
///
/// ```toml
/// [process]
/// id = "approval"
///
/// [variables]
/// timeout = 0.2
///
/// [node.start]
/// type = "startEvent"
///
/// [node.approve]
/// type = "userTask"
///
/// [node.expire]
/// type = "boundaryEvent"
/// attached_to = "approve"
/// timer = { duration = "PT${variables.timeout}S" }
///
/// [flow.to-approve]
/// source = "start"
/// target = "approve"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawProcessFile {
    pub process: ProcessSection,

    #[serde(default)]
    pub runtime: RuntimeSection,

    /// Initial process variables, readable by timer expressions as
    /// `${variables.<name>}`.
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// All nodes from `[node.<id>]`.
    #[serde(default)]
    pub node: BTreeMap<String, NodeConfig>,

    /// All sequence flows from `[flow.<id>]`.
    #[serde(default)]
    pub flow: BTreeMap<String, FlowConfig>,
}

/// A validated process definition.
///
/// Only obtainable through `TryFrom<RawProcessFile>` (see `validate.rs`), so
/// everything downstream may assume references resolve and boundary rules
/// hold.
#[derive(Debug, Clone)]
pub struct ProcessDefinition {
    pub process: ProcessSection,
    pub runtime: RuntimeSection,
    pub variables: Map<String, Value>,
    pub node: BTreeMap<String, NodeConfig>,
    pub flow: BTreeMap<String, FlowConfig>,
}

impl ProcessDefinition {
    pub(crate) fn new_unchecked(raw: RawProcessFile) -> Self {
        Self {
            process: raw.process,
            runtime: raw.runtime,
            variables: raw.variables,
            node: raw.node,
            flow: raw.flow,
        }
    }

    /// Override (or add) a process variable, e.g. from `--var` on the CLI.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }
}

/// `[process]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSection {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,
}

/// `[runtime]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RuntimeSection {
    /// Stop the runtime loop once no activity is running or waiting.
    #[serde(default = "default_true")]
    pub exit_when_complete: bool,
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            exit_when_complete: true,
        }
    }
}

/// `[node.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    #[serde(rename = "type")]
    pub kind: NodeType,

    #[serde(default)]
    pub name: Option<String>,

    /// Host activity for a `boundaryEvent`.
    #[serde(default)]
    pub attached_to: Option<String>,

    /// Whether a firing boundary event cancels its host. Defaults to `true`.
    #[serde(default = "default_true")]
    pub interrupting: bool,

    #[serde(default)]
    pub timer: Option<TimerDefinition>,
}

/// Timer trigger definition carried by boundary and catch events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerDefinition {
    /// ISO-8601 duration (`PT0.5S`) or an expression (`PT${variables.t}S`).
    pub duration: String,
}

/// `[flow.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    pub source: String,
    pub target: String,
}

fn default_true() -> bool {
    true
}
