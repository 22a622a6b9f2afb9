use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical node id type used throughout the runtime.
pub type NodeId = String;

/// Canonical sequence flow id type.
pub type FlowId = String;

/// Kind of flow node, as named in the process definition.
///
/// The kind selects the behaviour plugged into the generic activity
/// lifecycle (see [`crate::activity::behaviour`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    StartEvent,
    EndEvent,
    /// Completes synchronously as soon as it runs.
    Task,
    /// Waits for an external signal.
    UserTask,
    /// Attached to a host activity; armed while the host runs.
    BoundaryEvent,
    /// Timer catch event sitting in the sequence flow.
    IntermediateCatchEvent,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::StartEvent => "startEvent",
            NodeType::EndEvent => "endEvent",
            NodeType::Task => "task",
            NodeType::UserTask => "userTask",
            NodeType::BoundaryEvent => "boundaryEvent",
            NodeType::IntermediateCatchEvent => "intermediateCatchEvent",
        }
    }

    pub fn is_boundary(&self) -> bool {
        matches!(self, NodeType::BoundaryEvent)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "startEvent" => Ok(NodeType::StartEvent),
            "endEvent" => Ok(NodeType::EndEvent),
            "task" => Ok(NodeType::Task),
            "userTask" => Ok(NodeType::UserTask),
            "boundaryEvent" => Ok(NodeType::BoundaryEvent),
            "intermediateCatchEvent" => Ok(NodeType::IntermediateCatchEvent),
            other => Err(format!("unknown node type: {other}")),
        }
    }
}

/// What a single inbound flow has delivered to its target during the
/// current run window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowMark {
    Taken,
    Discarded,
}
