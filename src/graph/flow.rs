// src/graph/flow.rs

//! Sequence flows and the take/discard messages travelling over them.

use serde::Serialize;

use crate::types::{FlowId, NodeId};

/// A directed edge between two nodes. Carries no per-run state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceFlow {
    pub id: FlowId,
    pub source_ref: NodeId,
    pub target_ref: NodeId,
}

impl SequenceFlow {
    pub fn new(id: impl Into<FlowId>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source_ref: source.into(),
            target_ref: target.into(),
        }
    }

    pub fn take(&self) -> FlowMessage {
        FlowMessage {
            flow: self.id.clone(),
            signal: FlowSignal::Take,
        }
    }

    pub fn discard(&self) -> FlowMessage {
        FlowMessage {
            flow: self.id.clone(),
            signal: FlowSignal::Discard,
        }
    }
}

/// What travels over a flow when its source reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowSignal {
    /// A token is delivered to the target.
    Take,
    /// The target learns this path will never deliver a token.
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowMessage {
    pub flow: FlowId,
    pub signal: FlowSignal,
}
