// src/activity/notification.rs

use serde::Serialize;

use crate::snapshot::InstanceSnapshot;
use crate::types::{NodeId, NodeType};

/// Lifecycle notifications; each fires at most once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Start,
    Wait,
    End,
    Discarded,
    Leave,
    Error,
}

/// Emitted by the core for observers (CLI output, tests, listeners).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub id: NodeId,
    pub node_type: NodeType,
    /// Instance state at the moment of the notification.
    pub state: InstanceSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
