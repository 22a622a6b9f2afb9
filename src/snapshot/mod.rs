// src/snapshot/mod.rs

//! Serializable process state for stop/resume.
//!
//! A snapshot is produced by `CoreRuntime::snapshot` (or the `Stop` event)
//! and consumed once by `CoreRuntime::resume`. The JSON form is the
//! interchange format; it is written and read unchanged.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::activity::ActivityState;
use crate::errors::Result;
use crate::types::{FlowId, NodeId, NodeType};

/// Root of the snapshot tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub process_id: String,
    #[serde(default)]
    pub variables: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<InstanceSnapshot>,
}

impl Snapshot {
    pub fn child(&self, id: &str) -> Option<&InstanceSnapshot> {
        self.children.iter().find(|c| c.id == id)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn read_from(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }
}

/// State of one instance.
///
/// Timer-armed instances carry the remaining ms in both `timeout` and
/// `duration`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSnapshot {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub entered: bool,
    pub state: ActivityState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_to_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_activity: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Inbound flows that already delivered a take in the open window.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub taken_inbound: Vec<FlowId>,
    /// Inbound flows that already delivered a discard in the open window.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discarded_inbound: Vec<FlowId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_are_camel_case() {
        let snap = Snapshot {
            process_id: "p".into(),
            variables: Map::new(),
            children: vec![InstanceSnapshot {
                id: "expire".into(),
                node_type: NodeType::BoundaryEvent,
                entered: true,
                state: ActivityState::Running,
                attached_to_id: Some("approve".into()),
                cancel_activity: Some(true),
                timeout: Some(60),
                duration: Some(60),
                output: None,
                taken_inbound: Vec::new(),
                discarded_inbound: Vec::new(),
            }],
        };

        let json: Value = serde_json::from_str(&snap.to_json_pretty().unwrap()).unwrap();
        let child = &json["children"][0];
        assert_eq!(json["processId"], "p");
        assert_eq!(child["type"], "boundaryEvent");
        assert_eq!(child["attachedToId"], "approve");
        assert_eq!(child["cancelActivity"], true);
        assert_eq!(child["state"], "running");
        assert!(child.get("output").is_none());
        assert!(child.get("takenInbound").is_none());
    }

    #[test]
    fn minimal_entries_parse() {
        let snap = Snapshot::from_json(
            r#"{"processId":"p","children":[{"id":"a","type":"task","entered":false,"state":"armed"}]}"#,
        )
        .unwrap();
        let a = snap.child("a").unwrap();
        assert_eq!(a.state, ActivityState::Armed);
        assert_eq!(a.timeout, None);
        assert!(snap.variables.is_empty());
    }
}
