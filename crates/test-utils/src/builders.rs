#![allow(dead_code)]

use std::collections::BTreeMap;

use procflow::config::{
    FlowConfig, NodeConfig, ProcessDefinition, ProcessSection, RawProcessFile, RuntimeSection,
    TimerDefinition,
};
use procflow::errors::Result;
use procflow::types::NodeType;
use serde_json::{Map, Value};

/// Builder for `ProcessDefinition` to simplify test setup.
pub struct ProcessBuilder {
    raw: RawProcessFile,
}

impl ProcessBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            raw: RawProcessFile {
                process: ProcessSection {
                    id: id.to_string(),
                    name: None,
                },
                runtime: RuntimeSection::default(),
                variables: Map::new(),
                node: BTreeMap::new(),
                flow: BTreeMap::new(),
            },
        }
    }

    pub fn with_node(mut self, id: &str, node: NodeConfig) -> Self {
        self.raw.node.insert(id.to_string(), node);
        self
    }

    pub fn start(self, id: &str) -> Self {
        self.with_node(id, NodeConfigBuilder::new(NodeType::StartEvent).build())
    }

    pub fn end(self, id: &str) -> Self {
        self.with_node(id, NodeConfigBuilder::new(NodeType::EndEvent).build())
    }

    pub fn task(self, id: &str) -> Self {
        self.with_node(id, NodeConfigBuilder::new(NodeType::Task).build())
    }

    pub fn user_task(self, id: &str) -> Self {
        self.with_node(id, NodeConfigBuilder::new(NodeType::UserTask).build())
    }

    /// Timer boundary event on `host`.
    pub fn boundary(self, id: &str, host: &str, interrupting: bool, duration: &str) -> Self {
        self.with_node(
            id,
            NodeConfigBuilder::new(NodeType::BoundaryEvent)
                .attached_to(host)
                .interrupting(interrupting)
                .timer(duration)
                .build(),
        )
    }

    /// Intermediate timer catch event.
    pub fn catch(self, id: &str, duration: &str) -> Self {
        self.with_node(
            id,
            NodeConfigBuilder::new(NodeType::IntermediateCatchEvent)
                .timer(duration)
                .build(),
        )
    }

    pub fn flow(mut self, id: &str, source: &str, target: &str) -> Self {
        self.raw.flow.insert(
            id.to_string(),
            FlowConfig {
                source: source.to_string(),
                target: target.to_string(),
            },
        );
        self
    }

    pub fn variable(mut self, name: &str, value: Value) -> Self {
        self.raw.variables.insert(name.to_string(), value);
        self
    }

    pub fn exit_when_complete(mut self, val: bool) -> Self {
        self.raw.runtime.exit_when_complete = val;
        self
    }

    pub fn raw(self) -> RawProcessFile {
        self.raw
    }

    pub fn try_build(self) -> Result<ProcessDefinition> {
        ProcessDefinition::try_from(self.raw)
    }

    pub fn build(self) -> ProcessDefinition {
        self.try_build()
            .expect("Failed to build valid process definition from builder")
    }
}

/// Builder for `NodeConfig`.
pub struct NodeConfigBuilder {
    node: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(kind: NodeType) -> Self {
        Self {
            node: NodeConfig {
                kind,
                name: None,
                attached_to: None,
                interrupting: true,
                timer: None,
            },
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.node.name = Some(name.to_string());
        self
    }

    pub fn attached_to(mut self, host: &str) -> Self {
        self.node.attached_to = Some(host.to_string());
        self
    }

    pub fn interrupting(mut self, val: bool) -> Self {
        self.node.interrupting = val;
        self
    }

    pub fn timer(mut self, duration: &str) -> Self {
        self.node.timer = Some(TimerDefinition {
            duration: duration.to_string(),
        });
        self
    }

    pub fn build(self) -> NodeConfig {
        self.node
    }
}
