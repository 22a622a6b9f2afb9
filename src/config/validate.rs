// src/config/validate.rs

use std::collections::HashSet;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;

use crate::activity::Behaviour;

use crate::config::model::{ProcessDefinition, RawProcessFile};
use crate::errors::{FlowError, Result};
use crate::timer::duration::{has_expression, parse_duration};
use crate::types::NodeType;

impl TryFrom<RawProcessFile> for ProcessDefinition {
    type Error = FlowError;

    fn try_from(raw: RawProcessFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_definition(&raw)?;
        Ok(ProcessDefinition::new_unchecked(raw))
    }
}

fn validate_raw_definition(def: &RawProcessFile) -> Result<()> {
    ensure_has_start(def)?;
    validate_flows(def)?;
    validate_attachments(def)?;
    validate_timers(def)?;
    validate_reachability(def)?;
    validate_immediate_cycles(def)?;
    Ok(())
}

fn ensure_has_start(def: &RawProcessFile) -> Result<()> {
    if def.process.id.trim().is_empty() {
        return Err(FlowError::ConfigError(
            "[process].id must not be empty".to_string(),
        ));
    }
    if !def.node.values().any(|n| n.kind == NodeType::StartEvent) {
        return Err(FlowError::ConfigError(
            "process must contain at least one startEvent node".to_string(),
        ));
    }
    Ok(())
}

fn validate_flows(def: &RawProcessFile) -> Result<()> {
    for (id, flow) in def.flow.iter() {
        let source = def.node.get(&flow.source).ok_or_else(|| {
            FlowError::ConfigError(format!(
                "flow '{}' has unknown source '{}'",
                id, flow.source
            ))
        })?;
        let target = def.node.get(&flow.target).ok_or_else(|| {
            FlowError::ConfigError(format!(
                "flow '{}' has unknown target '{}'",
                id, flow.target
            ))
        })?;

        if source.kind == NodeType::EndEvent {
            return Err(FlowError::ConfigError(format!(
                "flow '{}' leaves endEvent '{}'",
                id, flow.source
            )));
        }
        match target.kind {
            NodeType::StartEvent | NodeType::BoundaryEvent => {
                return Err(FlowError::ConfigError(format!(
                    "flow '{}' targets {} '{}', which cannot have inbound flows",
                    id, target.kind, flow.target
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_attachments(def: &RawProcessFile) -> Result<()> {
    for (id, node) in def.node.iter() {
        match (node.kind, node.attached_to.as_deref()) {
            (NodeType::BoundaryEvent, None) => {
                return Err(FlowError::ConfigError(format!(
                    "boundaryEvent '{}' is missing `attached_to`",
                    id
                )));
            }
            (NodeType::BoundaryEvent, Some(host_id)) => {
                let host = def.node.get(host_id).ok_or_else(|| {
                    FlowError::ConfigError(format!(
                        "boundaryEvent '{}' is attached to unknown node '{}'",
                        id, host_id
                    ))
                })?;
                if !matches!(host.kind, NodeType::Task | NodeType::UserTask) {
                    return Err(FlowError::ConfigError(format!(
                        "boundaryEvent '{}' must be attached to a task, not {} '{}'",
                        id, host.kind, host_id
                    )));
                }
            }
            (_, Some(host_id)) => {
                return Err(FlowError::ConfigError(format!(
                    "node '{}' of type {} cannot be attached to '{}'",
                    id, node.kind, host_id
                )));
            }
            (_, None) => {}
        }
    }
    Ok(())
}

fn validate_timers(def: &RawProcessFile) -> Result<()> {
    for (id, node) in def.node.iter() {
        match (&node.timer, node.kind) {
            (None, NodeType::IntermediateCatchEvent) => {
                return Err(FlowError::ConfigError(format!(
                    "intermediateCatchEvent '{}' requires a timer",
                    id
                )));
            }
            (Some(_), NodeType::BoundaryEvent | NodeType::IntermediateCatchEvent) | (None, _) => {}
            (Some(_), other) => {
                return Err(FlowError::ConfigError(format!(
                    "node '{}' of type {} cannot carry a timer",
                    id, other
                )));
            }
        }

        // Expressions depend on variables and are resolved when armed.
        if let Some(timer) = &node.timer {
            if !has_expression(&timer.duration) {
                parse_duration(&timer.duration).map_err(|e| {
                    FlowError::ConfigError(format!("node '{}': {}", id, e))
                })?;
            }
        }
    }
    Ok(())
}

fn validate_reachability(def: &RawProcessFile) -> Result<()> {
    // Edges: flow source -> target, and host -> boundary for attachments.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in def.node.keys() {
        graph.add_node(name.as_str());
    }
    for flow in def.flow.values() {
        graph.add_edge(flow.source.as_str(), flow.target.as_str(), ());
    }
    for (id, node) in def.node.iter() {
        if let Some(host) = node.attached_to.as_deref() {
            graph.add_edge(host, id.as_str(), ());
        }
    }

    let mut reached: HashSet<&str> = HashSet::new();
    for (id, node) in def.node.iter() {
        if node.kind != NodeType::StartEvent {
            continue;
        }
        let mut dfs = Dfs::new(&graph, id.as_str());
        while let Some(nx) = dfs.next(&graph) {
            reached.insert(nx);
        }
    }

    if let Some(orphan) = def.node.keys().find(|id| !reached.contains(id.as_str())) {
        return Err(FlowError::ConfigError(format!(
            "node '{}' is not reachable from any startEvent",
            orphan
        )));
    }

    Ok(())
}

/// A cycle made only of nodes that complete on entry would propagate forever
/// inside a single event. Every cycle needs a node that waits (a user task,
/// a timer) somewhere along it.
fn validate_immediate_cycles(def: &RawProcessFile) -> Result<()> {
    let immediate = |id: &str| {
        def.node
            .get(id)
            .is_some_and(|n| Behaviour::for_node(n.kind) == Behaviour::Immediate)
    };

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for flow in def.flow.values() {
        if immediate(&flow.source) && immediate(&flow.target) {
            graph.add_edge(flow.source.as_str(), flow.target.as_str(), ());
        }
    }

    for mut component in tarjan_scc(&graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .is_some_and(|n| graph.contains_edge(*n, *n));
        if cyclic {
            component.sort_unstable();
            return Err(FlowError::ConfigError(format!(
                "cycle through nodes that never wait: {}",
                component.join(", ")
            )));
        }
    }

    Ok(())
}
