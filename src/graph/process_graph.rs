// src/graph/process_graph.rs

use std::collections::{BTreeMap, HashSet};

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::{depth_first_search, DfsEvent};

use crate::config::model::{ProcessDefinition, TimerDefinition};
use crate::graph::flow::SequenceFlow;
use crate::types::{FlowId, NodeId, NodeType};

/// Immutable node definition with its resolved flow adjacency.
#[derive(Debug, Clone)]
pub struct NodeDef {
    pub id: NodeId,
    pub kind: NodeType,
    pub name: Option<String>,
    /// Inbound flow ids, ordered by flow id.
    pub inbound: Vec<FlowId>,
    /// Outbound flow ids, ordered by flow id.
    pub outbound: Vec<FlowId>,
    pub attached_to: Option<NodeId>,
    /// The `interrupting` flag; only meaningful for boundary events.
    pub cancel_activity: bool,
    pub timer: Option<TimerDefinition>,
}

/// In-memory process graph built from a validated [`ProcessDefinition`].
///
/// Validation already guarantees that every flow and attachment reference
/// resolves, so lookups here only fail for ids coming from outside
/// (commands, snapshots).
#[derive(Debug, Clone)]
pub struct ProcessGraph {
    id: String,
    nodes: BTreeMap<NodeId, NodeDef>,
    flows: BTreeMap<FlowId, SequenceFlow>,
    /// Host id -> attached boundary ids.
    boundaries: BTreeMap<NodeId, Vec<NodeId>>,
    /// Flows that close a cycle (back edges of a walk from the entry nodes).
    loop_flows: HashSet<FlowId>,
}

impl ProcessGraph {
    pub fn from_definition(def: &ProcessDefinition) -> Self {
        let mut nodes: BTreeMap<NodeId, NodeDef> = BTreeMap::new();

        for (id, node) in def.node.iter() {
            nodes.insert(
                id.clone(),
                NodeDef {
                    id: id.clone(),
                    kind: node.kind,
                    name: node.name.clone(),
                    inbound: Vec::new(),
                    outbound: Vec::new(),
                    attached_to: node.attached_to.clone(),
                    cancel_activity: node.interrupting,
                    timer: node.timer.clone(),
                },
            );
        }

        let mut flows = BTreeMap::new();
        for (id, flow) in def.flow.iter() {
            if let Some(source) = nodes.get_mut(&flow.source) {
                source.outbound.push(id.clone());
            }
            if let Some(target) = nodes.get_mut(&flow.target) {
                target.inbound.push(id.clone());
            }
            flows.insert(
                id.clone(),
                SequenceFlow::new(id.clone(), flow.source.clone(), flow.target.clone()),
            );
        }

        let mut boundaries: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for node in nodes.values() {
            if let Some(host) = &node.attached_to {
                boundaries.entry(host.clone()).or_default().push(node.id.clone());
            }
        }

        let loop_flows = find_loop_flows(&nodes, &flows, &boundaries);

        Self {
            id: def.process.id.clone(),
            nodes,
            flows,
            boundaries,
            loop_flows,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node(&self, id: &str) -> Option<&NodeDef> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes.values()
    }

    pub fn flow(&self, id: &str) -> Option<&SequenceFlow> {
        self.flows.get(id)
    }

    pub fn flows(&self) -> impl Iterator<Item = &SequenceFlow> {
        self.flows.values()
    }

    /// Nodes that start the process.
    pub fn start_nodes(&self) -> impl Iterator<Item = &NodeDef> {
        self.nodes
            .values()
            .filter(|n| n.kind == NodeType::StartEvent)
    }

    /// Hosts paired with their attached boundary ids.
    pub fn attachments(&self) -> impl Iterator<Item = (&NodeId, &Vec<NodeId>)> {
        self.boundaries.iter()
    }

    pub fn boundaries_of(&self, host: &str) -> &[NodeId] {
        self.boundaries
            .get(host)
            .map(|b| b.as_slice())
            .unwrap_or(&[])
    }

    /// True when `flow` leads back into a cycle it came out of.
    pub fn is_loop_flow(&self, flow: &str) -> bool {
        self.loop_flows.contains(flow)
    }
}

/// Walk depth-first from every node without inbound flows (then from the
/// rest, for completeness) and collect the flows seen as back edges.
/// Host -> boundary edges take part in the walk but are never flows.
fn find_loop_flows(
    nodes: &BTreeMap<NodeId, NodeDef>,
    flows: &BTreeMap<FlowId, SequenceFlow>,
    boundaries: &BTreeMap<NodeId, Vec<NodeId>>,
) -> HashSet<FlowId> {
    let mut g: DiGraphMap<&str, ()> = DiGraphMap::new();
    for id in nodes.keys() {
        g.add_node(id.as_str());
    }
    for flow in flows.values() {
        g.add_edge(flow.source_ref.as_str(), flow.target_ref.as_str(), ());
    }
    for (host, attached) in boundaries {
        for boundary in attached {
            g.add_edge(host.as_str(), boundary.as_str(), ());
        }
    }

    let roots = nodes
        .values()
        .filter(|n| n.inbound.is_empty() && n.attached_to.is_none())
        .chain(nodes.values())
        .map(|n| n.id.as_str());

    let mut back_edges: HashSet<(&str, &str)> = HashSet::new();
    depth_first_search(&g, roots, |event| {
        if let DfsEvent::BackEdge(from, to) = event {
            back_edges.insert((from, to));
        }
    });

    flows
        .values()
        .filter(|f| back_edges.contains(&(f.source_ref.as_str(), f.target_ref.as_str())))
        .map(|f| f.id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_raw;

    #[test]
    fn adjacency_and_attachments_are_indexed() {
        let raw = parse_raw(
            r#"
[process]
id = "p"

[node.start]
type = "startEvent"

[node.work]
type = "userTask"

[node.late]
type = "boundaryEvent"
attached_to = "work"
interrupting = false
timer = { duration = "PT1S" }

[node.end]
type = "endEvent"

[flow.a]
source = "start"
target = "work"

[flow.b]
source = "work"
target = "end"

[flow.c]
source = "late"
target = "end"
"#,
        )
        .unwrap();
        let def = ProcessDefinition::try_from(raw).unwrap();
        let graph = ProcessGraph::from_definition(&def);

        assert_eq!(graph.id(), "p");
        assert_eq!(graph.node("end").unwrap().inbound, vec!["b", "c"]);
        assert_eq!(graph.node("work").unwrap().outbound, vec!["b"]);
        assert_eq!(graph.boundaries_of("work"), ["late".to_string()]);
        assert!(!graph.node("late").unwrap().cancel_activity);
        assert_eq!(graph.start_nodes().count(), 1);
        assert_eq!(graph.flow("c").unwrap().target_ref, "end");
        assert!(graph.flows().all(|f| !graph.is_loop_flow(&f.id)));
    }

    #[test]
    fn only_the_closing_flow_of_a_cycle_is_a_loop_flow() {
        let raw = parse_raw(
            r#"
[process]
id = "p"

[node.start]
type = "startEvent"

[node.review]
type = "userTask"

[node.a]
type = "task"

[node.b]
type = "task"

[node.join]
type = "userTask"

[node.end]
type = "endEvent"

[flow.s]
source = "start"
target = "review"

[flow.ra]
source = "review"
target = "a"

[flow.rb]
source = "review"
target = "b"

[flow.aj]
source = "a"
target = "join"

[flow.bj]
source = "b"
target = "join"

[flow.back]
source = "join"
target = "review"

[flow.done]
source = "join"
target = "end"
"#,
        )
        .unwrap();
        let def = ProcessDefinition::try_from(raw).unwrap();
        let graph = ProcessGraph::from_definition(&def);

        assert!(graph.is_loop_flow("back"));
        for flow in ["s", "ra", "rb", "aj", "bj", "done"] {
            assert!(!graph.is_loop_flow(flow), "flow {flow}");
        }
    }
}
