// src/activity/behaviour.rs

//! Node-type behaviour plugged into the generic lifecycle.
//!
//! The lifecycle (state table, notifications, flow propagation) is the same
//! for every node; only what happens once an instance runs differs.

use crate::activity::ActivityState;
use crate::types::NodeType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Completes in the same step it runs (start, end, plain task).
    Immediate,
    /// Moves to Waiting until signaled (user task).
    AwaitSignal,
    /// Stays Running with a timer armed; completes when it elapses.
    Timer,
}

impl Behaviour {
    pub fn for_node(kind: NodeType) -> Self {
        match kind {
            NodeType::StartEvent | NodeType::EndEvent | NodeType::Task => Behaviour::Immediate,
            NodeType::UserTask => Behaviour::AwaitSignal,
            NodeType::BoundaryEvent | NodeType::IntermediateCatchEvent => Behaviour::Timer,
        }
    }

    /// Whether `state` is a state an entered instance of this behaviour can
    /// rest in between events (and therefore appear in a snapshot).
    pub fn rests_in(self, state: ActivityState) -> bool {
        match self {
            Behaviour::Immediate => false,
            Behaviour::AwaitSignal => state == ActivityState::Waiting,
            Behaviour::Timer => state == ActivityState::Running,
        }
    }
}
