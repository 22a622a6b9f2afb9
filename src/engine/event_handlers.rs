// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.
//!
//! Every handler validates the addressed instance before touching anything,
//! so a rejected event leaves the core unchanged.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info};

use crate::activity::{ActivityState, Behaviour, Notification};
use crate::engine::propagation::{Effects, Execution, OutboundPolicy};
use crate::errors::{FlowError, Result};
use crate::graph::FlowMessage;
use crate::snapshot::Snapshot;
use crate::timer::TimerId;
use crate::types::NodeId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    /// Deliver `TimerElapsed { timer }` after `delay`.
    ScheduleTimer {
        timer: TimerId,
        node: NodeId,
        delay: Duration,
    },
    /// Drop a previously scheduled timer.
    CancelTimer { timer: TimerId },
    /// Request that the process exits (process completed or stopped).
    RequestExit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug)]
pub struct CoreStep {
    /// Commands the IO shell should execute.
    pub commands: Vec<CoreCommand>,
    /// Lifecycle notifications, in emission order.
    pub notifications: Vec<Notification>,
    /// Every take/discard delivered while handling the event, in order.
    pub flows: Vec<FlowMessage>,
    /// Non-fatal failures (e.g. timer resolution) hit along the way.
    pub errors: Vec<FlowError>,
    /// Set when the event suspended the process.
    pub snapshot: Option<Snapshot>,
    /// Set on the step in which the process completed.
    pub completed: bool,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreStep {
    pub fn idle() -> Self {
        Self::from_effects(Effects::default())
    }

    pub(crate) fn from_effects(effects: Effects) -> Self {
        Self {
            commands: effects.commands,
            notifications: effects.notifications,
            flows: effects.flows,
            errors: effects.errors,
            snapshot: None,
            completed: false,
            keep_running: true,
        }
    }
}

/// Activate every instance, then run each start event.
pub fn handle_start(exec: &mut Execution<'_>) -> Result<()> {
    exec.activate_all()?;
    let graph = exec.graph();
    for start in graph.start_nodes() {
        info!(node = %start.id, "starting process at start event");
        exec.enter_and_run(&start.id, None)?;
    }
    exec.drain()
}

/// Complete a waiting instance, or fire a timer-armed running one early.
pub fn handle_signal(exec: &mut Execution<'_>, node: &str, payload: Option<Value>) -> Result<()> {
    let inst = exec.instance(node)?;
    match (inst.state(), inst.behaviour()) {
        (ActivityState::Waiting, _) => {
            debug!(node = %node, "signal completes waiting instance");
            exec.set_output(node, payload)?;
            exec.complete_node(node)?;
        }
        (ActivityState::Running, Behaviour::Timer) => {
            debug!(node = %node, "signal fires timer instance early");
            exec.set_output(node, payload)?;
            exec.cancel_timer_of(node)?;
            exec.fire_node(node)?;
        }
        (state, _) => return Err(FlowError::invalid(node, state, "signal")),
    }
    exec.drain()
}

/// Explicit cancel. Own outbound flows stay untouched.
pub fn handle_cancel(exec: &mut Execution<'_>, node: &str) -> Result<()> {
    let canceled = match exec.attachment_of_boundary(node) {
        Some(attachment) => attachment.cancel_boundary(exec, node)?,
        None => exec.cancel_node(node, OutboundPolicy::Silent)?,
    };
    if !canceled {
        debug!(node = %node, "cancel was a no-op");
    }
    exec.drain()
}

/// Explicit discard.
pub fn handle_discard(exec: &mut Execution<'_>, node: &str) -> Result<()> {
    let inst = exec.instance(node)?;
    if inst.state() == ActivityState::Left {
        if inst.last_terminal() == Some(ActivityState::Discarded) {
            debug!(node = %node, "already discarded; ignoring discard");
            return Ok(());
        }
        return Err(FlowError::invalid(node, ActivityState::Left, "discard"));
    }
    if inst.state() == ActivityState::Idle {
        return Err(FlowError::invalid(node, ActivityState::Idle, "discard"));
    }

    match exec.attachment_of_boundary(node) {
        Some(attachment) => attachment.discard_boundary(exec, node)?,
        None => exec.discard_node(node)?,
    }
    exec.drain()
}

/// A timer elapsed. Stale timers are ignored.
pub fn handle_timer_elapsed(exec: &mut Execution<'_>, timer: TimerId) -> Result<()> {
    let Some(owner) = exec.claim_elapsed(timer)? else {
        debug!(%timer, "stale timer elapsed; ignoring");
        return Ok(());
    };
    info!(node = %owner, %timer, "timer fired");
    exec.fire_node(&owner)?;
    exec.drain()
}
