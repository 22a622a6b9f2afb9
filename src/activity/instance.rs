// src/activity/instance.rs

//! One runtime instance per flow node.
//!
//! The instance only guards its own lifecycle: every transition is checked
//! against [`Transition::target`] and rejected with
//! [`FlowError::InvalidTransition`] when the table does not allow it. Flow
//! propagation, timers and host/boundary coupling are driven from outside by
//! the execution coordinator.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{debug, trace};

use crate::activity::behaviour::Behaviour;
use crate::activity::notification::NotificationKind;
use crate::activity::state::{ActivityState, Transition};
use crate::config::model::TimerDefinition;
use crate::errors::{FlowError, Result};
use crate::graph::NodeDef;
use crate::snapshot::InstanceSnapshot;
use crate::timer::TimerTrigger;
use crate::types::{FlowId, FlowMark, NodeId, NodeType};

#[derive(Debug, Clone)]
pub struct ActivityInstance {
    id: NodeId,
    kind: NodeType,
    behaviour: Behaviour,
    state: ActivityState,
    entered: bool,
    inbound: Vec<FlowId>,
    outbound: Vec<FlowId>,
    /// What each inbound flow delivered in the current run window.
    inbound_marks: BTreeMap<FlowId, FlowMark>,
    attached_to: Option<NodeId>,
    cancel_activity: bool,
    timer_definition: Option<TimerDefinition>,
    timer: Option<TimerTrigger>,
    /// Resolved timer duration in ms for the current run.
    timeout: Option<u64>,
    output: Option<Value>,
    emitted: HashSet<NotificationKind>,
    /// Terminal state the last run ended in, kept after `Left`.
    last_terminal: Option<ActivityState>,
}

impl ActivityInstance {
    pub fn from_def(def: &NodeDef) -> Self {
        Self {
            id: def.id.clone(),
            kind: def.kind,
            behaviour: Behaviour::for_node(def.kind),
            state: ActivityState::Idle,
            entered: false,
            inbound: def.inbound.clone(),
            outbound: def.outbound.clone(),
            inbound_marks: BTreeMap::new(),
            attached_to: def.attached_to.clone(),
            cancel_activity: def.cancel_activity,
            timer_definition: def.timer.clone(),
            timer: None,
            timeout: None,
            output: None,
            emitted: HashSet::new(),
            last_terminal: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> NodeType {
        self.kind
    }

    pub fn behaviour(&self) -> Behaviour {
        self.behaviour
    }

    pub fn state(&self) -> ActivityState {
        self.state
    }

    pub fn is_entered(&self) -> bool {
        self.entered
    }

    pub fn inbound(&self) -> &[FlowId] {
        &self.inbound
    }

    pub fn outbound(&self) -> &[FlowId] {
        &self.outbound
    }

    pub fn attached_to(&self) -> Option<&str> {
        self.attached_to.as_deref()
    }

    pub fn cancel_activity(&self) -> bool {
        self.cancel_activity
    }

    pub fn timer_definition(&self) -> Option<&TimerDefinition> {
        self.timer_definition.as_ref()
    }

    pub fn timer(&self) -> Option<&TimerTrigger> {
        self.timer.as_ref()
    }

    pub fn timeout(&self) -> Option<u64> {
        self.timeout
    }

    pub fn output(&self) -> Option<&Value> {
        self.output.as_ref()
    }

    pub fn last_terminal(&self) -> Option<ActivityState> {
        self.last_terminal
    }

    /// The terminal state of the current or most recent run, if any.
    ///
    /// Instances leave right after terminating, so `state()` mostly reads
    /// `Left`; this reports how that run actually ended.
    pub fn outcome(&self) -> Option<ActivityState> {
        if self.state.is_terminal() {
            Some(self.state)
        } else if self.state == ActivityState::Left {
            self.last_terminal
        } else {
            None
        }
    }

    fn apply(&mut self, transition: Transition) -> Result<ActivityState> {
        let next = transition
            .target(self.state)
            .ok_or_else(|| FlowError::invalid(&self.id, self.state, transition.name()))?;
        trace!(node = %self.id, from = %self.state, to = %next, "transition");
        self.state = next;
        Ok(next)
    }

    /// Clear all per-run data before a new run starts from `Left`.
    fn reset_run(&mut self) {
        self.entered = false;
        self.timer = None;
        self.timeout = None;
        self.output = None;
        self.emitted.clear();
    }

    pub fn activate(&mut self) -> Result<()> {
        self.apply(Transition::Activate)?;
        Ok(())
    }

    /// Consume an inbound token. Starts a fresh run when coming from `Left`.
    pub fn enter(&mut self) -> Result<()> {
        let from = self.state;
        self.apply(Transition::Enter)?;
        if from == ActivityState::Left {
            self.reset_run();
        }
        self.entered = true;
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        self.apply(Transition::Run)?;
        Ok(())
    }

    pub fn wait(&mut self) -> Result<()> {
        self.apply(Transition::Wait)?;
        Ok(())
    }

    pub fn complete(&mut self) -> Result<()> {
        self.apply(Transition::Complete)?;
        Ok(())
    }

    /// Cancel the instance.
    ///
    /// Returns `Ok(false)` when the instance is already canceled (or left
    /// after a cancel), so a repeated cancel is a no-op.
    pub fn cancel(&mut self) -> Result<bool> {
        if self.outcome() == Some(ActivityState::Canceled) {
            debug!(node = %self.id, "already canceled; ignoring cancel");
            return Ok(false);
        }
        self.apply(Transition::Cancel)?;
        Ok(true)
    }

    /// Discard the instance. Same idempotence rule as [`cancel`](Self::cancel).
    pub fn discard(&mut self) -> Result<bool> {
        if self.outcome() == Some(ActivityState::Discarded) && !self.has_marks() {
            debug!(node = %self.id, "already discarded; ignoring discard");
            return Ok(false);
        }
        let from = self.state;
        self.apply(Transition::Discard)?;
        if from == ActivityState::Left {
            self.reset_run();
        }
        Ok(true)
    }

    pub fn leave(&mut self) -> Result<()> {
        let terminal = self.state;
        self.apply(Transition::Leave)?;
        self.last_terminal = Some(terminal);
        self.entered = false;
        self.timer = None;
        self.close_window_if_complete();
        Ok(())
    }

    /// Attach a freshly armed timer.
    pub fn arm_timer(&mut self, trigger: TimerTrigger) {
        self.timeout = Some(trigger.duration_ms());
        self.timer = Some(trigger);
    }

    /// Detach the timer, e.g. when it fires or is canceled.
    pub fn take_timer(&mut self) -> Option<TimerTrigger> {
        self.timer.take()
    }

    pub fn set_output(&mut self, output: Option<Value>) {
        if output.is_some() {
            self.output = output;
        }
    }

    pub fn mark_inbound(&mut self, flow: &str, mark: FlowMark) {
        self.inbound_marks.insert(flow.to_string(), mark);
    }

    pub fn inbound_mark(&self, flow: &str) -> Option<FlowMark> {
        self.inbound_marks.get(flow).copied()
    }

    pub fn has_marks(&self) -> bool {
        !self.inbound_marks.is_empty()
    }

    pub fn clear_marks(&mut self) {
        self.inbound_marks.clear();
    }

    /// Every inbound flow has delivered a take or a discard in this window.
    pub fn window_complete(&self) -> bool {
        self.inbound
            .iter()
            .all(|f| self.inbound_marks.contains_key(f))
    }

    /// The current window already produced a run. Taken marks are only ever
    /// recorded by entering or while the run is in progress.
    pub fn window_spent(&self) -> bool {
        self.inbound_marks.values().any(|m| *m == FlowMark::Taken)
    }

    /// Reset the window once no inbound flow can still deliver into it.
    /// Active instances keep theirs until they leave.
    pub fn close_window_if_complete(&mut self) {
        if !self.state.is_active() && self.window_complete() {
            self.inbound_marks.clear();
        }
    }

    /// Inbound flows marked with `mark`, in inbound order.
    pub fn marked_inbound(&self, mark: FlowMark) -> Vec<FlowId> {
        self.inbound
            .iter()
            .filter(|f| self.inbound_marks.get(*f) == Some(&mark))
            .cloned()
            .collect()
    }

    /// True when every inbound flow has been discarded in this window.
    pub fn all_inbound_discarded(&self) -> bool {
        !self.inbound.is_empty()
            && self
                .inbound
                .iter()
                .all(|f| self.inbound_marks.get(f) == Some(&FlowMark::Discarded))
    }

    /// Record that `kind` fired for this run. Returns `false` if it already
    /// had, in which case the caller must not emit it again.
    pub fn emit(&mut self, kind: NotificationKind) -> bool {
        self.emitted.insert(kind)
    }

    /// Snapshot-shaped view of the instance as of `now_ms`.
    pub fn snapshot(&self, now_ms: u64) -> InstanceSnapshot {
        let boundary = self.kind.is_boundary();
        let remaining = if self.entered {
            self.timer
                .as_ref()
                .map(|t| t.remaining_ms(now_ms))
                .or(self.timeout)
        } else {
            None
        };

        InstanceSnapshot {
            id: self.id.clone(),
            node_type: self.kind,
            entered: self.entered,
            state: self.state,
            attached_to_id: self.attached_to.clone(),
            cancel_activity: boundary.then_some(self.cancel_activity),
            timeout: remaining,
            duration: remaining,
            output: if self.entered { self.output.clone() } else { None },
            taken_inbound: self.marked_inbound(FlowMark::Taken),
            discarded_inbound: self.marked_inbound(FlowMark::Discarded),
        }
    }

    /// Put an instance back into a snapshotted rest state.
    ///
    /// Only entered entries are restored here; everything else stays Armed.
    /// The caller has already checked the entry against the graph.
    pub(crate) fn restore_entered(&mut self, entry: &InstanceSnapshot) {
        self.state = entry.state;
        self.entered = true;
        self.output = entry.output.clone();
        self.restore_marks(entry);
        self.emitted.clear();
        // `start` (and `wait`) already fired before the suspend.
        self.emitted.insert(NotificationKind::Start);
        if entry.state == ActivityState::Waiting {
            self.emitted.insert(NotificationKind::Wait);
        }
    }

    /// Reload the inbound window recorded in `entry`.
    pub(crate) fn restore_marks(&mut self, entry: &InstanceSnapshot) {
        self.inbound_marks.clear();
        for flow in &entry.taken_inbound {
            self.inbound_marks.insert(flow.clone(), FlowMark::Taken);
        }
        for flow in &entry.discarded_inbound {
            self.inbound_marks.insert(flow.clone(), FlowMark::Discarded);
        }
    }
}
