// src/engine/propagation.rs

//! Per-event execution context and take/discard propagation.
//!
//! `Execution` borrows the core's state for the duration of one event. All
//! lifecycle driving happens through it: instances are entered, run,
//! completed, canceled and discarded here, and every resulting flow message
//! goes onto a FIFO queue that is drained before the event returns. Nothing
//! recurses along the graph.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityInstance, Behaviour, Notification, NotificationKind};
use crate::engine::attachment::Attachment;
use crate::engine::event_handlers::CoreCommand;
use crate::errors::{FlowError, Result};
use crate::graph::{FlowMessage, FlowSignal, ProcessGraph};
use crate::snapshot::InstanceSnapshot;
use crate::timer::{resolve_duration, TimerId, TimerRegistry, TimerTrigger};
use crate::types::{FlowId, FlowMark, NodeId};
use crate::variables::Variables;

/// What happens to a canceled instance's outbound flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundPolicy {
    /// Neither taken nor discarded (explicit cancel).
    Silent,
    /// Discarded (host interrupted by a boundary).
    Discard,
}

/// Everything an event produced, collected for the `CoreStep`.
#[derive(Debug, Default)]
pub struct Effects {
    pub commands: Vec<CoreCommand>,
    pub notifications: Vec<Notification>,
    pub flows: Vec<FlowMessage>,
    pub errors: Vec<FlowError>,
}

pub struct Execution<'a> {
    graph: &'a ProcessGraph,
    attachments: &'a BTreeMap<NodeId, Attachment>,
    instances: &'a mut BTreeMap<NodeId, ActivityInstance>,
    timers: &'a mut TimerRegistry,
    variables: &'a Variables,
    now_ms: u64,
    queue: VecDeque<FlowMessage>,
    /// Flows already discarded while handling this event.
    discarded_flows: HashSet<FlowId>,
    effects: Effects,
}

impl<'a> Execution<'a> {
    pub fn new(
        graph: &'a ProcessGraph,
        attachments: &'a BTreeMap<NodeId, Attachment>,
        instances: &'a mut BTreeMap<NodeId, ActivityInstance>,
        timers: &'a mut TimerRegistry,
        variables: &'a Variables,
        now_ms: u64,
    ) -> Self {
        Self {
            graph,
            attachments,
            instances,
            timers,
            variables,
            now_ms,
            queue: VecDeque::new(),
            discarded_flows: HashSet::new(),
            effects: Effects::default(),
        }
    }

    pub fn graph(&self) -> &'a ProcessGraph {
        self.graph
    }

    pub fn into_effects(self) -> Effects {
        self.effects
    }

    pub fn instance(&self, id: &str) -> Result<&ActivityInstance> {
        self.instances
            .get(id)
            .ok_or_else(|| FlowError::UnknownNode(id.to_string()))
    }

    pub fn instance_mut(&mut self, id: &str) -> Result<&mut ActivityInstance> {
        self.instances
            .get_mut(id)
            .ok_or_else(|| FlowError::UnknownNode(id.to_string()))
    }

    /// Attachment record where `host` is the host.
    pub fn attachment_of_host(&self, host: &str) -> Option<&'a Attachment> {
        self.attachments.get(host)
    }

    /// Attachment record a boundary belongs to.
    pub fn attachment_of_boundary(&self, boundary: &str) -> Option<&'a Attachment> {
        let host = self.instances.get(boundary)?.attached_to()?;
        self.attachments.get(host)
    }

    pub fn activate_all(&mut self) -> Result<()> {
        for inst in self.instances.values_mut() {
            inst.activate()?;
        }
        Ok(())
    }

    // --- notifications -------------------------------------------------

    fn notify(&mut self, id: &str, kind: NotificationKind) -> Result<()> {
        self.push_notification(id, kind, None)
    }

    fn notify_error(&mut self, id: &str, err: &FlowError) -> Result<()> {
        self.push_notification(id, NotificationKind::Error, Some(err.to_string()))
    }

    fn push_notification(
        &mut self,
        id: &str,
        kind: NotificationKind,
        error: Option<String>,
    ) -> Result<()> {
        let now = self.now_ms;
        let inst = self.instance_mut(id)?;
        if !inst.emit(kind) {
            trace!(node = %id, ?kind, "notification already emitted for this run");
            return Ok(());
        }
        let notification = Notification {
            kind,
            id: inst.id().to_string(),
            node_type: inst.kind(),
            state: inst.snapshot(now),
            error,
        };
        debug!(node = %id, ?kind, "notification");
        self.effects.notifications.push(notification);
        Ok(())
    }

    // --- flow queue ----------------------------------------------------

    fn take_outbound(&mut self, id: &str) -> Result<()> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| FlowError::UnknownNode(id.to_string()))?;
        for flow in &node.outbound {
            if let Some(f) = graph.flow(flow) {
                trace!(node = %id, flow = %flow, "take");
                self.queue.push_back(f.take());
            }
        }
        Ok(())
    }

    fn discard_outbound(&mut self, id: &str) -> Result<()> {
        let graph = self.graph;
        let node = graph
            .node(id)
            .ok_or_else(|| FlowError::UnknownNode(id.to_string()))?;
        for flow in &node.outbound {
            if !self.discarded_flows.insert(flow.clone()) {
                debug!(node = %id, flow = %flow, "flow already discarded in this step");
                continue;
            }
            if let Some(f) = graph.flow(flow) {
                trace!(node = %id, flow = %flow, "discard");
                self.queue.push_back(f.discard());
            }
        }
        Ok(())
    }

    /// Deliver queued flow messages until the queue is empty.
    pub fn drain(&mut self) -> Result<()> {
        while let Some(message) = self.queue.pop_front() {
            let graph = self.graph;
            let Some(flow) = graph.flow(&message.flow) else {
                warn!(flow = %message.flow, "message for unknown flow dropped");
                continue;
            };
            self.effects.flows.push(message.clone());
            match message.signal {
                FlowSignal::Take => self.on_take(&flow.target_ref, &flow.id)?,
                FlowSignal::Discard => self.on_discard(&flow.target_ref, &flow.id)?,
            }
        }
        Ok(())
    }

    fn on_take(&mut self, target: &str, flow: &str) -> Result<()> {
        let state = self.instance(target)?.state();
        if state.is_active() {
            self.instance_mut(target)?.mark_inbound(flow, FlowMark::Taken);
            info!(node = %target, flow = %flow, %state, "already entered; ignoring take");
            return Ok(());
        }
        if !state.can_enter() {
            warn!(node = %target, flow = %flow, %state, "take on inactive instance ignored");
            return Ok(());
        }
        if self.is_late_sibling(target, flow)? {
            let inst = self.instance_mut(target)?;
            inst.mark_inbound(flow, FlowMark::Taken);
            inst.close_window_if_complete();
            info!(node = %target, flow = %flow, "late sibling take ignored; node already ran");
            return Ok(());
        }
        self.enter_and_run(target, Some(flow))
    }

    fn on_discard(&mut self, target: &str, flow: &str) -> Result<()> {
        let state = self.instance(target)?.state();
        if state.is_active() {
            let inst = self.instance_mut(target)?;
            if inst.inbound_mark(flow).is_none() {
                inst.mark_inbound(flow, FlowMark::Discarded);
            }
            debug!(node = %target, flow = %flow, %state, "discard on entered instance recorded");
            return Ok(());
        }
        if !state.can_enter() {
            warn!(node = %target, flow = %flow, %state, "discard on inactive instance ignored");
            return Ok(());
        }
        if self.is_late_sibling(target, flow)? {
            let inst = self.instance_mut(target)?;
            inst.mark_inbound(flow, FlowMark::Discarded);
            inst.close_window_if_complete();
            debug!(node = %target, flow = %flow, "late sibling discard absorbed");
            return Ok(());
        }

        let inst = self.instance_mut(target)?;
        if inst.inbound_mark(flow).is_some() || inst.window_spent() {
            // Same inbound flow again, or a loop-back: a new window starts.
            inst.clear_marks();
        }
        inst.mark_inbound(flow, FlowMark::Discarded);

        if inst.all_inbound_discarded() {
            debug!(node = %target, "every inbound flow discarded");
            self.discard_node(target)
        } else {
            debug!(node = %target, flow = %flow, "inbound discarded; other paths still open");
            Ok(())
        }
    }

    /// A flow with no mark yet, arriving at an instance whose current
    /// window already ran. Loop flows never count: they start a new window.
    fn is_late_sibling(&self, target: &str, flow: &str) -> Result<bool> {
        let inst = self.instance(target)?;
        Ok(inst.inbound_mark(flow).is_none()
            && inst.window_spent()
            && !self.graph.is_loop_flow(flow))
    }

    // --- lifecycle -----------------------------------------------------

    /// Consume a token (from `flow`, or from the process start / host
    /// attachment when `None`) and run the instance.
    pub fn enter_and_run(&mut self, id: &str, flow: Option<&str>) -> Result<()> {
        let inst = self.instance_mut(id)?;
        if let Some(flow) = flow {
            if inst.inbound_mark(flow).is_some() || inst.window_spent() {
                inst.clear_marks();
            }
        }
        inst.enter()?;
        if let Some(flow) = flow {
            inst.mark_inbound(flow, FlowMark::Taken);
        }
        debug!(node = %id, flow = flow.unwrap_or("-"), "entered");
        self.run_node(id)
    }

    fn run_node(&mut self, id: &str) -> Result<()> {
        self.notify(id, NotificationKind::Start)?;
        let inst = self.instance_mut(id)?;
        inst.run()?;
        let behaviour = inst.behaviour();

        if let Some(attachment) = self.attachment_of_host(id) {
            attachment.on_host_running(self)?;
        }

        match behaviour {
            Behaviour::Immediate => self.complete_node(id),
            Behaviour::AwaitSignal => {
                self.instance_mut(id)?.wait()?;
                debug!(node = %id, "waiting for signal");
                self.notify(id, NotificationKind::Wait)
            }
            Behaviour::Timer => self.arm_timer(id),
        }
    }

    /// Resolve the instance's timer definition and schedule it.
    pub fn arm_timer(&mut self, id: &str) -> Result<()> {
        let variables = self.variables;
        let Some(definition) = self.instance(id)?.timer_definition().cloned() else {
            debug!(node = %id, "no timer definition; running until signaled");
            return Ok(());
        };

        match resolve_duration(&definition.duration, variables) {
            Ok(ms) => {
                self.schedule_timer(id, ms)?;
                Ok(())
            }
            Err(err) => {
                warn!(node = %id, duration = %definition.duration, error = %err, "failed to arm timer");
                self.notify_error(id, &err)?;
                self.effects.errors.push(err);
                self.discard_owner(id)
            }
        }
    }

    /// Arm a timer of `ms` for `id` and ask the shell to schedule it.
    pub fn schedule_timer(&mut self, id: &str, ms: u64) -> Result<TimerId> {
        let timer = self.timers.allocate(id);
        let trigger = TimerTrigger::arm(timer, ms, self.now_ms);
        let delay = trigger.delay();
        self.instance_mut(id)?.arm_timer(trigger);
        debug!(node = %id, %timer, ms, "timer armed");
        self.effects.commands.push(CoreCommand::ScheduleTimer {
            timer,
            node: id.to_string(),
            delay,
        });
        Ok(timer)
    }

    pub fn cancel_timer_of(&mut self, id: &str) -> Result<()> {
        if let Some(trigger) = self.instance_mut(id)?.take_timer() {
            let timer = trigger.id();
            self.timers.release(timer);
            debug!(node = %id, %timer, "timer canceled");
            self.effects.commands.push(CoreCommand::CancelTimer { timer });
        }
        Ok(())
    }

    /// Resolve an elapsed timer to its owner. Returns `None` for stale
    /// timers (canceled, re-armed, or already fired).
    pub fn claim_elapsed(&mut self, timer: TimerId) -> Result<Option<NodeId>> {
        let Some(owner) = self.timers.release(timer) else {
            return Ok(None);
        };
        let inst = self.instance_mut(&owner)?;
        if inst.timer().map(|t| t.id()) != Some(timer) {
            return Ok(None);
        }
        inst.take_timer();
        Ok(Some(owner))
    }

    /// The instance's trigger fired: boundaries go through their
    /// attachment, everything else simply completes.
    pub fn fire_node(&mut self, id: &str) -> Result<()> {
        match self.attachment_of_boundary(id) {
            Some(attachment) => attachment.on_boundary_fired(self, id),
            None => self.complete_node(id),
        }
    }

    pub fn set_output(&mut self, id: &str, output: Option<Value>) -> Result<()> {
        self.instance_mut(id)?.set_output(output);
        Ok(())
    }

    /// Running/Waiting -> Ended, then take outbound and leave.
    pub fn complete_node(&mut self, id: &str) -> Result<()> {
        self.begin_completion(id)?;
        if let Some(attachment) = self.attachment_of_host(id) {
            attachment.on_host_terminated(self)?;
        }
        self.finish_completion(id)
    }

    pub(crate) fn begin_completion(&mut self, id: &str) -> Result<()> {
        self.instance_mut(id)?.complete()?;
        info!(node = %id, "completed");
        self.notify(id, NotificationKind::End)
    }

    pub(crate) fn finish_completion(&mut self, id: &str) -> Result<()> {
        self.take_outbound(id)?;
        self.leave_node(id)
    }

    /// Cancel `id`. Returns `false` when it was already canceled.
    pub fn cancel_node(&mut self, id: &str, policy: OutboundPolicy) -> Result<bool> {
        if !self.instance_mut(id)?.cancel()? {
            return Ok(false);
        }
        info!(node = %id, ?policy, "canceled");
        self.cancel_timer_of(id)?;
        if let Some(attachment) = self.attachment_of_host(id) {
            attachment.on_host_terminated(self)?;
        }
        if policy == OutboundPolicy::Discard {
            self.discard_outbound(id)?;
        }
        self.leave_node(id)?;
        Ok(true)
    }

    pub fn discard_node(&mut self, id: &str) -> Result<()> {
        if !self.instance_mut(id)?.discard()? {
            return Ok(());
        }
        info!(node = %id, "discarded");
        self.cancel_timer_of(id)?;
        self.notify(id, NotificationKind::Discarded)?;
        if let Some(attachment) = self.attachment_of_host(id) {
            attachment.on_host_terminated(self)?;
        }
        self.discard_outbound(id)?;
        self.leave_node(id)
    }

    /// Discard an instance whose own trigger failed.
    fn discard_owner(&mut self, id: &str) -> Result<()> {
        match self.attachment_of_boundary(id) {
            Some(attachment) => attachment.discard_boundary(self, id),
            None => self.discard_node(id),
        }
    }

    fn leave_node(&mut self, id: &str) -> Result<()> {
        self.instance_mut(id)?.leave()?;
        trace!(node = %id, "left");
        self.notify(id, NotificationKind::Leave)
    }

    /// Reload the inbound window of an instance that was not entered.
    pub fn restore_marks(&mut self, entry: &InstanceSnapshot) -> Result<()> {
        self.instance_mut(&entry.id)?.restore_marks(entry);
        Ok(())
    }

    /// Put a snapshotted instance back into its rest state and re-arm its
    /// timer with the remaining duration.
    pub fn restore(&mut self, entry: &InstanceSnapshot) -> Result<()> {
        let inst = self.instance_mut(&entry.id)?;
        inst.restore_entered(entry);
        let behaviour = inst.behaviour();
        let has_definition = inst.timer_definition().is_some();
        debug!(node = %entry.id, state = %entry.state, "restored");

        if behaviour == Behaviour::Timer && has_definition {
            match entry.timeout.or(entry.duration) {
                Some(remaining) => {
                    self.schedule_timer(&entry.id, remaining)?;
                }
                None => self.arm_timer(&entry.id)?,
            }
        }
        Ok(())
    }
}
