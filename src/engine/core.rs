// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//! - the notifications and flow messages the event caused
//!
//! The async shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - scheduling and canceling timers
//! - handling Ctrl+C / shutdown
//!
//! The core is intended to be extensively unit tested without any Tokio or
//! channels: time comes from an injected [`Clock`].

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::activity::{ActivityInstance, ActivityState, Behaviour};
use crate::config::model::ProcessDefinition;
use crate::engine::attachment::Attachment;
use crate::engine::event_handlers::{
    handle_cancel, handle_discard, handle_signal, handle_start, handle_timer_elapsed, CoreCommand,
    CoreStep,
};
use crate::engine::propagation::{Effects, Execution};
use crate::engine::{RuntimeEvent, RuntimeOptions};
use crate::errors::{FlowError, Result};
use crate::graph::ProcessGraph;
use crate::snapshot::Snapshot;
use crate::timer::{Clock, TimerRegistry};
use crate::types::NodeId;
use crate::variables::Variables;

/// Pure core runtime state.
///
/// This owns:
/// - the process graph and one instance per node
/// - the host/boundary attachment records
/// - the registry of live timers
/// - the (read-only) process variables
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    graph: ProcessGraph,
    attachments: BTreeMap<NodeId, Attachment>,
    instances: BTreeMap<NodeId, ActivityInstance>,
    timers: TimerRegistry,
    variables: Variables,
    clock: Arc<dyn Clock>,
    options: RuntimeOptions,
    started: bool,
    stopped: bool,
    completed: bool,
    /// Effects produced outside `step` (resume), handed out by `take_deferred`.
    deferred: Effects,
}

impl CoreRuntime {
    pub fn new(def: &ProcessDefinition, clock: Arc<dyn Clock>) -> Self {
        let graph = ProcessGraph::from_definition(def);

        let attachments = graph
            .attachments()
            .map(|(host, boundaries)| {
                (host.clone(), Attachment::new(host.clone(), boundaries.clone()))
            })
            .collect();

        let instances = graph
            .nodes()
            .map(|node| (node.id.clone(), ActivityInstance::from_def(node)))
            .collect();

        Self {
            graph,
            attachments,
            instances,
            timers: TimerRegistry::new(),
            variables: Variables::new(def.variables.clone()),
            clock,
            options: RuntimeOptions::from(def.runtime),
            started: false,
            stopped: false,
            completed: false,
            deferred: Effects::default(),
        }
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    /// Rebuild a runtime from a snapshot taken on the same process graph.
    ///
    /// Entered instances come back in their rest state with their timers
    /// re-armed for the remaining duration; everything else comes back
    /// Armed. Any incompatibility fails with `StateMismatch` before anything
    /// is built. The `ScheduleTimer` commands for the re-armed timers are
    /// returned by [`take_deferred`](Self::take_deferred).
    pub fn resume(def: &ProcessDefinition, snapshot: &Snapshot, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut core = Self::new(def, clock);
        core.check_snapshot(snapshot)?;

        core.variables = core.variables.clone().merged_with(&snapshot.variables);
        let now = core.clock.now_ms();

        let effects = {
            let mut exec = Execution::new(
                &core.graph,
                &core.attachments,
                &mut core.instances,
                &mut core.timers,
                &core.variables,
                now,
            );
            exec.activate_all()?;

            for entry in &snapshot.children {
                if entry.entered {
                    exec.restore(entry)?;
                } else {
                    exec.restore_marks(entry)?;
                }
            }
            exec.drain()?;
            exec.into_effects()
        };

        core.deferred = effects;
        core.started = true;
        info!(
            process = %core.graph.id(),
            timers = core.timers.live_ids().len(),
            "process resumed from snapshot"
        );
        Ok(core)
    }

    fn check_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let mismatch = |msg: String| Err(FlowError::StateMismatch(msg));

        if snapshot.process_id != self.graph.id() {
            return mismatch(format!(
                "snapshot is for process '{}', graph is '{}'",
                snapshot.process_id,
                self.graph.id()
            ));
        }

        let mut seen = HashSet::new();
        for entry in &snapshot.children {
            if !seen.insert(entry.id.as_str()) {
                return mismatch(format!("node '{}' appears twice in snapshot", entry.id));
            }

            let Some(node) = self.graph.node(&entry.id) else {
                return mismatch(format!("snapshot names unknown node '{}'", entry.id));
            };

            if node.kind != entry.node_type {
                return mismatch(format!(
                    "node '{}' is a {} in the graph but a {} in the snapshot",
                    entry.id, node.kind, entry.node_type
                ));
            }

            if let Some(host) = entry.attached_to_id.as_deref() {
                if node.attached_to.as_deref() != Some(host) {
                    return mismatch(format!(
                        "node '{}' is not attached to '{}' in the graph",
                        entry.id, host
                    ));
                }
            }

            if let Some(flow) = entry
                .taken_inbound
                .iter()
                .chain(&entry.discarded_inbound)
                .find(|f| !node.inbound.contains(*f))
            {
                return mismatch(format!(
                    "flow '{}' is not an inbound flow of node '{}'",
                    flow, entry.id
                ));
            }

            let behaviour = Behaviour::for_node(node.kind);
            if entry.entered {
                if !behaviour.rests_in(entry.state) {
                    return mismatch(format!(
                        "entered node '{}' cannot rest in state {}",
                        entry.id, entry.state
                    ));
                }
            } else if entry.state.is_active() {
                return mismatch(format!(
                    "node '{}' is {} but not entered",
                    entry.id, entry.state
                ));
            }
        }

        for entry in snapshot.children.iter().filter(|c| c.entered) {
            let Some(host) = self.graph.node(&entry.id).and_then(|n| n.attached_to.as_deref())
            else {
                continue;
            };
            let host_entered = snapshot.child(host).is_some_and(|h| h.entered);
            if !host_entered {
                return mismatch(format!(
                    "boundary '{}' is entered but its host '{}' is not",
                    entry.id, host
                ));
            }
        }

        Ok(())
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    ///
    /// An `Err` means the event was rejected and the core is unchanged.
    pub fn step(&mut self, event: RuntimeEvent) -> Result<CoreStep> {
        if self.stopped {
            return Err(FlowError::StateMismatch(format!(
                "process '{}' is stopped",
                self.graph.id()
            )));
        }

        let starting = match &event {
            RuntimeEvent::Stop | RuntimeEvent::ShutdownRequested => return Ok(self.suspend()),
            RuntimeEvent::Start if self.started => {
                return Err(FlowError::StateMismatch(format!(
                    "process '{}' already started",
                    self.graph.id()
                )));
            }
            RuntimeEvent::Start => true,
            _ => false,
        };

        let now = self.clock.now_ms();
        let effects = {
            let mut exec = Execution::new(
                &self.graph,
                &self.attachments,
                &mut self.instances,
                &mut self.timers,
                &self.variables,
                now,
            );
            match event {
                RuntimeEvent::Start => handle_start(&mut exec)?,
                RuntimeEvent::Signal { node, payload } => handle_signal(&mut exec, &node, payload)?,
                RuntimeEvent::Cancel { node } => handle_cancel(&mut exec, &node)?,
                RuntimeEvent::Discard { node } => handle_discard(&mut exec, &node)?,
                RuntimeEvent::TimerElapsed { timer } => handle_timer_elapsed(&mut exec, timer)?,
                RuntimeEvent::Stop | RuntimeEvent::ShutdownRequested => {}
            }
            exec.into_effects()
        };

        if starting {
            self.started = true;
        }
        Ok(self.finish_step(effects))
    }

    /// Hand out what `resume` produced (timer schedules, arm failures).
    pub fn take_deferred(&mut self) -> CoreStep {
        let effects = std::mem::take(&mut self.deferred);
        self.finish_step(effects)
    }

    fn finish_step(&mut self, effects: Effects) -> CoreStep {
        let mut step = CoreStep::from_effects(effects);

        if self.started && !self.completed && !self.has_active_instances() {
            self.completed = true;
            step.completed = true;
            info!(process = %self.graph.id(), "process completed");
            if self.options.exit_when_complete {
                step.commands.push(CoreCommand::RequestExit);
                step.keep_running = false;
            }
        }

        step
    }

    /// Capture the snapshot, cancel every live timer and stop accepting events.
    fn suspend(&mut self) -> CoreStep {
        let snapshot = self.snapshot();
        let mut step = CoreStep::idle();
        for timer in self.timers.live_ids() {
            debug!(%timer, "canceling timer for suspend");
            step.commands.push(CoreCommand::CancelTimer { timer });
        }
        step.commands.push(CoreCommand::RequestExit);
        step.snapshot = Some(snapshot);
        step.keep_running = false;
        self.stopped = true;
        info!(process = %self.graph.id(), "process suspended");
        step
    }

    /// Snapshot of every instance as of now.
    pub fn snapshot(&self) -> Snapshot {
        let now = self.clock.now_ms();
        Snapshot {
            process_id: self.graph.id().to_string(),
            variables: self.variables.as_map().clone(),
            children: self.instances.values().map(|i| i.snapshot(now)).collect(),
        }
    }

    fn has_active_instances(&self) -> bool {
        self.instances.values().any(|i| i.state().is_active())
    }

    pub fn graph(&self) -> &ProcessGraph {
        &self.graph
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn instance(&self, id: &str) -> Option<&ActivityInstance> {
        self.instances.get(id)
    }

    pub fn state_of(&self, id: &str) -> Option<ActivityState> {
        self.instances.get(id).map(|i| i.state())
    }

    /// How the most recent run of `id` ended, if it has.
    pub fn outcome_of(&self, id: &str) -> Option<ActivityState> {
        self.instances.get(id).and_then(|i| i.outcome())
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::NotificationKind;
    use crate::config::loader::parse_raw;
    use crate::timer::ManualClock;

    const APPROVAL: &str = r#"
[process]
id = "approval"

[node.start]
type = "startEvent"

[node.approve]
type = "userTask"

[node.expire]
type = "boundaryEvent"
attached_to = "approve"
timer = { duration = "PT0.1S" }

[node.done]
type = "endEvent"

[node.expired]
type = "endEvent"

[flow.f1]
source = "start"
target = "approve"

[flow.f2]
source = "approve"
target = "done"

[flow.f3]
source = "expire"
target = "expired"
"#;

    fn core() -> (CoreRuntime, ManualClock) {
        let def = ProcessDefinition::try_from(parse_raw(APPROVAL).unwrap()).unwrap();
        let clock = ManualClock::new();
        (CoreRuntime::new(&def, Arc::new(clock.clone())), clock)
    }

    fn scheduled(step: &CoreStep) -> Vec<crate::timer::TimerId> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::ScheduleTimer { timer, .. } => Some(*timer),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn start_runs_host_and_arms_boundary() {
        let (mut core, _clock) = core();
        let step = core.step(RuntimeEvent::Start).unwrap();

        assert_eq!(core.state_of("approve"), Some(ActivityState::Waiting));
        assert_eq!(core.state_of("expire"), Some(ActivityState::Running));
        assert_eq!(scheduled(&step).len(), 1);
        assert!(step.keep_running);
        assert!(!step.completed);
    }

    #[test]
    fn second_start_is_rejected() {
        let (mut core, _clock) = core();
        core.step(RuntimeEvent::Start).unwrap();
        let err = core.step(RuntimeEvent::Start).unwrap_err();
        assert!(matches!(err, FlowError::StateMismatch(_)));
    }

    #[test]
    fn rejected_signal_leaves_core_unchanged() {
        let (mut core, _clock) = core();
        core.step(RuntimeEvent::Start).unwrap();
        let before = core.snapshot();

        let err = core
            .step(RuntimeEvent::Signal {
                node: "done".into(),
                payload: None,
            })
            .unwrap_err();
        assert!(matches!(err, FlowError::InvalidTransition { op: "signal", .. }));
        assert_eq!(core.snapshot(), before);
    }

    #[test]
    fn timer_elapse_interrupts_host_and_completes_process() {
        let (mut core, clock) = core();
        let step = core.step(RuntimeEvent::Start).unwrap();
        let timer = scheduled(&step)[0];

        clock.advance(100);
        let step = core.step(RuntimeEvent::TimerElapsed { timer }).unwrap();

        assert_eq!(core.outcome_of("approve"), Some(ActivityState::Canceled));
        assert_eq!(core.outcome_of("expire"), Some(ActivityState::Ended));
        assert_eq!(core.outcome_of("expired"), Some(ActivityState::Ended));
        assert_eq!(core.outcome_of("done"), Some(ActivityState::Discarded));
        assert!(step.completed);
        assert!(!step.keep_running);
        assert!(step.commands.contains(&CoreCommand::RequestExit));
        assert!(
            !step
                .notifications
                .iter()
                .any(|n| n.id == "approve" && n.kind == NotificationKind::End)
        );
    }

    #[test]
    fn stop_reports_remaining_and_rejects_later_events() {
        let (mut core, clock) = core();
        let step = core.step(RuntimeEvent::Start).unwrap();
        let timer = scheduled(&step)[0];

        clock.advance(40);
        let step = core.step(RuntimeEvent::Stop).unwrap();
        let snapshot = step.snapshot.expect("stop yields a snapshot");
        let expire = snapshot.child("expire").unwrap();
        assert_eq!(expire.timeout, Some(60));
        assert_eq!(expire.duration, Some(60));
        assert!(step.commands.contains(&CoreCommand::CancelTimer { timer }));
        assert!(!step.keep_running);

        assert!(core.step(RuntimeEvent::TimerElapsed { timer }).is_err());
    }
}
