//! Deterministic driver around `CoreRuntime`.
//!
//! Time is a `ManualClock`; `ScheduleTimer` / `CancelTimer` commands are
//! kept in a small timer wheel, and `advance` fires whatever falls due in
//! deadline order. Everything the core reports is recorded for assertions.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use procflow::activity::{ActivityState, Notification, NotificationKind};
use procflow::config::ProcessDefinition;
use procflow::engine::{CoreCommand, CoreRuntime, CoreStep, RuntimeEvent};
use procflow::errors::{FlowError, Result};
use procflow::graph::{FlowMessage, FlowSignal};
use procflow::snapshot::Snapshot;
use procflow::timer::{Clock, ManualClock, TimerId};
use serde_json::Value;

/// A notification together with the clock reading it was observed at.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub at_ms: u64,
    pub notification: Notification,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTimer {
    pub node: String,
    pub deadline: u64,
}

pub struct ProcessHarness {
    core: CoreRuntime,
    clock: ManualClock,
    pending: BTreeMap<TimerId, PendingTimer>,
    scheduled: Vec<(TimerId, String, u64)>,
    canceled: Vec<TimerId>,
    notifications: Vec<Recorded>,
    flows: Vec<FlowMessage>,
    errors: Vec<FlowError>,
    snapshot: Option<Snapshot>,
    completed: bool,
}

impl ProcessHarness {
    pub fn new(def: &ProcessDefinition) -> Self {
        let clock = ManualClock::new();
        let core = CoreRuntime::new(def, Arc::new(clock.clone()));
        Self::with_core(core, clock)
    }

    /// Resume `snapshot` with the clock starting at `at_ms`.
    pub fn resume(def: &ProcessDefinition, snapshot: &Snapshot, at_ms: u64) -> Result<Self> {
        let clock = ManualClock::starting_at(at_ms);
        let mut core = CoreRuntime::resume(def, snapshot, Arc::new(clock.clone()))?;
        let deferred = core.take_deferred();
        let mut harness = Self::with_core(core, clock);
        harness.record(deferred);
        Ok(harness)
    }

    fn with_core(core: CoreRuntime, clock: ManualClock) -> Self {
        Self {
            core,
            clock,
            pending: BTreeMap::new(),
            scheduled: Vec::new(),
            canceled: Vec::new(),
            notifications: Vec::new(),
            flows: Vec::new(),
            errors: Vec::new(),
            snapshot: None,
            completed: false,
        }
    }

    fn record(&mut self, step: CoreStep) {
        let now = self.clock.now_ms();
        for command in step.commands {
            match command {
                CoreCommand::ScheduleTimer { timer, node, delay } => {
                    let deadline = now + delay.as_millis() as u64;
                    self.scheduled.push((timer, node.clone(), deadline));
                    self.pending.insert(timer, PendingTimer { node, deadline });
                }
                CoreCommand::CancelTimer { timer } => {
                    self.pending.remove(&timer);
                    self.canceled.push(timer);
                }
                CoreCommand::RequestExit => {}
            }
        }
        self.notifications
            .extend(step.notifications.into_iter().map(|notification| Recorded {
                at_ms: now,
                notification,
            }));
        self.flows.extend(step.flows);
        self.errors.extend(step.errors);
        if step.snapshot.is_some() {
            self.snapshot = step.snapshot;
        }
        self.completed |= step.completed;
    }

    pub fn send(&mut self, event: RuntimeEvent) -> Result<()> {
        let step = self.core.step(event)?;
        self.record(step);
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.send(RuntimeEvent::Start)
    }

    pub fn signal(&mut self, node: &str) -> Result<()> {
        self.send(RuntimeEvent::Signal {
            node: node.to_string(),
            payload: None,
        })
    }

    pub fn signal_with(&mut self, node: &str, payload: Value) -> Result<()> {
        self.send(RuntimeEvent::Signal {
            node: node.to_string(),
            payload: Some(payload),
        })
    }

    pub fn cancel(&mut self, node: &str) -> Result<()> {
        self.send(RuntimeEvent::Cancel {
            node: node.to_string(),
        })
    }

    pub fn discard(&mut self, node: &str) -> Result<()> {
        self.send(RuntimeEvent::Discard {
            node: node.to_string(),
        })
    }

    /// Suspend the process and return the snapshot.
    pub fn stop(&mut self) -> Result<Snapshot> {
        self.send(RuntimeEvent::Stop)?;
        self.snapshot
            .clone()
            .ok_or_else(|| FlowError::StateMismatch("stop produced no snapshot".into()))
    }

    /// Deliver an elapse for `timer` right now, due or not.
    pub fn fire(&mut self, timer: TimerId) -> Result<()> {
        self.pending.remove(&timer);
        self.send(RuntimeEvent::TimerElapsed { timer })
    }

    /// Move the clock forward by `ms`, firing due timers in deadline order.
    pub fn advance(&mut self, ms: u64) -> Result<()> {
        let target = self.clock.now_ms() + ms;
        loop {
            let next = self
                .pending
                .iter()
                .filter(|(_, p)| p.deadline <= target)
                .min_by_key(|(id, p)| (p.deadline, **id))
                .map(|(id, p)| (*id, p.deadline));
            let Some((timer, deadline)) = next else { break };
            self.clock.set(deadline.max(self.clock.now_ms()));
            self.pending.remove(&timer);
            self.send(RuntimeEvent::TimerElapsed { timer })?;
        }
        self.clock.set(target);
        Ok(())
    }

    pub fn core(&self) -> &CoreRuntime {
        &self.core
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn state(&self, id: &str) -> Option<ActivityState> {
        self.core.state_of(id)
    }

    pub fn outcome(&self, id: &str) -> Option<ActivityState> {
        self.core.outcome_of(id)
    }

    pub fn pending_timers(&self) -> &BTreeMap<TimerId, PendingTimer> {
        &self.pending
    }

    pub fn pending_for(&self, node: &str) -> Option<(TimerId, u64)> {
        self.pending
            .iter()
            .find(|(_, p)| p.node == node)
            .map(|(id, p)| (*id, p.deadline))
    }

    /// Every `ScheduleTimer` seen so far: (timer, node, deadline).
    pub fn scheduled(&self) -> &[(TimerId, String, u64)] {
        &self.scheduled
    }

    pub fn canceled(&self) -> &[TimerId] {
        &self.canceled
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter().map(|r| &r.notification)
    }

    /// Notification kinds observed for `id`, in order.
    pub fn kinds_for(&self, id: &str) -> Vec<NotificationKind> {
        self.notifications()
            .filter(|n| n.id == id)
            .map(|n| n.kind)
            .collect()
    }

    pub fn count(&self, id: &str, kind: NotificationKind) -> usize {
        self.notifications()
            .filter(|n| n.id == id && n.kind == kind)
            .count()
    }

    /// Clock reading at the first `kind` notification for `id`.
    pub fn time_of(&self, id: &str, kind: NotificationKind) -> Option<u64> {
        self.notifications
            .iter()
            .find(|r| r.notification.id == id && r.notification.kind == kind)
            .map(|r| r.at_ms)
    }

    pub fn flows(&self) -> &[FlowMessage] {
        &self.flows
    }

    /// Signals delivered over `flow`, in order.
    pub fn signals_on(&self, flow: &str) -> Vec<FlowSignal> {
        self.flows
            .iter()
            .filter(|m| m.flow == flow)
            .map(|m| m.signal)
            .collect()
    }

    pub fn errors(&self) -> &[FlowError] {
        &self.errors
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Forget recorded notifications, flows and errors.
    pub fn clear_records(&mut self) {
        self.notifications.clear();
        self.flows.clear();
        self.errors.clear();
    }
}
