// src/timer/trigger.rs

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::types::NodeId;

/// Identity of one armed timer. A fresh id is allocated every time a timer
/// is armed, so a late elapse for a canceled timer can never be mistaken for
/// the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(pub u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

/// A scheduled, cancellable deferred action owned by one activity instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerTrigger {
    id: TimerId,
    duration_ms: u64,
    deadline: u64,
}

impl TimerTrigger {
    pub fn arm(id: TimerId, duration_ms: u64, now_ms: u64) -> Self {
        Self {
            id,
            duration_ms,
            deadline: now_ms.saturating_add(duration_ms),
        }
    }

    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn deadline(&self) -> u64 {
        self.deadline
    }

    /// Milliseconds left until the deadline, as seen at `now_ms`.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.deadline.saturating_sub(now_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Live timers and the instance each one belongs to.
#[derive(Debug, Default)]
pub struct TimerRegistry {
    next: u64,
    live: HashMap<TimerId, NodeId>,
}

impl TimerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, owner: &str) -> TimerId {
        self.next += 1;
        let id = TimerId(self.next);
        self.live.insert(id, owner.to_string());
        id
    }

    /// Forget a timer; returns its owner if it was live.
    pub fn release(&mut self, id: TimerId) -> Option<NodeId> {
        self.live.remove(&id)
    }

    pub fn owner_of(&self, id: TimerId) -> Option<&str> {
        self.live.get(&id).map(|s| s.as_str())
    }

    pub fn live_ids(&self) -> Vec<TimerId> {
        let mut ids: Vec<TimerId> = self.live.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_counts_down_and_saturates() {
        let t = TimerTrigger::arm(TimerId(1), 100, 1_000);
        assert_eq!(t.deadline(), 1_100);
        assert_eq!(t.remaining_ms(1_040), 60);
        assert_eq!(t.remaining_ms(5_000), 0);
    }

    #[test]
    fn registry_hands_out_fresh_ids() {
        let mut reg = TimerRegistry::new();
        let a = reg.allocate("boundary");
        let b = reg.allocate("boundary");
        assert_ne!(a, b);
        assert_eq!(reg.release(a).as_deref(), Some("boundary"));
        assert_eq!(reg.release(a), None);
        assert_eq!(reg.owner_of(b), Some("boundary"));
        assert!(!reg.is_empty());
        reg.release(b);
        assert!(reg.is_empty());
    }
}
