// src/activity/state.rs

//! Lifecycle states and the transition table shared by every node type.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one activity instance.
///
/// ```text
/// Idle -> Armed -> Entered -> Running <-> Waiting -> Ended ----\
///                     \          \          \                    > Left
///                      `----------`----------`-> Canceled ------/
///                                             `-> Discarded ---/
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityState {
    Idle,
    Armed,
    Entered,
    Running,
    Waiting,
    Ended,
    Canceled,
    Discarded,
    Left,
}

impl ActivityState {
    /// Entered, Running or Waiting: the instance holds a token.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ActivityState::Entered | ActivityState::Running | ActivityState::Waiting
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ActivityState::Ended | ActivityState::Canceled | ActivityState::Discarded
        )
    }

    /// Whether an inbound take may start a new run from this state.
    pub fn can_enter(self) -> bool {
        matches!(self, ActivityState::Armed | ActivityState::Left)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityState::Idle => "idle",
            ActivityState::Armed => "armed",
            ActivityState::Entered => "entered",
            ActivityState::Running => "running",
            ActivityState::Waiting => "waiting",
            ActivityState::Ended => "ended",
            ActivityState::Canceled => "canceled",
            ActivityState::Discarded => "discarded",
            ActivityState::Left => "left",
        }
    }
}

impl fmt::Display for ActivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations that move an instance between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Activate,
    Enter,
    Run,
    Wait,
    Complete,
    Cancel,
    Discard,
    Leave,
}

impl Transition {
    pub fn name(self) -> &'static str {
        match self {
            Transition::Activate => "activate",
            Transition::Enter => "enter",
            Transition::Run => "run",
            Transition::Wait => "wait",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
            Transition::Discard => "discard",
            Transition::Leave => "leave",
        }
    }

    /// Target state when applied in `from`, or `None` if not allowed.
    pub fn target(self, from: ActivityState) -> Option<ActivityState> {
        use ActivityState::*;

        match (self, from) {
            (Transition::Activate, Idle) => Some(Armed),
            (Transition::Enter, Armed | Left) => Some(Entered),
            (Transition::Run, Entered) => Some(Running),
            (Transition::Wait, Running) => Some(Waiting),
            (Transition::Complete, Running | Waiting) => Some(Ended),
            (Transition::Cancel, Armed | Entered | Running | Waiting) => Some(Canceled),
            (Transition::Discard, Armed | Entered | Running | Waiting | Left) => Some(Discarded),
            (Transition::Leave, Ended | Canceled | Discarded) => Some(Left),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ActivityState; 9] = [
        ActivityState::Idle,
        ActivityState::Armed,
        ActivityState::Entered,
        ActivityState::Running,
        ActivityState::Waiting,
        ActivityState::Ended,
        ActivityState::Canceled,
        ActivityState::Discarded,
        ActivityState::Left,
    ];

    #[test]
    fn terminal_states_only_leave() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            assert_eq!(Transition::Leave.target(from), Some(ActivityState::Left));
            assert_eq!(Transition::Cancel.target(from), None);
            assert_eq!(Transition::Complete.target(from), None);
        }
    }

    #[test]
    fn nothing_leaves_idle_except_activate() {
        let allowed: Vec<_> = [
            Transition::Enter,
            Transition::Run,
            Transition::Cancel,
            Transition::Discard,
            Transition::Leave,
        ]
        .into_iter()
        .filter_map(|t| t.target(ActivityState::Idle))
        .collect();
        assert!(allowed.is_empty());
        assert_eq!(
            Transition::Activate.target(ActivityState::Idle),
            Some(ActivityState::Armed)
        );
    }

    #[test]
    fn left_is_reusable_but_not_cancelable() {
        assert_eq!(
            Transition::Enter.target(ActivityState::Left),
            Some(ActivityState::Entered)
        );
        assert_eq!(Transition::Cancel.target(ActivityState::Left), None);
    }

    #[test]
    fn serialized_names_are_lowercase() {
        let s = serde_json::to_string(&ActivityState::Discarded).unwrap();
        assert_eq!(s, "\"discarded\"");
    }
}
