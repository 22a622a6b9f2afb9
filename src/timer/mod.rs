// src/timer/mod.rs

//! Timer subsystem.
//!
//! - [`duration`] resolves timer definitions (literals or `${...}`
//!   expressions) into milliseconds.
//! - [`trigger`] holds the per-instance timer record and the registry of
//!   live timers.
//! - [`clock`] provides the injectable clock used by the core.
//! - [`backend`] schedules timers on Tokio for the async runtime shell.

pub mod backend;
pub mod clock;
pub mod duration;
pub mod trigger;

pub use backend::{TimerBackend, TokioTimerBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use duration::{parse_duration, resolve_duration};
pub use trigger::{TimerId, TimerRegistry, TimerTrigger};
