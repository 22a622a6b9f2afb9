// src/activity/mod.rs

//! Generic activity lifecycle.
//!
//! - [`state`]: the state enum and transition table.
//! - [`behaviour`]: per node-type strategy for what "run" means.
//! - [`instance`]: one runtime instance per node.
//! - [`notification`]: lifecycle notifications emitted to observers.

pub mod behaviour;
pub mod instance;
pub mod notification;
pub mod state;

pub use behaviour::Behaviour;
pub use instance::ActivityInstance;
pub use notification::{Notification, NotificationKind};
pub use state::{ActivityState, Transition};
