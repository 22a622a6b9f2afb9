// src/engine/runtime.rs

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::activity::Notification;
use crate::errors::Result;
use crate::snapshot::Snapshot;
use crate::timer::TimerBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreStep, RuntimeEvent};

/// How a `Runtime::run` ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// The process reached completion (no instance holds a token).
    pub completed: bool,
    /// Present when the process was suspended by `Stop` / Ctrl-C.
    pub snapshot: Option<Snapshot>,
}

/// Async shell around `CoreRuntime`.
///
/// Process semantics live in the core. The shell only moves data: events
/// in from the channel, timer requests out to the `TimerBackend`, and
/// notifications out to the optional listener.
pub struct Runtime<T: TimerBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    timers: T,
    listener: Option<mpsc::UnboundedSender<Notification>>,
}

impl<T: TimerBackend> fmt::Debug for Runtime<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<T: TimerBackend> Runtime<T> {
    pub fn new(core: CoreRuntime, event_rx: mpsc::Receiver<RuntimeEvent>, timers: T) -> Self {
        Self {
            core,
            event_rx,
            timers,
            listener: None,
        }
    }

    /// Forward every notification to `listener`.
    pub fn with_listener(mut self, listener: mpsc::UnboundedSender<Notification>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Run until the core asks to exit or every sender is gone.
    ///
    /// Deferred effects from a resume (re-armed timers) are applied before
    /// the first event is read.
    pub async fn run(mut self) -> Result<RunOutcome> {
        info!(process = %self.core.graph().id(), "procflow runtime started");

        let mut snapshot = None;

        let initial = self.core.take_deferred();
        let mut keep_running = self.apply(initial, &mut snapshot)?;

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let step = match self.core.step(event) {
                Ok(step) => step,
                Err(err) => {
                    warn!(error = %err, "core rejected event");
                    continue;
                }
            };

            keep_running = self.apply(step, &mut snapshot)?;
            if !keep_running {
                info!("core requested exit; stopping runtime");
            }
        }

        self.timers.cancel_all();
        info!("runtime exiting");

        Ok(RunOutcome {
            completed: self.core.is_completed(),
            snapshot,
        })
    }

    fn apply(&mut self, step: CoreStep, snapshot: &mut Option<Snapshot>) -> Result<bool> {
        for err in &step.errors {
            error!(error = %err, "error while handling event");
        }

        if let Some(listener) = &self.listener {
            for notification in step.notifications {
                if listener.send(notification).is_err() {
                    debug!("notification listener dropped");
                    break;
                }
            }
        }

        for command in step.commands {
            self.execute_command(command)?;
        }

        if step.snapshot.is_some() {
            *snapshot = step.snapshot;
        }
        if step.completed {
            info!(process = %self.core.graph().id(), "process completed");
        }

        Ok(step.keep_running)
    }

    fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::ScheduleTimer { timer, node, delay } => {
                debug!(%timer, node = %node, ?delay, "scheduling timer");
                self.timers.schedule(timer, delay)?;
            }
            CoreCommand::CancelTimer { timer } => {
                self.timers.cancel(timer);
            }
            CoreCommand::RequestExit => {
                // The core already returns keep_running=false with this
                // command, so there is nothing left to do here.
                debug!("core issued RequestExit command");
            }
        }
        Ok(())
    }
}
