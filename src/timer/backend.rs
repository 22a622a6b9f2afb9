// src/timer/backend.rs

//! Pluggable timer backend.
//!
//! The runtime shell hands `ScheduleTimer` / `CancelTimer` commands from the
//! core to a `TimerBackend` instead of sleeping itself. When a timer elapses
//! the backend posts `RuntimeEvent::TimerElapsed` back onto the runtime
//! channel, so the elapse is processed like any other event.
//!
//! - `TokioTimerBackend` is the production implementation.
//! - Tests can provide their own backend that records requests and fires
//!   them on demand.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::timer::TimerId;

pub trait TimerBackend: Send {
    /// Arrange for `TimerElapsed { timer }` to be delivered after `delay`.
    fn schedule(&mut self, timer: TimerId, delay: Duration) -> Result<()>;

    /// Cancel a scheduled timer. Unknown or already fired timers are ignored.
    fn cancel(&mut self, timer: TimerId);

    /// Cancel everything still pending (runtime shutdown).
    fn cancel_all(&mut self);
}

/// Internal handle for a pending timer task.
struct ActiveTimer {
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Timer backend that runs each timer as a Tokio task racing a sleep
/// against a cancellation channel.
pub struct TokioTimerBackend {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    active: HashMap<TimerId, ActiveTimer>,
}

impl TokioTimerBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            runtime_tx,
            active: HashMap::new(),
        }
    }

    /// Number of timers not yet fired or canceled.
    pub fn pending(&self) -> usize {
        self.active
            .values()
            .filter(|t| !t.handle.is_finished())
            .count()
    }
}

impl TimerBackend for TokioTimerBackend {
    fn schedule(&mut self, timer: TimerId, delay: Duration) -> Result<()> {
        self.active.retain(|_, t| !t.handle.is_finished());

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let tx = self.runtime_tx.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = sleep(delay) => {
                    debug!(%timer, ?delay, "timer elapsed");
                    if tx.send(RuntimeEvent::TimerElapsed { timer }).await.is_err() {
                        debug!(%timer, "runtime channel closed before timer delivery");
                    }
                }
                cancel = &mut cancel_rx => {
                    match cancel {
                        Ok(()) => debug!(%timer, "timer canceled before elapsing"),
                        Err(_) => debug!(%timer, "timer cancel channel dropped"),
                    }
                }
            }
        });

        self.active.insert(
            timer,
            ActiveTimer {
                cancel: Some(cancel_tx),
                handle,
            },
        );
        Ok(())
    }

    fn cancel(&mut self, timer: TimerId) {
        match self.active.remove(&timer) {
            Some(mut existing) => {
                if let Some(cancel) = existing.cancel.take() {
                    if cancel.send(()).is_err() {
                        debug!(%timer, "timer already finished while canceling");
                    }
                }
            }
            None => debug!(%timer, "cancel for unknown timer; ignoring"),
        }
    }

    fn cancel_all(&mut self) {
        let count = self.active.len();
        for (_, timer) in self.active.drain() {
            timer.handle.abort();
        }
        if count > 0 {
            info!(count, "canceled pending timers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_timer_posts_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut backend = TokioTimerBackend::new(tx);
        backend.schedule(TimerId(7), Duration::from_millis(5)).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timer should fire");
        assert!(matches!(event, Some(RuntimeEvent::TimerElapsed { timer }) if timer == TimerId(7)));
    }

    #[tokio::test]
    async fn canceled_timer_never_posts() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut backend = TokioTimerBackend::new(tx);
        backend.schedule(TimerId(1), Duration::from_millis(30)).unwrap();
        assert_eq!(backend.pending(), 1);
        backend.cancel(TimerId(1));
        assert_eq!(backend.pending(), 0);

        let res = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(res.is_err(), "no event expected after cancel");
    }
}
