use std::sync::{Arc, Mutex};
use std::time::Duration;

use procflow::engine::RuntimeEvent;
use procflow::errors::Result;
use procflow::timer::{TimerBackend, TimerId};
use tokio::sync::mpsc;

/// What a `RecordingTimerBackend` was asked to do.
#[derive(Debug, Default)]
pub struct TimerLog {
    pub scheduled: Vec<(TimerId, Duration)>,
    pub canceled: Vec<TimerId>,
    pub canceled_all: bool,
}

/// A fake timer backend that:
/// - records every schedule / cancel request
/// - never fires on its own; tests call [`TimerHandle::fire`].
pub struct RecordingTimerBackend {
    log: Arc<Mutex<TimerLog>>,
}

/// Test-side handle to inspect and fire recorded timers.
#[derive(Clone)]
pub struct TimerHandle {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    log: Arc<Mutex<TimerLog>>,
}

impl RecordingTimerBackend {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>) -> (Self, TimerHandle) {
        let log = Arc::new(Mutex::new(TimerLog::default()));
        let handle = TimerHandle {
            runtime_tx,
            log: Arc::clone(&log),
        };
        (Self { log }, handle)
    }
}

impl TimerBackend for RecordingTimerBackend {
    fn schedule(&mut self, timer: TimerId, delay: Duration) -> Result<()> {
        self.log.lock().unwrap().scheduled.push((timer, delay));
        Ok(())
    }

    fn cancel(&mut self, timer: TimerId) {
        self.log.lock().unwrap().canceled.push(timer);
    }

    fn cancel_all(&mut self) {
        self.log.lock().unwrap().canceled_all = true;
    }
}

impl TimerHandle {
    pub fn scheduled(&self) -> Vec<(TimerId, Duration)> {
        self.log.lock().unwrap().scheduled.clone()
    }

    pub fn canceled(&self) -> Vec<TimerId> {
        self.log.lock().unwrap().canceled.clone()
    }

    pub fn canceled_all(&self) -> bool {
        self.log.lock().unwrap().canceled_all
    }

    /// Wait until at least `n` timers have been scheduled.
    pub async fn wait_for_scheduled(&self, n: usize) -> Vec<(TimerId, Duration)> {
        loop {
            let scheduled = self.scheduled();
            if scheduled.len() >= n {
                return scheduled;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    /// Deliver `TimerElapsed { timer }` to the runtime.
    pub async fn fire(&self, timer: TimerId) {
        let _ = self
            .runtime_tx
            .send(RuntimeEvent::TimerElapsed { timer })
            .await;
    }
}
