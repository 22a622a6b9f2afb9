// tests/runtime_tokio.rs

mod common;
use crate::common::{approval, init_tracing, with_timeout, ProcessHarness, TestResult};

use std::sync::Arc;
use std::time::Duration;

use procflow::activity::{Notification, NotificationKind};
use procflow::engine::{CoreRuntime, RuntimeEvent, Runtime};
use procflow::timer::{SystemClock, TokioTimerBackend};
use procflow_test_utils::fake_timers::RecordingTimerBackend;
use tokio::sync::mpsc;

fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

#[tokio::test]
async fn real_timer_interrupts_host_and_runtime_exits() -> TestResult {
    init_tracing();
    let def = approval(true, "PT0.05S");
    let core = CoreRuntime::new(&def, Arc::new(SystemClock::new()));

    let (tx, rx) = mpsc::channel(16);
    let (note_tx, mut note_rx) = mpsc::unbounded_channel();
    let runtime = Runtime::new(core, rx, TokioTimerBackend::new(tx.clone())).with_listener(note_tx);

    tx.send(RuntimeEvent::Start).await?;
    let outcome = with_timeout(runtime.run()).await?;

    assert!(outcome.completed);
    assert!(outcome.snapshot.is_none());

    let notes = drain(&mut note_rx);
    let ended: Vec<_> = notes
        .iter()
        .filter(|n| n.kind == NotificationKind::End)
        .map(|n| n.id.as_str())
        .collect();
    assert_eq!(ended, vec!["start", "expire", "expired"]);
    Ok(())
}

#[tokio::test]
async fn signal_before_real_timer_completes_normally() -> TestResult {
    init_tracing();
    let def = approval(true, "PT5S");
    let core = CoreRuntime::new(&def, Arc::new(SystemClock::new()));

    let (tx, rx) = mpsc::channel(16);
    let runtime = Runtime::new(core, rx, TokioTimerBackend::new(tx.clone()));

    tx.send(RuntimeEvent::Start).await?;
    tx.send(RuntimeEvent::Signal {
        node: "approve".into(),
        payload: None,
    })
    .await?;

    // Finishes well before the 5 s boundary would have fired.
    let outcome = with_timeout(runtime.run()).await?;
    assert!(outcome.completed);
    Ok(())
}

#[tokio::test]
async fn recorded_timer_fires_on_demand() -> TestResult {
    init_tracing();
    let def = approval(true, "PT0.1S");
    let core = CoreRuntime::new(&def, Arc::new(SystemClock::new()));

    let (tx, rx) = mpsc::channel(16);
    let (backend, timers) = RecordingTimerBackend::new(tx.clone());
    let task = tokio::spawn(Runtime::new(core, rx, backend).run());

    tx.send(RuntimeEvent::Start).await?;
    let scheduled = with_timeout(timers.wait_for_scheduled(1)).await;
    let (timer, delay) = scheduled[0];
    assert_eq!(delay, Duration::from_millis(100));

    // A rejected event is logged and does not stop the loop.
    tx.send(RuntimeEvent::Cancel {
        node: "missing".into(),
    })
    .await?;

    timers.fire(timer).await;
    let outcome = with_timeout(task).await??;

    assert!(outcome.completed);
    assert!(timers.canceled_all());
    Ok(())
}

#[tokio::test]
async fn stop_returns_snapshot_and_cancels_timers() -> TestResult {
    init_tracing();
    let def = approval(true, "PT10S");
    let core = CoreRuntime::new(&def, Arc::new(SystemClock::new()));

    let (tx, rx) = mpsc::channel(16);
    let (backend, timers) = RecordingTimerBackend::new(tx.clone());
    let task = tokio::spawn(Runtime::new(core, rx, backend).run());

    tx.send(RuntimeEvent::Start).await?;
    let (timer, _) = with_timeout(timers.wait_for_scheduled(1)).await[0];
    tx.send(RuntimeEvent::Stop).await?;

    let outcome = with_timeout(task).await??;
    assert!(!outcome.completed);
    let snapshot = outcome.snapshot.expect("stop yields a snapshot");
    let expire = snapshot.child("expire").expect("boundary entry");
    assert!(expire.entered);
    assert!(expire.timeout.is_some_and(|ms| ms <= 10_000));
    assert!(timers.canceled().contains(&timer));
    Ok(())
}

#[tokio::test]
async fn resumed_runtime_schedules_remaining_time_first() -> TestResult {
    init_tracing();
    let def = approval(true, "PT1S");

    let mut h = ProcessHarness::new(&def);
    h.start()?;
    h.advance(400)?;
    let snapshot = h.stop()?;

    let core = CoreRuntime::resume(&def, &snapshot, Arc::new(SystemClock::new()))?;
    let (tx, rx) = mpsc::channel(16);
    let (backend, timers) = RecordingTimerBackend::new(tx.clone());
    let task = tokio::spawn(Runtime::new(core, rx, backend).run());

    let (timer, delay) = with_timeout(timers.wait_for_scheduled(1)).await[0];
    assert_eq!(delay, Duration::from_millis(600));

    timers.fire(timer).await;
    let outcome = with_timeout(task).await??;
    assert!(outcome.completed);
    Ok(())
}
