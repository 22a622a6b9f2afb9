// tests/discard_propagation.rs

mod common;
use crate::common::{init_tracing, ProcessBuilder, ProcessHarness, TestResult};

use procflow::activity::{ActivityState, NotificationKind};
use procflow::config::ProcessDefinition;
use procflow::errors::FlowError;
use procflow::graph::FlowSignal;

/// start -> gate -> {a, b} -> join -> end
fn diamond() -> ProcessDefinition {
    ProcessBuilder::new("diamond")
        .start("start")
        .user_task("gate")
        .task("a")
        .task("b")
        .task("join")
        .end("end")
        .flow("s", "start", "gate")
        .flow("g1", "gate", "a")
        .flow("g2", "gate", "b")
        .flow("j1", "a", "join")
        .flow("j2", "b", "join")
        .flow("j3", "join", "end")
        .build()
}

/// start -> split -> {x, y} (user tasks) -> join -> end
fn fork() -> ProcessDefinition {
    ProcessBuilder::new("fork")
        .start("start")
        .task("split")
        .user_task("x")
        .user_task("y")
        .task("join")
        .end("end")
        .flow("s", "start", "split")
        .flow("sx", "split", "x")
        .flow("sy", "split", "y")
        .flow("xj", "x", "join")
        .flow("yj", "y", "join")
        .flow("je", "join", "end")
        .build()
}

#[test]
fn discarding_gate_discards_every_downstream_flow_once() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&diamond());
    h.start()?;
    assert_eq!(h.state("gate"), Some(ActivityState::Waiting));

    h.discard("gate")?;

    for flow in ["g1", "g2", "j1", "j2", "j3"] {
        assert_eq!(h.signals_on(flow), vec![FlowSignal::Discard], "flow {flow}");
    }
    for node in ["gate", "a", "b", "join", "end"] {
        assert_eq!(h.outcome(node), Some(ActivityState::Discarded), "node {node}");
        assert_eq!(h.count(node, NotificationKind::Discarded), 1, "node {node}");
        assert_eq!(h.count(node, NotificationKind::End), 0, "node {node}");
    }
    assert!(h.is_completed());
    Ok(())
}

#[test]
fn join_waits_for_all_inbound_discards() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&fork());
    h.start()?;

    h.discard("x")?;
    assert_eq!(h.signals_on("xj"), vec![FlowSignal::Discard]);
    assert_eq!(h.state("join"), Some(ActivityState::Armed));
    assert!(h.signals_on("je").is_empty());

    h.discard("y")?;
    assert_eq!(h.outcome("join"), Some(ActivityState::Discarded));
    assert_eq!(h.signals_on("je"), vec![FlowSignal::Discard]);
    assert_eq!(h.outcome("end"), Some(ActivityState::Discarded));
    Ok(())
}

#[test]
fn take_after_partial_discard_runs_the_join() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&fork());
    h.start()?;

    h.discard("x")?;
    h.signal("y")?;

    assert_eq!(h.outcome("join"), Some(ActivityState::Ended));
    assert_eq!(h.count("join", NotificationKind::Discarded), 0);
    assert_eq!(h.outcome("end"), Some(ActivityState::Ended));
    assert!(h.is_completed());
    Ok(())
}

#[test]
fn discard_is_idempotent() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&diamond());
    h.start()?;

    h.discard("gate")?;
    h.discard("gate")?;

    assert_eq!(h.count("gate", NotificationKind::Discarded), 1);
    assert_eq!(h.signals_on("g1").len(), 1);
    Ok(())
}

#[test]
fn discard_rejected_before_start_and_after_completion() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&diamond());

    let err = h.discard("gate").unwrap_err();
    assert!(matches!(
        err,
        FlowError::InvalidTransition { op: "discard", state: ActivityState::Idle, .. }
    ));

    h.start()?;
    let err = h.discard("start").unwrap_err();
    assert!(matches!(
        err,
        FlowError::InvalidTransition { op: "discard", state: ActivityState::Left, .. }
    ));
    Ok(())
}

#[test]
fn unknown_node_is_reported() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&diamond());
    h.start()?;

    let err = h.signal("nope").unwrap_err();
    assert!(matches!(err, FlowError::UnknownNode(ref id) if id == "nope"));
    Ok(())
}

#[test]
fn discarded_instance_can_run_on_a_later_take() -> TestResult {
    init_tracing();
    let def = ProcessBuilder::new("chain")
        .start("start")
        .user_task("gate")
        .task("a")
        .end("end")
        .flow("s", "start", "gate")
        .flow("g", "gate", "a")
        .flow("e", "a", "end")
        .build();
    let mut h = ProcessHarness::new(&def);
    h.start()?;

    // `a` has not been reached yet.
    h.discard("a")?;
    assert_eq!(h.outcome("end"), Some(ActivityState::Discarded));

    h.signal("gate")?;
    assert_eq!(h.signals_on("g"), vec![FlowSignal::Take]);
    assert_eq!(h.signals_on("e"), vec![FlowSignal::Discard, FlowSignal::Take]);
    assert_eq!(h.outcome("a"), Some(ActivityState::Ended));
    assert_eq!(h.outcome("end"), Some(ActivityState::Ended));
    assert_eq!(
        h.kinds_for("a"),
        vec![
            NotificationKind::Discarded,
            NotificationKind::Leave,
            NotificationKind::Start,
            NotificationKind::End,
            NotificationKind::Leave
        ]
    );
    Ok(())
}

#[test]
fn late_sibling_take_does_not_enter_twice() -> TestResult {
    init_tracing();
    let def = ProcessBuilder::new("race")
        .start("start")
        .task("split")
        .user_task("x")
        .user_task("y")
        .user_task("join")
        .end("end")
        .flow("s", "start", "split")
        .flow("sx", "split", "x")
        .flow("sy", "split", "y")
        .flow("xj", "x", "join")
        .flow("yj", "y", "join")
        .flow("je", "join", "end")
        .build();
    let mut h = ProcessHarness::new(&def);
    h.start()?;

    h.signal("x")?;
    assert_eq!(h.state("join"), Some(ActivityState::Waiting));

    h.signal("y")?;
    assert_eq!(h.signals_on("yj"), vec![FlowSignal::Take]);
    assert_eq!(h.state("join"), Some(ActivityState::Waiting));
    assert_eq!(h.count("join", NotificationKind::Start), 1);

    h.signal("join")?;
    assert_eq!(h.count("end", NotificationKind::End), 1);
    assert!(h.is_completed());
    Ok(())
}

#[test]
fn join_after_a_taken_fork_runs_once() -> TestResult {
    init_tracing();
    let mut h = ProcessHarness::new(&diamond());
    h.start()?;

    h.signal("gate")?;

    assert_eq!(h.signals_on("j1"), vec![FlowSignal::Take]);
    assert_eq!(h.signals_on("j2"), vec![FlowSignal::Take]);
    assert_eq!(h.count("join", NotificationKind::Start), 1);
    assert_eq!(h.count("join", NotificationKind::End), 1);
    assert_eq!(h.signals_on("j3"), vec![FlowSignal::Take]);
    assert_eq!(h.count("end", NotificationKind::End), 1);
    assert!(h.is_completed());
    Ok(())
}

#[test]
fn loop_back_flow_re_enters_the_node() -> TestResult {
    init_tracing();
    // start -> review -> {a, b} -> join -> check -> back to review
    let def = ProcessBuilder::new("rounds")
        .start("start")
        .user_task("review")
        .task("a")
        .task("b")
        .task("join")
        .user_task("check")
        .flow("s", "start", "review")
        .flow("ra", "review", "a")
        .flow("rb", "review", "b")
        .flow("aj", "a", "join")
        .flow("bj", "b", "join")
        .flow("jc", "join", "check")
        .flow("back", "check", "review")
        .build();
    let mut h = ProcessHarness::new(&def);
    h.start()?;

    h.signal("review")?;
    assert_eq!(h.count("join", NotificationKind::Start), 1);
    assert_eq!(h.state("check"), Some(ActivityState::Waiting));

    h.signal("check")?;
    assert_eq!(h.signals_on("back"), vec![FlowSignal::Take]);
    assert_eq!(h.state("review"), Some(ActivityState::Waiting));
    assert_eq!(h.count("review", NotificationKind::Start), 2);

    h.signal("review")?;
    assert_eq!(h.count("join", NotificationKind::Start), 2);
    assert_eq!(h.state("check"), Some(ActivityState::Waiting));
    Ok(())
}
