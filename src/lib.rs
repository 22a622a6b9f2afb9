// src/lib.rs

pub mod activity;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod logging;
pub mod snapshot;
pub mod timer;
pub mod types;
pub mod variables;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::activity::Notification;
use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ProcessDefinition;
use crate::engine::{CoreRuntime, Runtime, RuntimeEvent};
use crate::snapshot::Snapshot;
use crate::timer::{Clock, SystemClock, TokioTimerBackend};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - definition loading and `--var` overrides
/// - core runtime (fresh or resumed from a snapshot)
/// - tokio timer backend
/// - scripted `--signal` / `--stop-after` events
/// - Ctrl-C handling (suspends to a snapshot)
pub async fn run(args: CliArgs) -> Result<()> {
    let definition_path = PathBuf::from(&args.definition);
    let mut def = load_and_validate(&definition_path)?;
    for (name, value) in &args.vars {
        debug!(variable = %name, %value, "variable override");
        def.set_variable(name.clone(), value.clone());
    }

    if args.dry_run {
        print_dry_run(&def);
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let core = match &args.resume {
        Some(path) => {
            let snapshot = Snapshot::read_from(path)?;
            info!(path = %path.display(), "resuming from snapshot");
            CoreRuntime::resume(&def, &snapshot, clock)?
        }
        None => CoreRuntime::new(&def, clock),
    };

    // Runtime event channel.
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);
    let timers = TokioTimerBackend::new(rt_tx.clone());

    // Ctrl-C → suspend.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        });
    }

    if args.resume.is_none() {
        rt_tx.send(RuntimeEvent::Start).await?;
    }

    for signal in args.signals.iter().cloned() {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(signal.after_ms)).await;
            let event = RuntimeEvent::Signal {
                node: signal.node,
                payload: None,
            };
            if tx.send(event).await.is_err() {
                debug!("runtime gone before scripted signal");
            }
        });
    }

    if let Some(ms) = args.stop_after {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let _ = tx.send(RuntimeEvent::Stop).await;
        });
    }
    drop(rt_tx);

    let mut runtime = Runtime::new(core, rt_rx, timers);
    let printer = if args.notifications {
        let (note_tx, note_rx) = mpsc::unbounded_channel();
        runtime = runtime.with_listener(note_tx);
        Some(tokio::spawn(print_notifications(note_rx)))
    } else {
        None
    };

    let outcome = runtime.run().await?;

    if let Some(printer) = printer {
        printer.await?;
    }

    match outcome.snapshot {
        Some(snapshot) => match &args.snapshot_out {
            Some(path) => {
                snapshot.write_to(path)?;
                info!(path = %path.display(), "snapshot written");
            }
            None => println!("{}", snapshot.to_json_pretty()?),
        },
        None if outcome.completed => info!("process completed"),
        None => warn!("runtime exited before the process completed"),
    }

    Ok(())
}

async fn print_notifications(mut rx: mpsc::UnboundedReceiver<Notification>) {
    while let Some(notification) = rx.recv().await {
        match serde_json::to_string(&notification) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "failed to encode notification"),
        }
    }
}

/// Simple dry-run output: print variables, nodes and flows.
fn print_dry_run(def: &ProcessDefinition) {
    println!("procflow dry-run");
    println!("  process.id = {}", def.process.id);
    if let Some(name) = &def.process.name {
        println!("  process.name = {name}");
    }
    println!(
        "  runtime.exit_when_complete = {}",
        def.runtime.exit_when_complete
    );
    println!();

    if !def.variables.is_empty() {
        println!("variables ({}):", def.variables.len());
        for (name, value) in def.variables.iter() {
            println!("  - {name} = {value}");
        }
        println!();
    }

    println!("nodes ({}):", def.node.len());
    for (id, node) in def.node.iter() {
        println!("  - {id} ({})", node.kind);
        if let Some(host) = &node.attached_to {
            println!("      attached_to: {host}");
            println!("      interrupting: {}", node.interrupting);
        }
        if let Some(timer) = &node.timer {
            println!("      timer: {}", timer.duration);
        }
    }
    println!();

    println!("flows ({}):", def.flow.len());
    for (id, flow) in def.flow.iter() {
        println!("  - {id}: {} -> {}", flow.source, flow.target);
    }

    debug!("dry-run complete (no execution)");
}
