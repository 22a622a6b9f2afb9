// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use serde_json::Value;

/// Command-line arguments for `procflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "procflow",
    version,
    about = "Run a process definition with boundary timers, signals and stop/resume.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the process definition (TOML).
    ///
    /// Default: `Process.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Process.toml")]
    pub definition: String,

    /// Override a process variable. The value is parsed as JSON when
    /// possible (`timeout=0.2`), otherwise taken as a string.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, Value)>,

    /// Signal a node, optionally after a delay in milliseconds.
    #[arg(long = "signal", value_name = "NODE[:MS]", value_parser = parse_signal)]
    pub signals: Vec<SignalSpec>,

    /// Suspend the process to a snapshot after this many milliseconds.
    #[arg(long, value_name = "MS")]
    pub stop_after: Option<u64>,

    /// Resume from a snapshot file instead of starting fresh.
    #[arg(long, value_name = "PATH")]
    pub resume: Option<PathBuf>,

    /// Where to write the snapshot when the process is suspended.
    /// Printed to stdout when omitted.
    #[arg(long, value_name = "PATH")]
    pub snapshot_out: Option<PathBuf>,

    /// Print lifecycle notifications to stdout as JSON lines.
    #[arg(long)]
    pub notifications: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PROCFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the process graph, but don't run it.
    #[arg(long)]
    pub dry_run: bool,
}

/// A `--signal NODE[:MS]` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalSpec {
    pub node: String,
    pub after_ms: u64,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

fn parse_var(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn parse_signal(s: &str) -> Result<SignalSpec, String> {
    let (node, after_ms) = match s.rsplit_once(':') {
        Some((node, ms)) => {
            let ms = ms
                .trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid delay in '{s}': {e}"))?;
            (node, ms)
        }
        None => (s, 0),
    };
    if node.trim().is_empty() {
        return Err(format!("empty node id in '{s}'"));
    }
    Ok(SignalSpec {
        node: node.trim().to_string(),
        after_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_values_prefer_json() {
        assert_eq!(
            parse_var("timeout=0.2").unwrap(),
            ("timeout".to_string(), serde_json::json!(0.2))
        );
        assert_eq!(
            parse_var("who=alice").unwrap(),
            ("who".to_string(), Value::String("alice".into()))
        );
        assert!(parse_var("novalue").is_err());
    }

    #[test]
    fn signal_delay_is_optional() {
        assert_eq!(
            parse_signal("approve:250").unwrap(),
            SignalSpec {
                node: "approve".into(),
                after_ms: 250
            }
        );
        assert_eq!(parse_signal("approve").unwrap().after_ms, 0);
        assert!(parse_signal("approve:soon").is_err());
    }

    #[test]
    fn full_command_line_parses() {
        let args = CliArgs::try_parse_from([
            "procflow",
            "--definition",
            "demos/approval.toml",
            "--var",
            "timeout=0.5",
            "--signal",
            "approve:100",
            "--stop-after",
            "50",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.definition, "demos/approval.toml");
        assert_eq!(args.vars.len(), 1);
        assert_eq!(args.signals[0].node, "approve");
        assert_eq!(args.stop_after, Some(50));
        assert!(args.dry_run);
    }
}
