// src/timer/duration.rs

//! Duration resolution for timer definitions.
//!
//! A timer definition is either an ISO-8601 duration literal (`PT0.5S`,
//! `PT1H30M`, `P1DT2H`) or a template containing `${path}` references to
//! process variables (`PT${variables.timeout}S`). Templates are substituted
//! first and the result is parsed as a literal.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::debug;

use crate::errors::{FlowError, Result};
use crate::variables::VariableScope;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<sign>[-+])?P(?:(?P<d>\d+(?:[.,]\d+)?)D)?(?:(?P<t>T)(?:(?P<h>\d+(?:[.,]\d+)?)H)?(?:(?P<m>\d+(?:[.,]\d+)?)M)?(?:(?P<s>\d+(?:[.,]\d+)?)S)?)?$",
    )
    .expect("duration regex is valid")
});

static EXPRESSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}").expect("expression regex is valid")
});

/// Whether the definition contains variable-expression markers.
pub fn has_expression(spec: &str) -> bool {
    spec.contains("${")
}

/// Parse an ISO-8601 duration literal into milliseconds.
///
/// Negative durations clamp to zero.
pub fn parse_duration(literal: &str) -> std::result::Result<u64, String> {
    let literal = literal.trim();
    let caps = DURATION_RE
        .captures(literal)
        .ok_or_else(|| format!("invalid ISO-8601 duration '{}'", literal))?;

    let part = |name: &str| -> Option<f64> {
        caps.name(name)
            .and_then(|m| m.as_str().replace(',', ".").parse::<f64>().ok())
    };

    let (d, h, m, s) = (part("d"), part("h"), part("m"), part("s"));
    if d.is_none() && h.is_none() && m.is_none() && s.is_none() {
        return Err(format!("duration '{}' has no components", literal));
    }
    if caps.name("t").is_some() && h.is_none() && m.is_none() && s.is_none() {
        return Err(format!(
            "duration '{}' has a time designator without components",
            literal
        ));
    }

    let millis = d.unwrap_or(0.0) * 86_400_000.0
        + h.unwrap_or(0.0) * 3_600_000.0
        + m.unwrap_or(0.0) * 60_000.0
        + s.unwrap_or(0.0) * 1_000.0;

    if caps.name("sign").map(|m| m.as_str()) == Some("-") {
        debug!(duration = %literal, "negative duration clamped to zero");
        return Ok(0);
    }

    Ok(millis.round() as u64)
}

/// Resolve a timer definition into milliseconds, substituting variable
/// references from `scope` first when present.
pub fn resolve_duration(spec: &str, scope: &dyn VariableScope) -> Result<u64> {
    if !has_expression(spec) {
        return parse_duration(spec).map_err(FlowError::TimerResolution);
    }

    let mut failure: Option<String> = None;
    let substituted = EXPRESSION_RE.replace_all(spec, |caps: &Captures| {
        let path = &caps[1];
        match scope.lookup(path) {
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                failure.get_or_insert_with(|| {
                    format!("variable '{}' is not a number or string: {}", path, other)
                });
                String::new()
            }
            None => {
                failure.get_or_insert_with(|| format!("variable '{}' is not defined", path));
                String::new()
            }
        }
    });

    if let Some(reason) = failure {
        return Err(FlowError::TimerResolution(format!(
            "expression '{}': {}",
            spec, reason
        )));
    }

    let millis = parse_duration(&substituted).map_err(|e| {
        FlowError::TimerResolution(format!(
            "expression '{}' resolved to '{}': {}",
            spec, substituted, e
        ))
    })?;

    debug!(expression = %spec, resolved = %substituted, millis, "resolved timer expression");
    Ok(millis)
}
