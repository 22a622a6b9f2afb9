// src/variables.rs

//! Read-only process variable scope.
//!
//! The core only ever reads variables (timer expressions); it never writes
//! them back.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lookup of dotted variable paths such as `variables.timeout`.
pub trait VariableScope {
    fn lookup(&self, path: &str) -> Option<&Value>;
}

/// Process variables keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables(Map<String, Value>);

impl Variables {
    pub fn new(values: Map<String, Value>) -> Self {
        Self(values)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Overlay `other` on top of these variables.
    pub fn merged_with(mut self, other: &Map<String, Value>) -> Self {
        for (k, v) in other {
            self.0.insert(k.clone(), v.clone());
        }
        self
    }
}

impl VariableScope for Variables {
    /// Resolve `variables.a.b`, `environment.variables.a` or a bare `a.b`.
    ///
    /// Object keys are followed by name, arrays by numeric index.
    fn lookup(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        let path = path.strip_prefix("environment.").unwrap_or(path);
        let path = path.strip_prefix("variables.").unwrap_or(path);

        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}
