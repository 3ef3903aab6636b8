//! Serializable model of event-driven programs.
//!
//! Programs are plain JSON documents: shared variables, a list of events
//! whose bodies read and write those variables, and optional field filter
//! patterns. The simulator interprets them; the CLI loads, validates and
//! formats them.

mod error;
mod types;

pub use error::{ModelError, ModelResult};
pub use types::*;

use std::collections::HashSet;

impl Program {
    /// Parse and validate a program.
    pub fn from_json(src: &str) -> ModelResult<Program> {
        let program: Program = serde_json::from_str(src)?;
        program.validate()?;
        Ok(program)
    }

    /// Canonical pretty-printed JSON.
    pub fn to_json_pretty(&self) -> ModelResult<String> {
        serde_json::to_string_pretty(self).map_err(ModelError::Encode)
    }

    /// Check names are unique, every referenced variable exists and every
    /// modulus is positive.
    pub fn validate(&self) -> ModelResult<()> {
        let mut seen = HashSet::new();
        for var in &self.variables {
            if !seen.insert(var.name.as_str()) {
                return Err(ModelError::DuplicateVariable {
                    name: var.name.clone(),
                });
            }
        }
        let mut events = HashSet::new();
        for event in &self.events {
            if !events.insert(event.name.as_str()) {
                return Err(ModelError::DuplicateEvent {
                    name: event.name.clone(),
                });
            }
            for op in &event.ops {
                validate_op(&event.name, op, &seen)?;
            }
        }
        Ok(())
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

fn validate_op(event: &str, op: &Op, vars: &HashSet<&str>) -> ModelResult<()> {
    if let Op::Increment { var, modulus } = op {
        if *modulus <= 0 {
            return Err(ModelError::BadModulus {
                event: event.to_string(),
                var: var.clone(),
                modulus: *modulus,
            });
        }
    }
    if let Op::Nested { ops } = op {
        return ops.iter().try_for_each(|inner| validate_op(event, inner, vars));
    }
    match op.variables().into_iter().find(|v| !vars.contains(v)) {
        Some(var) => Err(ModelError::UnknownVariable {
            event: event.to_string(),
            var: var.to_string(),
        }),
        None => Ok(()),
    }
}
