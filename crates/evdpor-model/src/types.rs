//! Program types: variables, events and the operations events perform.

use serde::{Deserialize, Serialize};

/// An event-driven program: shared integer variables plus a fixed set of
/// events that read and write them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Program {
    /// Program name.
    pub name: String,
    /// Shared variables. The variable name is the field key of its accesses.
    pub variables: Vec<Variable>,
    /// Events, identified by their position in this list.
    pub events: Vec<EventDef>,
    /// Field relevance patterns (empty = every field is tracked).
    #[serde(default, skip_serializing_if = "FilterPatterns::is_empty")]
    pub filter: FilterPatterns,
}

/// A shared variable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub name: String,
    /// Id of the object owning the field.
    #[serde(default)]
    pub owner: u64,
    #[serde(default)]
    pub initial: i64,
}

/// A schedulable event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventDef {
    pub name: String,
    pub ops: Vec<Op>,
}

/// One operation of an event body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum Op {
    /// Read a variable.
    Read { var: String },
    /// `var := value`.
    Write { var: String, value: i64 },
    /// `var := (var + 1) mod modulus`.
    Increment { var: String, modulus: i64 },
    /// `to := from`.
    Copy { from: String, to: String },
    /// Operations run under a secondary decision point nested in the event.
    Nested { ops: Vec<Op> },
}

impl Op {
    /// Variables named by this operation (nested bodies included).
    pub fn variables(&self) -> Vec<&str> {
        match self {
            Op::Read { var } | Op::Write { var, .. } | Op::Increment { var, .. } => {
                vec![var.as_str()]
            }
            Op::Copy { from, to } => vec![from.as_str(), to.as_str()],
            Op::Nested { ops } => ops.iter().flat_map(Op::variables).collect(),
        }
    }
}

/// Patterns excluding fields from conflict tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilterPatterns {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub starts_with: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ends_with: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contains: Vec<String>,
    /// Prefixes excluded only for writes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_starts_with: Vec<String>,
}

impl FilterPatterns {
    pub fn is_empty(&self) -> bool {
        self.starts_with.is_empty()
            && self.ends_with.is_empty()
            && self.contains.is_empty()
            && self.write_starts_with.is_empty()
    }
}
