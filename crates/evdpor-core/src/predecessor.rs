//! Predecessor index: which (execution, position) pairs lead into a state.

use crate::execution::TransitionRef;
use crate::ids::StateId;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct PredecessorIndex {
    records: HashMap<StateId, Vec<TransitionRef>>,
    recorded: HashSet<(StateId, TransitionRef)>,
}

impl PredecessorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` transitions into `state`. Idempotent per pair.
    pub fn record(&mut self, state: StateId, from: TransitionRef) -> bool {
        if !self.recorded.insert((state, from)) {
            return false;
        }
        self.records.entry(state).or_default().push(from);
        true
    }

    /// Predecessors of `state` in insertion order.
    pub fn of(&self, state: StateId) -> &[TransitionRef] {
        self.records.get(&state).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.recorded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded.is_empty()
    }
}
