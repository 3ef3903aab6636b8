//! Reachability graph across all executions.

use crate::execution::TransitionRef;
use crate::ids::StateId;
use std::collections::{BTreeMap, BTreeSet};

/// Persistent map state -> transitions known to be taken from it.
///
/// Tracks the highest state id ever inserted; a state discovered later in
/// the exploration is treated as possibly reachable from an earlier one.
#[derive(Debug, Default)]
pub struct ReachabilityGraph {
    edges: BTreeMap<StateId, BTreeSet<TransitionRef>>,
    highest: Option<StateId>,
}

impl ReachabilityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert. Returns true if the transition was new for `state`.
    pub fn add(&mut self, state: StateId, transition: TransitionRef) -> bool {
        self.highest = Some(self.highest.map_or(state, |h| h.max(state)));
        self.edges.entry(state).or_default().insert(transition)
    }

    /// Union of the transition sets of every state in `[from, highest]`.
    pub fn reachable_from(&self, from: StateId) -> BTreeSet<TransitionRef> {
        self.edges
            .range(from..)
            .flat_map(|(_, set)| set.iter().copied())
            .collect()
    }

    /// Transitions recorded at `state`, or just `fallback` if none were.
    pub fn at_state(&self, state: StateId, fallback: TransitionRef) -> BTreeSet<TransitionRef> {
        match self.edges.get(&state) {
            Some(set) => set.clone(),
            None => BTreeSet::from([fallback]),
        }
    }

    pub fn highest_state(&self) -> Option<StateId> {
        self.highest
    }

    pub fn state_count(&self) -> usize {
        self.edges.len()
    }
}
