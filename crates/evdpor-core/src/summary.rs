//! Main summary: union of every read/write set observed per (state, event).

use crate::ids::{Event, StateId};
use crate::rwset::ReadWriteSet;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Persistent, monotonically growing map (state, event) -> read/write set.
#[derive(Debug, Default)]
pub struct MainSummary {
    entries: HashMap<StateId, BTreeMap<Event, ReadWriteSet>>,
}

impl MainSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `rw` into the entry for (`state`, `event`) and return the residual.
    ///
    /// An empty set is a no-op. The first set stored for a pair is kept whole
    /// and returned whole; afterwards only entries not already present (same
    /// field and owner) come back.
    pub fn update(&mut self, state: StateId, event: Event, rw: ReadWriteSet) -> ReadWriteSet {
        if rw.is_empty() {
            return rw;
        }
        let per_state = self.entries.entry(state).or_default();
        match per_state.get_mut(&event) {
            None => {
                trace!(%state, %event, rw = %rw, "summary entry created");
                per_state.insert(event, rw.clone());
                rw
            }
            Some(recorded) => {
                let residual = rw.union_into(recorded);
                trace!(%state, %event, residual = residual.len(), "summary entry merged");
                residual
            }
        }
    }

    pub fn get(&self, state: StateId, event: Event) -> Option<&ReadWriteSet> {
        self.entries.get(&state)?.get(&event)
    }

    /// Events recorded at `state`, in ascending order.
    pub fn events_at(&self, state: StateId) -> Vec<Event> {
        self.entries
            .get(&state)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_state(&self, state: StateId) -> bool {
        self.entries.contains_key(&state)
    }

    pub fn state_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
