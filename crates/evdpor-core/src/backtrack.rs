//! Backtrack registry: pending alternate orderings, highest state first.

use crate::execution::TransitionRef;
use crate::ids::{Event, StateId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

/// An alternate event ordering to explore from `state`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktrackPoint {
    pub state: StateId,
    /// Priority list: the conflicting event first, then the rest in reference order.
    pub schedule: Vec<Event>,
    /// The transition whose conflict produced this point.
    pub conflict: TransitionRef,
}

impl BacktrackPoint {
    /// Build the priority list `[first, rest of reference without first]`.
    pub fn new(state: StateId, first: Event, reference: &[Event], conflict: TransitionRef) -> Self {
        let mut schedule = Vec::with_capacity(reference.len().max(1));
        schedule.push(first);
        schedule.extend(reference.iter().copied().filter(|e| *e != first));
        Self {
            state,
            schedule,
            conflict,
        }
    }

    pub fn first_event(&self) -> Option<Event> {
        self.schedule.first().copied()
    }
}

/// Pending backtrack points plus the "already constructed" guard.
///
/// The guard outlives every pop: a (state, first event) pair is admitted
/// once for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct BacktrackRegistry {
    pending: BTreeMap<StateId, VecDeque<BacktrackPoint>>,
    constructed: HashMap<StateId, HashSet<Event>>,
    created: usize,
}

impl BacktrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_constructed(&self, state: StateId, first: Event) -> bool {
        self.constructed
            .get(&state)
            .is_some_and(|events| events.contains(&first))
    }

    /// Queue `point` unless its (state, first event) pair was seen before.
    pub fn add(&mut self, point: BacktrackPoint) -> bool {
        let Some(first) = point.first_event() else {
            return false;
        };
        if !self.constructed.entry(point.state).or_default().insert(first) {
            return false;
        }
        self.created += 1;
        self.pending.entry(point.state).or_default().push_back(point);
        true
    }

    /// Remove the oldest pending point of the highest pending state.
    pub fn pop_highest(&mut self) -> Option<BacktrackPoint> {
        let mut entry = self.pending.last_entry()?;
        let point = entry.get_mut().pop_front();
        if entry.get().is_empty() {
            entry.remove();
        }
        point
    }

    pub fn peek_highest_state(&self) -> Option<StateId> {
        self.pending.keys().next_back().copied()
    }

    pub fn pending_at(&self, state: StateId) -> impl Iterator<Item = &BacktrackPoint> {
        self.pending.get(&state).into_iter().flatten()
    }

    /// Number of queued points across all states.
    pub fn pending_len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total points ever admitted.
    pub fn created(&self) -> usize {
        self.created
    }
}
