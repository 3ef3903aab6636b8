//! Backward conflict analysis and backtrack-point creation.
//!
//! When an event completes, or a state is revisited, its read/write set is
//! pushed backwards along predecessor records. Every step unions the set into
//! the main summary; only the residual (entries the summary did not already
//! hold) keeps travelling. A conflict with a predecessor's own accesses seeds
//! a backtrack point at that predecessor's state, and the predecessor's event
//! becomes the one carried further up (happens-before).

use crate::backtrack::{BacktrackPoint, BacktrackRegistry};
use crate::error::{ExploreError, ExploreResult};
use crate::execution::{Executions, TransitionRef};
use crate::ids::{Event, StateId};
use crate::predecessor::PredecessorIndex;
use crate::rgraph::ReachabilityGraph;
use crate::rwset::ReadWriteSet;
use crate::summary::MainSummary;
use std::collections::HashSet;
use tracing::debug;

/// Structures that persist for the whole exploration.
#[derive(Debug, Default)]
pub struct ExplorationContext {
    pub executions: Executions,
    pub summary: MainSummary,
    pub rgraph: ReachabilityGraph,
    pub predecessors: PredecessorIndex,
    pub registry: BacktrackRegistry,
}

/// One frame of the backward walk.
struct Pending {
    at: TransitionRef,
    event: Event,
    rw: ReadWriteSet,
    /// Check `rw` against the accesses recorded at `at` before merging.
    check: bool,
}

impl ExplorationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Propagate the accesses of the event completed at `at`.
    ///
    /// Returns the number of backtrack points created.
    pub fn on_event_completed(&mut self, at: TransitionRef, reference: &[Event]) -> ExploreResult<usize> {
        let Some(rw) = self.executions.rw_set(at).cloned() else {
            return Ok(0);
        };
        let event = self.state_and_event(at)?.1;
        let mut visited = HashSet::new();
        self.propagate(
            Pending {
                at,
                event,
                rw,
                check: false,
            },
            &mut visited,
            reference,
        )
    }

    /// Replay every event summarised at `state` against the transition at `at`.
    ///
    /// Used when a state is matched: the events previously explored from it
    /// are treated as if they could follow `at` as well.
    pub fn on_state_revisited(
        &mut self,
        state: StateId,
        at: TransitionRef,
        reference: &[Event],
    ) -> ExploreResult<usize> {
        let mut created = 0;
        for event in self.summary.events_at(state) {
            let Some(rw) = self.summary.get(state, event).cloned() else {
                continue;
            };
            let mut visited = HashSet::new();
            created += self.propagate(
                Pending {
                    at,
                    event,
                    rw,
                    check: true,
                },
                &mut visited,
                reference,
            )?;
        }
        Ok(created)
    }

    /// Report and consume one conflict between `rw` (for `event`) and the
    /// accesses recorded at `at`.
    ///
    /// Never a conflict when `at` recorded no accesses or took the same event.
    pub fn take_conflict(&self, event: Event, at: TransitionRef, rw: &mut ReadWriteSet) -> ExploreResult<bool> {
        let (_, taken) = self.state_and_event(at)?;
        let Some(recorded) = self.executions.rw_set(at) else {
            return Ok(false);
        };
        if taken == event {
            return Ok(false);
        }
        Ok(rw.take_conflict(recorded))
    }

    /// Queue `[event, rest of reference]` at the state of `at`, once per
    /// (state, event).
    pub fn create_backtrack_point(
        &mut self,
        event: Event,
        at: TransitionRef,
        reference: &[Event],
    ) -> ExploreResult<bool> {
        let (state, _) = self.state_and_event(at)?;
        if self.registry.is_constructed(state, event) {
            return Ok(false);
        }
        let point = BacktrackPoint::new(state, event, reference, at);
        debug!(%state, schedule = ?point.schedule, conflict = %at, "backtrack point created");
        Ok(self.registry.add(point))
    }

    fn state_and_event(&self, at: TransitionRef) -> ExploreResult<(StateId, Event)> {
        self.executions
            .transition(at)
            .map(|t| (t.state, t.event))
            .ok_or(ExploreError::UnknownTransition { at })
    }

    /// Backward walk over predecessor records with an explicit stack.
    ///
    /// `visited` blocks cycling through transitions already expanded in this
    /// walk. Each predecessor branch gets its own copy of the residual set.
    fn propagate(
        &mut self,
        root: Pending,
        visited: &mut HashSet<TransitionRef>,
        reference: &[Event],
    ) -> ExploreResult<usize> {
        let mut created = 0;
        let mut stack = vec![root];
        while let Some(Pending {
            at,
            mut event,
            mut rw,
            check,
        }) = stack.pop()
        {
            let (state, taken) = self.state_and_event(at)?;
            if check && self.take_conflict(event, at, &mut rw)? {
                if self.create_backtrack_point(event, at, reference)? {
                    created += 1;
                }
                event = taken;
            }
            rw = self.summary.update(state, event, rw);
            if !visited.insert(at) || rw.is_empty() {
                continue;
            }
            for &pred in self.predecessors.of(state).iter().rev() {
                stack.push(Pending {
                    at: pred,
                    event,
                    rw: rw.clone(),
                    check: true,
                });
            }
        }
        Ok(created)
    }
}
