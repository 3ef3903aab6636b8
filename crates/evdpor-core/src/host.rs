//! Contract the explorer needs from the host verification engine.

use crate::choice::ActiveChoice;
use crate::ids::{ChoicePointId, Event, StateId};

/// The engine interpreting the program under verification.
///
/// The explorer never owns the host; every callback borrows it for the
/// duration of the call.
pub trait Host {
    /// Opaque, restorable copy of the full engine state.
    type Snapshot;

    fn state_id(&self) -> StateId;

    fn depth(&self) -> usize;

    /// Whether the current state was reached for the first time.
    fn is_new_state(&self) -> bool;

    /// Whether the current state has no further decision points.
    fn is_end_state(&self) -> bool;

    fn capture_snapshot(&self) -> Self::Snapshot;

    fn restore_snapshot(&mut self, snapshot: &Self::Snapshot);

    /// Install a fresh event decision point at the current state that will
    /// offer `schedule`.
    fn reset_choice(&mut self, schedule: Vec<Event>);

    /// Close a decision point so it is never advanced again.
    fn mark_done(&mut self, cp: ChoicePointId);

    fn active_choice(&self) -> ActiveChoice;
}
