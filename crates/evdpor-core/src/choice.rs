//! Decision points as seen by both the host and the explorer.

use crate::ids::{ChoicePointId, Event};

/// A host decision point offering a finite, ordered set of events.
///
/// The host registers it, the explorer may rewrite its values and pre-select
/// the next one, then the host advances it. After advancing, the explorer may
/// still force a different current value before the host consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoicePoint {
    id: ChoicePointId,
    values: Vec<Event>,
    cursor: usize,
    preselected: Option<Event>,
    current: Option<Event>,
    done: bool,
}

impl ChoicePoint {
    pub fn new(id: ChoicePointId, values: Vec<Event>) -> Self {
        Self {
            id,
            values,
            cursor: 0,
            preselected: None,
            current: None,
            done: false,
        }
    }

    pub fn id(&self) -> ChoicePointId {
        self.id
    }

    pub fn values(&self) -> &[Event] {
        &self.values
    }

    /// Replace the candidate values and rewind.
    pub fn set_values(&mut self, values: Vec<Event>) {
        self.values = values;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
        self.preselected = None;
        self.current = None;
        self.done = false;
    }

    /// Make `event` the value produced by the next [`advance`](Self::advance).
    pub fn preselect(&mut self, event: Event) {
        self.preselected = Some(event);
    }

    pub fn has_more(&self) -> bool {
        !self.done && (self.preselected.is_some() || self.cursor < self.values.len())
    }

    /// Move to the next value: the pre-selected one if any, else the next listed.
    pub fn advance(&mut self) -> Option<Event> {
        if self.done {
            return None;
        }
        let next = match self.preselected.take() {
            Some(e) => Some(e),
            None => {
                let e = self.values.get(self.cursor).copied();
                if e.is_some() {
                    self.cursor += 1;
                }
                e
            }
        };
        self.current = next;
        next
    }

    /// Override the value the host is about to consume.
    pub fn force(&mut self, event: Event) {
        self.current = Some(event);
    }

    pub fn current(&self) -> Option<Event> {
        self.current
    }

    pub fn set_done(&mut self) {
        self.done = true;
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// The innermost decision point the host is executing under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActiveChoice {
    /// No decision point has been advanced yet.
    None,
    /// An event decision point.
    Event(ChoicePointId),
    /// A secondary (interval) decision point nested under an event decision point.
    Nested { enclosing: ChoicePointId },
}
