//! Fair round-robin event order.

use crate::ids::Event;

/// The event order in force for the current execution.
///
/// Position `counter` always maps to `order[counter % len]`, so over `k`
/// consecutive decisions each event occurs `floor(k/N)` or `ceil(k/N)` times.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    order: Vec<Event>,
}

impl Schedule {
    pub fn new(order: Vec<Event>) -> Self {
        Self { order }
    }

    /// Ascending order `0..count`.
    pub fn ascending(count: u32) -> Self {
        Self::new((0..count).map(Event::new).collect())
    }

    /// Event expected at decision number `counter`.
    #[inline]
    pub fn at(&self, counter: usize) -> Option<Event> {
        if self.order.is_empty() {
            return None;
        }
        Some(self.order[counter % self.order.len()])
    }

    /// The last listed event; the highest event id for a host-supplied order.
    pub fn max_event(&self) -> Option<Event> {
        self.order.last().copied()
    }

    pub fn as_slice(&self) -> &[Event] {
        &self.order
    }

    pub fn to_vec(&self) -> Vec<Event> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
