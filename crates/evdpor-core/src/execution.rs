//! Execution traces: transitions taken in one contiguous run plus the
//! read/write sets accumulated per position.

use crate::ids::{ChoicePointId, Event, StateId};
use crate::rwset::ReadWriteSet;
use std::collections::HashMap;
use std::fmt;

/// Index of an execution in the [`Executions`] arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ExecutionId(u32);

impl ExecutionId {
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

/// Non-owning reference to a transition: (execution, position).
///
/// Reachability graph entries, predecessor records and backtrack points all
/// hold these instead of the transition itself.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct TransitionRef {
    pub execution: ExecutionId,
    pub position: usize,
}

impl TransitionRef {
    pub fn new(execution: ExecutionId, position: usize) -> Self {
        Self {
            execution,
            position,
        }
    }
}

impl fmt::Display for TransitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.execution, self.position)
    }
}

/// One event's outcome within an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Event chosen at this position.
    pub event: Event,
    /// State the decision was taken in.
    pub state: StateId,
    /// Ordinal index within the owning execution.
    pub position: usize,
    /// Host decision point that produced this transition, if known.
    pub choice_point: Option<ChoicePointId>,
}

/// An ordered run of transitions.
#[derive(Debug)]
pub struct Execution {
    id: ExecutionId,
    trace: Vec<Transition>,
    rw_sets: HashMap<usize, ReadWriteSet>,
    /// Decision point -> position; `None` once the execution is superseded.
    cp_positions: Option<HashMap<ChoicePointId, usize>>,
    fresh: bool,
    origin: Option<TransitionRef>,
}

impl Execution {
    fn new(id: ExecutionId, origin: Option<TransitionRef>) -> Self {
        Self {
            id,
            trace: Vec::new(),
            rw_sets: HashMap::new(),
            cp_positions: Some(HashMap::new()),
            fresh: true,
            origin,
        }
    }

    pub fn id(&self) -> ExecutionId {
        self.id
    }

    /// Transition in a previous execution whose conflict seeded this one.
    pub fn origin(&self) -> Option<TransitionRef> {
        self.origin
    }

    /// True on the first call only.
    ///
    /// A resumed execution already owns the placeholder transition created
    /// with its backtrack point; the first advanced choice fills it in
    /// instead of appending.
    pub fn is_new(&mut self) -> bool {
        std::mem::replace(&mut self.fresh, false)
    }

    /// Append a transition and return its position.
    pub fn push(&mut self, event: Event, state: StateId, choice_point: Option<ChoicePointId>) -> usize {
        let position = self.trace.len();
        self.trace.push(Transition {
            event,
            state,
            position,
            choice_point,
        });
        position
    }

    pub fn transition(&self, position: usize) -> Option<&Transition> {
        self.trace.get(position)
    }

    pub fn transition_mut(&mut self, position: usize) -> Option<&mut Transition> {
        self.trace.get_mut(position)
    }

    pub fn first(&self) -> Option<&Transition> {
        self.trace.first()
    }

    pub fn last(&self) -> Option<&Transition> {
        self.trace.last()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.trace
    }

    pub fn len(&self) -> usize {
        self.trace.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty()
    }

    pub fn rw_set(&self, position: usize) -> Option<&ReadWriteSet> {
        self.rw_sets.get(&position)
    }

    /// Read/write set at `position`, created empty on first access.
    pub fn rw_set_mut(&mut self, position: usize) -> &mut ReadWriteSet {
        self.rw_sets.entry(position).or_default()
    }

    pub fn map_choice_point(&mut self, cp: ChoicePointId, position: usize) {
        if let Some(map) = self.cp_positions.as_mut() {
            map.insert(cp, position);
        }
    }

    pub fn position_of(&self, cp: ChoicePointId) -> Option<usize> {
        self.cp_positions.as_ref()?.get(&cp).copied()
    }

    /// Drop the decision point map once the execution is superseded.
    /// Read/write sets stay: predecessor records still point at them.
    pub fn release_choice_points(&mut self) {
        self.cp_positions = None;
    }

    pub fn choice_points(&self) -> impl Iterator<Item = ChoicePointId> + '_ {
        self.trace.iter().filter_map(|t| t.choice_point)
    }
}

/// Arena owning every execution of the exploration.
#[derive(Debug, Default)]
pub struct Executions {
    all: Vec<Execution>,
}

impl Executions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, empty execution.
    pub fn start(&mut self, origin: Option<TransitionRef>) -> ExecutionId {
        let id = ExecutionId(self.all.len() as u32);
        self.all.push(Execution::new(id, origin));
        id
    }

    pub fn get(&self, id: ExecutionId) -> Option<&Execution> {
        self.all.get(id.as_usize())
    }

    pub fn get_mut(&mut self, id: ExecutionId) -> Option<&mut Execution> {
        self.all.get_mut(id.as_usize())
    }

    pub fn transition(&self, at: TransitionRef) -> Option<&Transition> {
        self.get(at.execution)?.transition(at.position)
    }

    pub fn rw_set(&self, at: TransitionRef) -> Option<&ReadWriteSet> {
        self.get(at.execution)?.rw_set(at.position)
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }
}
