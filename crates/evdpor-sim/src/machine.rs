//! The simulated engine: program state, state interning, snapshots and
//! decision point bookkeeping.

use evdpor_core::{
    Access, ActiveChoice, ChoicePoint, ChoicePointId, Event, Host, ObjectId, StateId,
};
use evdpor_model::{Op, Program};
use std::collections::{HashMap, HashSet};

/// An operation with variables resolved to indices.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Read(usize),
    Write(usize, i64),
    Increment(usize, i64),
    Copy { from: usize, to: usize },
    Nested(Vec<Step>),
}

/// A validated program ready to run.
#[derive(Debug, Clone)]
pub(crate) struct Compiled {
    pub names: Vec<String>,
    pub owners: Vec<ObjectId>,
    pub initial: Vec<i64>,
    pub events: Vec<Vec<Step>>,
}

impl Compiled {
    /// Resolve variable names. The program must already be validated;
    /// unknown names are skipped.
    pub fn new(program: &Program) -> Self {
        let events = program
            .events
            .iter()
            .map(|e| compile_ops(program, &e.ops))
            .collect();
        Self {
            names: program.variables.iter().map(|v| v.name.clone()).collect(),
            owners: program.variables.iter().map(|v| ObjectId(v.owner)).collect(),
            initial: program.variables.iter().map(|v| v.initial).collect(),
            events,
        }
    }

    pub fn all_events(&self) -> Vec<Event> {
        (0..self.events.len() as u32).map(Event::new).collect()
    }
}

fn compile_ops(program: &Program, ops: &[Op]) -> Vec<Step> {
    let idx = |name: &str| program.variable_index(name);
    ops.iter()
        .filter_map(|op| match op {
            Op::Read { var } => idx(var).map(Step::Read),
            Op::Write { var, value } => idx(var).map(|v| Step::Write(v, *value)),
            Op::Increment { var, modulus } => idx(var).map(|v| Step::Increment(v, *modulus)),
            Op::Copy { from, to } => Some(Step::Copy {
                from: idx(from)?,
                to: idx(to)?,
            }),
            Op::Nested { ops } => Some(Step::Nested(compile_ops(program, ops))),
        })
        .collect()
}

/// Restorable engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    values: Vec<i64>,
    depth: usize,
}

/// Host side of the simulation.
#[derive(Debug)]
pub struct Machine {
    names: Vec<String>,
    owners: Vec<ObjectId>,
    values: Vec<i64>,
    depth: usize,
    event_count: usize,
    interned: HashMap<Vec<i64>, StateId>,
    state: StateId,
    is_new: bool,
    active: ActiveChoice,
    closed: HashSet<ChoicePointId>,
    installed: Option<Vec<Event>>,
    next_cp: u64,
}

impl Machine {
    pub(crate) fn new(program: &Compiled) -> Self {
        let mut machine = Self {
            names: program.names.clone(),
            owners: program.owners.clone(),
            values: program.initial.clone(),
            depth: 0,
            event_count: program.events.len(),
            interned: HashMap::new(),
            state: StateId::SPLIT,
            is_new: false,
            active: ActiveChoice::None,
            closed: HashSet::new(),
            installed: None,
            next_cp: 1,
        };
        machine.settle();
        machine
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    /// Number of distinct value vectors seen.
    pub fn states_seen(&self) -> usize {
        self.interned.len()
    }

    /// Intern the current values; state ids start at 1.
    pub(crate) fn settle(&mut self) {
        let next = StateId::new(self.interned.len() as u32 + 1);
        let mut is_new = false;
        let state = *self.interned.entry(self.values.clone()).or_insert_with(|| {
            is_new = true;
            next
        });
        self.state = state;
        self.is_new = is_new;
    }

    pub(crate) fn new_choice_point(&mut self, values: Vec<Event>) -> ChoicePoint {
        let id = ChoicePointId(self.next_cp);
        self.next_cp += 1;
        ChoicePoint::new(id, values)
    }

    pub(crate) fn is_closed(&self, cp: ChoicePointId) -> bool {
        self.closed.contains(&cp)
    }

    pub(crate) fn take_installed(&mut self) -> Option<Vec<Event>> {
        self.installed.take()
    }

    pub(crate) fn set_active(&mut self, active: ActiveChoice) {
        self.active = active;
    }

    pub(crate) fn advance_depth(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn read(&self, var: usize) -> Access {
        Access::read(self.names[var].clone(), self.owners[var])
    }

    pub(crate) fn write(&mut self, var: usize, value: i64) -> Access {
        self.values[var] = value;
        Access::write(self.names[var].clone(), self.owners[var])
    }

    pub(crate) fn value(&self, var: usize) -> i64 {
        self.values[var]
    }
}

impl Host for Machine {
    type Snapshot = Snapshot;

    fn state_id(&self) -> StateId {
        self.state
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn is_new_state(&self) -> bool {
        self.is_new
    }

    fn is_end_state(&self) -> bool {
        self.event_count == 0
    }

    fn capture_snapshot(&self) -> Snapshot {
        Snapshot {
            values: self.values.clone(),
            depth: self.depth,
        }
    }

    fn restore_snapshot(&mut self, snapshot: &Snapshot) {
        self.values.clone_from(&snapshot.values);
        self.depth = snapshot.depth;
        self.settle();
    }

    fn reset_choice(&mut self, schedule: Vec<Event>) {
        self.installed = Some(schedule);
    }

    fn mark_done(&mut self, cp: ChoicePointId) {
        self.closed.insert(cp);
    }

    fn active_choice(&self) -> ActiveChoice {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program() -> Compiled {
        let src = r#"{
            "name": "m",
            "variables": [{ "name": "a", "owner": 3, "initial": 5 }, { "name": "b" }],
            "events": [{ "name": "e", "ops": [
                { "kind": "Copy", "from": "a", "to": "b" },
                { "kind": "Nested", "ops": [{ "kind": "Read", "var": "b" }] }
            ]}]
        }"#;
        Compiled::new(&Program::from_json(src).unwrap())
    }

    #[test]
    fn test_compile_resolves_names() {
        let compiled = program();
        assert_eq!(compiled.owners, vec![ObjectId(3), ObjectId(0)]);
        assert_eq!(compiled.initial, vec![5, 0]);
        assert!(matches!(compiled.events[0][0], Step::Copy { from: 0, to: 1 }));
        assert!(matches!(&compiled.events[0][1], Step::Nested(inner) if inner.len() == 1));
    }

    #[test]
    fn test_states_interned_from_one() {
        let compiled = program();
        let mut m = Machine::new(&compiled);
        assert_eq!(m.state_id(), StateId::new(1));
        assert!(m.is_new_state());

        m.write(1, 5);
        m.settle();
        assert_eq!(m.state_id(), StateId::new(2));

        m.write(1, 0);
        m.settle();
        assert_eq!(m.state_id(), StateId::new(1));
        assert!(!m.is_new_state());
        assert_eq!(m.states_seen(), 2);
    }

    #[test]
    fn test_snapshot_restore() {
        let compiled = program();
        let mut m = Machine::new(&compiled);
        let snap = m.capture_snapshot();
        m.write(0, 9);
        m.advance_depth();
        m.settle();
        m.restore_snapshot(&snap);
        assert_eq!(m.values(), &[5, 0]);
        assert_eq!(m.depth(), 0);
        assert_eq!(m.state_id(), StateId::new(1));
    }

    #[test]
    fn test_choice_points_closed_and_installed() {
        let compiled = program();
        let mut m = Machine::new(&compiled);
        let a = m.new_choice_point(compiled.all_events());
        let b = m.new_choice_point(compiled.all_events());
        assert_ne!(a.id(), b.id());
        m.mark_done(a.id());
        assert!(m.is_closed(a.id()));
        assert!(!m.is_closed(b.id()));

        m.reset_choice(vec![Event::new(0)]);
        assert_eq!(m.take_installed(), Some(vec![Event::new(0)]));
        assert_eq!(m.take_installed(), None);
    }
}
