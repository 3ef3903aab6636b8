//! Deterministic simulated host for the evdpor explorer.
//!
//! A [`Simulator`] interprets an [`evdpor_model::Program`]: it registers an
//! event decision point at every state, lets the explorer rewrite and force
//! it, executes the chosen event while reporting every field access, and
//! follows the explorer's restarts. In passthrough mode it falls back to a
//! plain stateful depth-first search over all event orders.

mod machine;

pub use machine::{Machine, Snapshot};

use evdpor_core::{
    AcceptAll, ActiveChoice, ChoicePoint, ChoicePointId, ExploreConfig, ExploreError, Explorer,
    FieldFilter, Flow, Host, PatternFilter, SearchSummary,
};
use evdpor_model::{FilterPatterns, ModelError, Program};
use machine::{Compiled, Step};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, info};

/// Simulation error.
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Explore(#[from] ExploreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type SimResult<T> = Result<T, SimError>;

/// Default bound on events executed by one search.
pub const DEFAULT_MAX_TRANSITIONS: usize = 1_000_000;

/// Simulation limits.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Maximum events executed over the whole search (0 = unlimited).
    pub max_transitions: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_transitions: DEFAULT_MAX_TRANSITIONS,
        }
    }
}

/// Result of a simulated search.
#[derive(Debug)]
pub enum RunOutcome {
    /// The explorer ran out of backtrack points (or the baseline search
    /// exhausted the state space).
    Complete { summary: SearchSummary },
    /// Stopped by [`SimConfig::max_transitions`].
    TransitionLimitReached { summary: SearchSummary },
}

impl RunOutcome {
    pub fn summary(&self) -> &SearchSummary {
        match self {
            RunOutcome::Complete { summary } | RunOutcome::TransitionLimitReached { summary } => summary,
        }
    }
}

/// Drives one explorer over one program.
pub struct Simulator {
    program: Compiled,
    machine: Machine,
    explorer: Explorer<Snapshot>,
    config: SimConfig,
    executed: usize,
}

impl Simulator {
    pub fn new(program: &Program, explore: ExploreConfig, config: SimConfig) -> SimResult<Self> {
        program.validate()?;
        let compiled = Compiled::new(program);
        let machine = Machine::new(&compiled);
        let explorer = Explorer::with_filter(explore, build_filter(&program.filter));
        Ok(Self {
            program: compiled,
            machine,
            explorer,
            config,
            executed: 0,
        })
    }

    pub fn explorer(&self) -> &Explorer<Snapshot> {
        &self.explorer
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    /// Events executed so far.
    pub fn executed(&self) -> usize {
        self.executed
    }

    /// Run the search to completion or to the transition limit.
    pub fn run(&mut self) -> SimResult<RunOutcome> {
        self.explorer.on_search_started();
        let mut cp = self.machine.new_choice_point(self.program.all_events());
        self.explorer.on_decision_point_registered(&mut cp);
        let complete = if self.explorer.is_reducing() {
            self.run_reduced(cp)?
        } else {
            info!("running exhaustive baseline search");
            self.run_exhaustive()?
        };
        let summary = self.explorer.on_search_finished()?;
        Ok(if complete {
            RunOutcome::Complete { summary }
        } else {
            RunOutcome::TransitionLimitReached { summary }
        })
    }

    fn limit_reached(&self) -> bool {
        self.config.max_transitions > 0 && self.executed >= self.config.max_transitions
    }

    /// Follow the explorer: one path per execution, restarting on demand.
    /// Returns false when stopped by the transition limit.
    fn run_reduced(&mut self, mut cp: ChoicePoint) -> SimResult<bool> {
        loop {
            if self.machine.is_closed(cp.id()) || !cp.has_more() {
                debug!(cp = %cp.id(), "decision point exhausted");
                return Ok(true);
            }
            if self.limit_reached() {
                return Ok(false);
            }
            let flow = if self.matches_current_state() {
                self.explorer.on_path_matched(&mut self.machine, &mut cp)?
            } else {
                let _ = cp.advance();
                self.machine.set_active(ActiveChoice::Event(cp.id()));
                self.explorer.on_choice_advanced(&mut self.machine, &mut cp)?
            };
            match flow {
                Flow::Finished => return Ok(true),
                Flow::Restarted => {
                    self.explorer.on_state_restored(&self.machine);
                    let schedule = self.machine.take_installed().unwrap_or_default();
                    cp = self.machine.new_choice_point(schedule);
                    continue;
                }
                Flow::Continue => {}
            }
            let Some(event) = cp.current() else {
                return Ok(true);
            };
            self.execute(cp.id(), event.index())?;
            self.explorer.on_state_entered(&self.machine);

            cp = self.machine.new_choice_point(self.program.all_events());
            self.explorer.on_decision_point_registered(&mut cp);
        }
    }

    /// Host-side state matching for states the main summary knows nothing
    /// about (their events touched no tracked field). A revisited state from
    /// which every event has been taken since it was first entered in this
    /// execution ends the path.
    fn matches_current_state(&self) -> bool {
        let state = self.machine.state_id();
        self.explorer.counter() > 0
            && !self.explorer.is_end_of_execution()
            && !self.machine.is_new_state()
            && !self.explorer.context().summary.contains_state(state)
            && self.explorer.covers_all_events(state)
    }

    /// Stateful DFS over every event at every state, for the non-reduced
    /// transition count.
    fn run_exhaustive(&mut self) -> SimResult<bool> {
        let root = self.machine.capture_snapshot();
        let mut seen: HashSet<Vec<i64>> = HashSet::from([self.machine.values().to_vec()]);
        let mut stack = vec![root];
        while let Some(snapshot) = stack.pop() {
            self.machine.restore_snapshot(&snapshot);
            let mut cp = self.machine.new_choice_point(self.program.all_events());
            self.explorer.on_decision_point_registered(&mut cp);
            while let Some(event) = cp.advance() {
                if self.limit_reached() {
                    return Ok(false);
                }
                self.machine.restore_snapshot(&snapshot);
                self.explorer.on_state_left(&self.machine);
                self.machine.set_active(ActiveChoice::Event(cp.id()));
                self.explorer.on_choice_advanced(&mut self.machine, &mut cp)?;
                self.execute(cp.id(), event.index())?;
                self.explorer.on_state_entered(&self.machine);
                if seen.insert(self.machine.values().to_vec()) {
                    stack.push(self.machine.capture_snapshot());
                }
            }
        }
        Ok(true)
    }

    /// Execute one event body and move to the resulting state.
    fn execute(&mut self, cp: ChoicePointId, event: usize) -> SimResult<()> {
        self.executed += 1;
        let steps = self.program.events.get(event).map(Vec::as_slice).unwrap_or(&[]);
        run_steps(&mut self.machine, &mut self.explorer, steps, cp)?;
        self.machine.set_active(ActiveChoice::Event(cp));
        self.machine.advance_depth();
        self.machine.settle();
        Ok(())
    }
}

/// Interpret `steps`, reporting each access to the explorer.
fn run_steps(
    machine: &mut Machine,
    explorer: &mut Explorer<Snapshot>,
    steps: &[Step],
    enclosing: ChoicePointId,
) -> Result<(), ExploreError> {
    for step in steps {
        match step {
            Step::Read(var) => {
                let access = machine.read(*var);
                explorer.on_access_observed(&*machine, Some(&access))?;
            }
            Step::Write(var, value) => {
                let access = machine.write(*var, *value);
                explorer.on_access_observed(&*machine, Some(&access))?;
            }
            Step::Increment(var, modulus) => {
                let read = machine.read(*var);
                explorer.on_access_observed(&*machine, Some(&read))?;
                // Reduce first: the stored value may be i64::MAX.
                let next = (machine.value(*var).rem_euclid(*modulus) + 1) % *modulus;
                let write = machine.write(*var, next);
                explorer.on_access_observed(&*machine, Some(&write))?;
            }
            Step::Copy { from, to } => {
                let read = machine.read(*from);
                explorer.on_access_observed(&*machine, Some(&read))?;
                let value = machine.value(*from);
                let write = machine.write(*to, value);
                explorer.on_access_observed(&*machine, Some(&write))?;
            }
            Step::Nested(inner) => {
                machine.set_active(ActiveChoice::Nested { enclosing });
                explorer.on_access_observed(&*machine, None)?;
                run_steps(machine, explorer, inner, enclosing)?;
                machine.set_active(ActiveChoice::Event(enclosing));
            }
        }
    }
    Ok(())
}

fn build_filter(patterns: &FilterPatterns) -> Box<dyn FieldFilter> {
    if patterns.is_empty() {
        return Box::new(AcceptAll);
    }
    Box::new(
        PatternFilter::new()
            .starts_with(patterns.starts_with.iter().cloned())
            .ends_with(patterns.ends_with.iter().cloned())
            .contains(patterns.contains.iter().cloned())
            .write_starts_with(patterns.write_starts_with.iter().cloned()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn program(src: &str) -> Program {
        Program::from_json(src).unwrap()
    }

    const DISJOINT: &str = r#"{
        "name": "disjoint",
        "variables": [{ "name": "a", "owner": 1 }, { "name": "b", "owner": 2 }],
        "events": [
            { "name": "set_a", "ops": [{ "kind": "Write", "var": "a", "value": 1 }] },
            { "name": "set_b", "ops": [{ "kind": "Write", "var": "b", "value": 1 }] }
        ]
    }"#;

    #[test]
    fn test_no_events_runs_baseline() {
        let p = program(r#"{ "name": "empty", "variables": [], "events": [] }"#);
        let mut sim = Simulator::new(&p, ExploreConfig::default(), SimConfig::default()).unwrap();
        let outcome = sim.run().unwrap();
        assert!(matches!(outcome, RunOutcome::Complete { .. }));
        assert!(!outcome.summary().state_reduction);
        assert_eq!(outcome.summary().transitions, 0);
    }

    #[test]
    fn test_copy_reports_read_then_write() {
        let p = program(
            r#"{ "name": "copy", "variables": [{ "name": "src", "initial": 4 }, { "name": "dst" }],
                 "events": [{ "name": "c", "ops": [{ "kind": "Copy", "from": "src", "to": "dst" }] }] }"#,
        );
        let mut sim = Simulator::new(&p, ExploreConfig::default(), SimConfig::default()).unwrap();
        sim.run().unwrap();
        assert_eq!(sim.machine().values(), &[4, 4]);
        let exec = sim.explorer().context().executions.get(sim.explorer().current_execution()).unwrap();
        let rw = exec.rw_set(0).unwrap();
        assert_eq!(rw.reads().count(), 1);
        assert_eq!(rw.writes().count(), 1);
    }

    #[test]
    fn test_filter_patterns_drop_accesses() {
        let p = program(
            r#"{ "name": "filtered", "variables": [{ "name": "log_count" }, { "name": "x" }],
                 "events": [
                    { "name": "a", "ops": [{ "kind": "Increment", "var": "log_count", "modulus": 2 },
                                           { "kind": "Write", "var": "x", "value": 1 }] },
                    { "name": "b", "ops": [{ "kind": "Increment", "var": "log_count", "modulus": 2 },
                                           { "kind": "Write", "var": "x", "value": 1 }] }
                 ],
                 "filter": { "starts_with": ["log_"] } }"#,
        );
        let mut sim = Simulator::new(&p, ExploreConfig::default(), SimConfig::default()).unwrap();
        let outcome = sim.run().unwrap();
        assert!(matches!(outcome, RunOutcome::Complete { .. }));
        let exec = sim.explorer().context().executions.get(sim.explorer().current_execution()).unwrap();
        let rw = exec.rw_set(0).unwrap();
        assert!(rw.reads().all(|(field, _)| field != "log_count"));
        assert!(rw.writes().all(|(field, _)| field != "log_count"));
        assert!(rw.writes_location("x", evdpor_core::ObjectId(0)));
    }

    #[test]
    fn test_transition_limit() {
        let p = program(DISJOINT);
        let config = SimConfig { max_transitions: 1 };
        let mut sim = Simulator::new(&p, ExploreConfig::default(), config).unwrap();
        let outcome = sim.run().unwrap();
        assert!(matches!(outcome, RunOutcome::TransitionLimitReached { .. }));
        assert_eq!(sim.executed(), 1);
    }

    #[test]
    fn test_increment_reduces_before_adding() {
        let p = program(
            r#"{ "name": "wrap", "variables": [{ "name": "c", "initial": 9223372036854775807 }],
                 "events": [{ "name": "tick", "ops": [{ "kind": "Increment", "var": "c", "modulus": 3 }] }] }"#,
        );
        let compiled = Compiled::new(&p);
        let mut machine = Machine::new(&compiled);
        let mut explorer: Explorer<Snapshot> = Explorer::new(ExploreConfig::default());
        run_steps(&mut machine, &mut explorer, &compiled.events[0], ChoicePointId(1)).unwrap();
        // i64::MAX = 3 * k + 1
        assert_eq!(machine.values(), &[2]);
    }

    #[test]
    fn test_default_config_is_bounded() {
        assert_eq!(SimConfig::default().max_transitions, DEFAULT_MAX_TRANSITIONS);
    }
}
