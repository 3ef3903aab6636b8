//! The explorer state machine driven by host callbacks.
//!
//! The host calls in at every lifecycle event: decision point registered,
//! choice advanced, instruction executed, state entered/left/restored. The
//! explorer keeps one current execution, forces a fair event order, records
//! per-event accesses and, when a state match shows the current execution has
//! nothing new to offer, restarts the host at the highest pending backtrack
//! point.

use crate::choice::{ActiveChoice, ChoicePoint};
use crate::conflict::ExplorationContext;
use crate::error::{ExploreError, ExploreResult};
use crate::execution::{ExecutionId, TransitionRef};
use crate::filter::{AcceptAll, FieldFilter};
use crate::host::Host;
use crate::ids::{ChoicePointId, Event, StateId};
use crate::report::{ExecutionStart, SearchSummary, Statistics};
use crate::rwset::Access;
use crate::schedule::Schedule;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Exploration configuration.
#[derive(Debug, Clone)]
pub struct ExploreConfig {
    /// Run the reduction; when off the explorer only counts transitions.
    pub state_reduction: bool,
    /// Append the final summary to this file.
    pub report_path: Option<PathBuf>,
    /// Wall-clock budget in seconds (0 = unlimited).
    pub max_time_secs: u64,
    /// Maximum transitions per execution (0 = unlimited).
    pub max_depth: usize,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            state_reduction: true,
            report_path: None,
            max_time_secs: 0,
            max_depth: 0,
        }
    }
}

/// What the host does after [`Explorer::on_choice_advanced`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Execute the (possibly forced) current value of the decision point.
    Continue,
    /// The current execution ended; the host was restored and given a fresh
    /// decision point carrying the next schedule.
    Restarted,
    /// No backtrack points remain.
    Finished,
}

/// Stateful DPOR explorer. `S` is the host's snapshot type.
pub struct Explorer<S> {
    config: ExploreConfig,
    filter: Box<dyn FieldFilter>,
    ctx: ExplorationContext,
    /// First snapshot taken per state.
    snapshots: HashMap<StateId, S>,

    reducing: bool,
    checked_for_events: bool,
    split_armed: bool,

    schedule: Schedule,
    pending_schedule: Option<Vec<Event>>,
    max_event: Option<Event>,
    events: usize,
    counter: usize,
    current: ExecutionId,
    end_of_execution: bool,

    curr_visited: HashMap<StateId, usize>,
    prev_visited: HashSet<StateId>,
    just_visited: BTreeSet<StateId>,
    state_events: HashMap<StateId, HashSet<Event>>,

    stats: Statistics,
    history: Vec<ExecutionStart>,
    started: Instant,
}

impl<S> Explorer<S> {
    pub fn new(config: ExploreConfig) -> Self {
        Self::with_filter(config, AcceptAll)
    }

    pub fn with_filter(config: ExploreConfig, filter: impl FieldFilter + 'static) -> Self {
        let mut ctx = ExplorationContext::new();
        let current = begin_execution(&mut ctx, None, StateId::SPLIT, Event::default());
        let reducing = config.state_reduction;
        Self {
            config,
            filter: Box::new(filter),
            ctx,
            snapshots: HashMap::new(),
            reducing,
            checked_for_events: false,
            split_armed: false,
            schedule: Schedule::default(),
            pending_schedule: None,
            max_event: None,
            events: 0,
            counter: 0,
            current,
            end_of_execution: false,
            curr_visited: HashMap::new(),
            prev_visited: HashSet::new(),
            just_visited: BTreeSet::new(),
            state_events: HashMap::new(),
            stats: Statistics::default(),
            history: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn config(&self) -> &ExploreConfig {
        &self.config
    }

    /// Whether the reduction is active (false in passthrough mode).
    pub fn is_reducing(&self) -> bool {
        self.reducing
    }

    pub fn context(&self) -> &ExplorationContext {
        &self.ctx
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Every execution started so far, in order.
    pub fn history(&self) -> &[ExecutionStart] {
        &self.history
    }

    pub fn current_execution(&self) -> ExecutionId {
        self.current
    }

    /// Decisions taken in the current execution.
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn schedule(&self) -> &[Event] {
        self.schedule.as_slice()
    }

    pub fn is_end_of_execution(&self) -> bool {
        self.end_of_execution
    }

    /// Transitions recorded at states `>= from` across all executions.
    pub fn reachable_transitions(&self, from: StateId) -> BTreeSet<TransitionRef> {
        self.ctx.rgraph.reachable_from(from)
    }

    /// Transitions recorded at `state`, falling back to the current
    /// execution's last transition for a state never recorded.
    pub fn reachable_transitions_at(&self, state: StateId) -> BTreeSet<TransitionRef> {
        let last = self
            .ctx
            .executions
            .get(self.current)
            .and_then(|e| e.last())
            .map_or(0, |t| t.position);
        self.ctx
            .rgraph
            .at_state(state, TransitionRef::new(self.current, last))
    }

    pub fn on_search_started(&mut self) {
        self.started = Instant::now();
        info!(
            reduction = self.reducing,
            max_time_secs = self.config.max_time_secs,
            max_depth = self.config.max_depth,
            "search started"
        );
    }

    /// Rewrite a freshly registered event decision point.
    ///
    /// The first registration decides the mode: no candidates means the
    /// program has no events and reduction is disabled.
    pub fn on_decision_point_registered(&mut self, cp: &mut ChoicePoint) {
        if !self.checked_for_events {
            self.checked_for_events = true;
            if cp.values().is_empty() {
                self.reducing = false;
                info!("no events offered, state reduction disabled");
            }
        }
        if !self.reducing {
            return;
        }
        if self.end_of_execution {
            cp.set_done();
            return;
        }
        if self.schedule.is_empty() {
            self.schedule = Schedule::new(cp.values().to_vec());
            self.max_event = self.schedule.max_event();
            self.events = self.schedule.len();
            debug!(events = self.events, max_event = ?self.max_event, "event set recorded");
        }
        cp.set_values(self.schedule.to_vec());
        if let Some(event) = self.schedule.at(self.counter) {
            cp.preselect(event);
        }
    }

    /// Handle an advanced event decision point.
    pub fn on_choice_advanced<H>(&mut self, host: &mut H, cp: &mut ChoicePoint) -> ExploreResult<Flow>
    where
        H: Host<Snapshot = S>,
    {
        if !self.reducing {
            self.stats.record(None);
            return Ok(Flow::Continue);
        }
        if let Some(schedule) = self.pending_schedule.take() {
            self.reset_for_new_execution(schedule);
        }
        let Some(expected) = self.schedule.at(self.counter) else {
            return Ok(Flow::Continue);
        };
        if cp.current() != Some(expected) {
            cp.force(expected);
        }

        let state = host.state_id();
        let at = self.setup_transition(state, expected, cp.id())?;
        for &visited in &self.just_visited {
            self.ctx.rgraph.add(visited, at);
        }
        if let Some(exec) = self.ctx.executions.get_mut(self.current) {
            exec.map_choice_point(cp.id(), at.position);
        }
        self.snapshots
            .entry(state)
            .or_insert_with(|| host.capture_snapshot());

        if let Some(prev) = self.counter.checked_sub(1) {
            let reference = self.schedule.to_vec();
            self.ctx
                .on_event_completed(TransitionRef::new(self.current, prev), &reference)?;
        }

        let depth_hit = self.config.max_depth > 0 && self.counter >= self.config.max_depth;
        let flow = if self.counter > 0 && (self.should_terminate()? || depth_hit) {
            if depth_hit {
                debug!(depth = self.counter, "depth bound reached");
            }
            self.explore_next(host, cp)?
        } else {
            self.stats.record(Some((state, expected)));
            Flow::Continue
        };

        for events in self.state_events.values_mut() {
            events.insert(expected);
        }
        self.just_visited.clear();
        self.counter += 1;
        Ok(flow)
    }

    /// The host matched its current state and ends the path there, before
    /// advancing `cp`.
    ///
    /// The last event's accesses are propagated as usual, then the execution
    /// ends the same way a covering cycle ends it. No-op in passthrough mode.
    pub fn on_path_matched<H>(&mut self, host: &mut H, cp: &mut ChoicePoint) -> ExploreResult<Flow>
    where
        H: Host<Snapshot = S>,
    {
        if !self.reducing {
            return Ok(Flow::Continue);
        }
        if let Some(prev) = self.counter.checked_sub(1) {
            let reference = self.schedule.to_vec();
            self.ctx
                .on_event_completed(TransitionRef::new(self.current, prev), &reference)?;
        }
        debug!(state = %host.state_id(), depth = self.counter, "host matched state, execution ends");
        let flow = self.explore_next(host, cp)?;
        self.just_visited.clear();
        self.counter += 1;
        Ok(flow)
    }

    /// Record one executed instruction. `access` is `None` for instructions
    /// that touch no field.
    pub fn on_access_observed<H: Host>(&mut self, host: &H, access: Option<&Access>) -> ExploreResult<()> {
        self.check_timeout()?;
        if !self.reducing || self.end_of_execution {
            return Ok(());
        }
        let Some(access) = access else {
            return Ok(());
        };
        let Some(mut position) = self.counter.checked_sub(1) else {
            return Ok(());
        };
        let Some(exec) = self.ctx.executions.get_mut(self.current) else {
            return Ok(());
        };
        match host.active_choice() {
            ActiveChoice::None => return Ok(()),
            ActiveChoice::Event(_) => {}
            ActiveChoice::Nested { enclosing } => match exec.position_of(enclosing) {
                Some(p) => position = p,
                None => return Ok(()),
            },
        }
        if !self.filter.is_relevant(access) {
            return Ok(());
        }
        trace!(%access, position, "access recorded");
        exec.rw_set_mut(position).record(access);
        Ok(())
    }

    pub fn on_state_entered<H: Host>(&mut self, host: &H) {
        let state = host.state_id();
        let detail = match (host.is_new_state(), host.is_end_state()) {
            (true, false) => "new",
            (false, false) => "visited",
            (true, true) => "new end",
            (false, true) => "visited end",
        };
        debug!(%state, depth = host.depth(), detail, "state advanced");
        if self.reducing {
            self.update_state_info(state);
        }
    }

    pub fn on_state_left<H: Host>(&mut self, host: &H) {
        let state = host.state_id();
        debug!(%state, depth = host.depth(), "state backtracked");
        if self.reducing {
            self.update_state_info(state);
        }
    }

    pub fn on_state_restored<H: Host>(&mut self, host: &H) {
        debug!(state = %host.state_id(), depth = host.depth(), "state restored");
    }

    /// The outer split point advanced.
    ///
    /// The first call only arms it; every later call starts a new round with
    /// fresh per-round trackers. Summaries, the reachability graph, the
    /// predecessor index, snapshots and the backtrack registry carry over.
    pub fn on_split_advanced(&mut self) {
        if !self.reducing {
            return;
        }
        if !self.split_armed {
            self.split_armed = true;
            return;
        }
        info!("split advanced, starting a new round");
        self.schedule = Schedule::default();
        self.pending_schedule = None;
        self.max_event = None;
        self.counter = 0;
        self.curr_visited.clear();
        self.just_visited.clear();
        self.prev_visited.clear();
        self.state_events.clear();
        if let Some(exec) = self.ctx.executions.get_mut(self.current) {
            exec.release_choice_points();
        }
        self.current = begin_execution(&mut self.ctx, None, StateId::SPLIT, Event::default());
        self.end_of_execution = false;
    }

    /// Summarise the search; appends to the report file when configured.
    pub fn on_search_finished(&mut self) -> ExploreResult<SearchSummary> {
        let summary = SearchSummary {
            state_reduction: self.reducing,
            events: self.events,
            transitions: self.stats.transitions(),
            unique_transitions: self.stats.unique_transitions(),
            executions: self.history.len(),
            backtrack_points: self.ctx.registry.created(),
        };
        info!(
            reduction = summary.state_reduction,
            events = summary.events,
            transitions = summary.transitions,
            unique = summary.unique_transitions,
            executions = summary.executions,
            backtrack_points = summary.backtrack_points,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "search finished"
        );
        if let Some(path) = &self.config.report_path {
            summary.append_to(path)?;
        }
        Ok(summary)
    }

    fn check_timeout(&self) -> ExploreResult<()> {
        let limit = self.config.max_time_secs;
        if limit > 0 && self.started.elapsed() >= Duration::from_secs(limit) {
            return Err(ExploreError::Timeout { limit });
        }
        Ok(())
    }

    fn reset_for_new_execution(&mut self, schedule: Vec<Event>) {
        self.counter = 0;
        self.schedule = Schedule::new(schedule);
        self.curr_visited.clear();
        self.state_events.clear();
        self.end_of_execution = false;
    }

    /// Fill the placeholder of a fresh execution or append a transition.
    fn setup_transition(&mut self, state: StateId, event: Event, cp: ChoicePointId) -> ExploreResult<TransitionRef> {
        let current = self.current;
        let unknown = ExploreError::UnknownTransition {
            at: TransitionRef::new(current, self.counter),
        };
        let Some(exec) = self.ctx.executions.get_mut(current) else {
            return Err(unknown);
        };
        if exec.is_new() {
            let Some(first) = exec.transition_mut(0) else {
                return Err(unknown);
            };
            first.event = event;
            first.state = state;
            first.choice_point = Some(cp);
            self.history.push(ExecutionStart {
                execution: current,
                state,
                schedule: self.schedule.to_vec(),
            });
            debug!(execution = %current, %state, schedule = ?self.schedule.as_slice(), "execution started");
            return Ok(TransitionRef::new(current, 0));
        }
        let position = exec.push(event, state, Some(cp));
        if let Some(prev) = self.counter.checked_sub(1) {
            self.ctx
                .predecessors
                .record(state, TransitionRef::new(current, prev));
        }
        debug!(execution = %current, position, %state, %event, "transition");
        Ok(TransitionRef::new(current, position))
    }

    /// Whether the current execution ends at the states just entered.
    ///
    /// Only states already in the main summary are considered. A state seen
    /// in an earlier execution, or one whose accumulated event set covers
    /// every event, ends the execution; a state entered twice in this
    /// execution only triggers the summary replay.
    fn should_terminate(&mut self) -> ExploreResult<bool> {
        let Some(prev) = self.counter.checked_sub(1) else {
            return Ok(false);
        };
        let at = TransitionRef::new(self.current, prev);
        let reference = self.schedule.to_vec();
        let candidates: Vec<StateId> = self.just_visited.iter().copied().collect();
        let mut terminate = false;
        for state in candidates {
            if !self.ctx.summary.contains_state(state) {
                continue;
            }
            if self.prev_visited.contains(&state) || self.covers_all_events(state) {
                debug!(%state, "state matched, execution ends");
                self.ctx.on_state_revisited(state, at, &reference)?;
                terminate = true;
            }
            if self.curr_visited.get(&state).is_some_and(|n| *n > 1) {
                self.ctx.on_state_revisited(state, at, &reference)?;
            }
        }
        Ok(terminate)
    }

    /// Whether every event has been taken since `state` was first entered in
    /// the current execution.
    pub fn covers_all_events(&self, state: StateId) -> bool {
        let (Some(events), Some(max)) = (self.state_events.get(&state), self.max_event) else {
            return false;
        };
        (0..=max.as_u32()).all(|e| events.contains(&Event::new(e)))
    }

    fn update_state_info(&mut self, state: StateId) {
        self.state_events.entry(state).or_default();
        if !self.end_of_execution && self.counter > 1 && !state.is_split() {
            let revisited = self.curr_visited.get(&state).is_some_and(|n| *n > 1)
                || self.prev_visited.contains(&state);
            if revisited {
                self.ctx
                    .predecessors
                    .record(state, TransitionRef::new(self.current, self.counter - 1));
            }
        }
        self.just_visited.insert(state);
        if !self.prev_visited.contains(&state) {
            *self.curr_visited.entry(state).or_insert(0) += 1;
        }
    }

    /// End the current execution and move the host to the next backtrack point.
    fn explore_next<H>(&mut self, host: &mut H, cp: &mut ChoicePoint) -> ExploreResult<Flow>
    where
        H: Host<Snapshot = S>,
    {
        let flow = match self.ctx.registry.pop_highest() {
            Some(point) => {
                let closed: Vec<ChoicePointId> = self
                    .ctx
                    .executions
                    .get(self.current)
                    .map(|e| e.choice_points().collect())
                    .unwrap_or_default();
                for id in closed {
                    host.mark_done(id);
                }
                if host.state_id() != point.state {
                    let snapshot = self
                        .snapshots
                        .get(&point.state)
                        .ok_or(ExploreError::MissingSnapshot { state: point.state })?;
                    host.restore_snapshot(snapshot);
                }
                host.reset_choice(point.schedule.clone());
                if let Some(exec) = self.ctx.executions.get_mut(self.current) {
                    exec.release_choice_points();
                }
                let first = point.first_event().unwrap_or_default();
                self.current = begin_execution(&mut self.ctx, Some(point.conflict), point.state, first);
                info!(
                    state = %point.state,
                    schedule = ?point.schedule,
                    pending = self.ctx.registry.pending_len(),
                    "exploring backtrack point"
                );
                self.pending_schedule = Some(point.schedule);
                Flow::Restarted
            }
            None => {
                cp.set_done();
                debug!("no backtrack points left");
                Flow::Finished
            }
        };
        self.prev_visited.extend(self.curr_visited.keys().copied());
        self.end_of_execution = true;
        Ok(flow)
    }
}

/// Start an execution that already owns its first (placeholder) transition.
fn begin_execution(
    ctx: &mut ExplorationContext,
    origin: Option<TransitionRef>,
    state: StateId,
    event: Event,
) -> ExecutionId {
    let id = ctx.executions.start(origin);
    if let Some(exec) = ctx.executions.get_mut(id) {
        exec.push(event, state, None);
    }
    id
}
