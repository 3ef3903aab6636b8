//! Explorer callbacks driven by a hand-scripted host.

use evdpor_core::{
    Access, ActiveChoice, ChoicePoint, ChoicePointId, Event, ExploreConfig, ExploreError, Explorer,
    Flow, Host, ObjectId, StateId, TransitionRef,
};
use std::time::Duration;

#[derive(Debug, Default)]
struct ScriptedHost {
    state: u32,
    active: Option<ActiveChoice>,
    resets: Vec<Vec<Event>>,
    done: Vec<ChoicePointId>,
    restored: Vec<u32>,
}

impl Host for ScriptedHost {
    type Snapshot = u32;

    fn state_id(&self) -> StateId {
        StateId::new(self.state)
    }

    fn depth(&self) -> usize {
        0
    }

    fn is_new_state(&self) -> bool {
        false
    }

    fn is_end_state(&self) -> bool {
        false
    }

    fn capture_snapshot(&self) -> u32 {
        self.state
    }

    fn restore_snapshot(&mut self, snapshot: &u32) {
        self.state = *snapshot;
        self.restored.push(*snapshot);
    }

    fn reset_choice(&mut self, schedule: Vec<Event>) {
        self.resets.push(schedule);
    }

    fn mark_done(&mut self, cp: ChoicePointId) {
        self.done.push(cp);
    }

    fn active_choice(&self) -> ActiveChoice {
        self.active.unwrap_or(ActiveChoice::None)
    }
}

fn events(xs: &[u32]) -> Vec<Event> {
    xs.iter().map(|x| Event::new(*x)).collect()
}

/// Register, advance and report one event decision point.
fn decide(ex: &mut Explorer<u32>, host: &mut ScriptedHost, id: u64, offered: &[u32]) -> (ChoicePoint, Flow) {
    let mut cp = ChoicePoint::new(ChoicePointId(id), events(offered));
    ex.on_decision_point_registered(&mut cp);
    cp.advance();
    host.active = Some(ActiveChoice::Event(cp.id()));
    let flow = ex.on_choice_advanced(host, &mut cp).unwrap();
    (cp, flow)
}

/// Execute the chosen event: one access, then enter `next`.
fn execute(ex: &mut Explorer<u32>, host: &mut ScriptedHost, access: Access, next: u32) {
    ex.on_access_observed(host, Some(&access)).unwrap();
    host.state = next;
    ex.on_state_entered(host);
}

#[test]
fn test_covering_cycle_terminates_execution() {
    // S1 -e0-> S2 -e1-> S1 -e0-> S2: S2 has seen both events when re-entered.
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    ex.on_search_started();

    let (cp, flow) = decide(&mut ex, &mut host, 1, &[0, 1]);
    assert_eq!((cp.current(), flow), (Some(Event::new(0)), Flow::Continue));
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);

    let (cp, flow) = decide(&mut ex, &mut host, 2, &[0, 1]);
    assert_eq!((cp.current(), flow), (Some(Event::new(1)), Flow::Continue));
    execute(&mut ex, &mut host, Access::write("b", ObjectId(1)), 1);

    let (_, flow) = decide(&mut ex, &mut host, 3, &[0, 1]);
    assert_eq!(flow, Flow::Continue);
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);

    let (cp, flow) = decide(&mut ex, &mut host, 4, &[0, 1]);
    assert_eq!(flow, Flow::Finished);
    assert!(cp.is_done());
    assert!(ex.is_end_of_execution());
    assert_eq!(ex.statistics().transitions(), 3);
    assert_eq!(ex.history().len(), 1);
    assert_eq!(ex.context().registry.created(), 0);

    let summary = ex.on_search_finished().unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(summary.unique_transitions, 2);
}

#[test]
fn test_registration_after_end_closes_choice_points() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    decide(&mut ex, &mut host, 1, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);
    decide(&mut ex, &mut host, 2, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("b", ObjectId(1)), 1);
    decide(&mut ex, &mut host, 3, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);
    decide(&mut ex, &mut host, 4, &[0, 1]);
    assert!(ex.is_end_of_execution());

    let mut late = ChoicePoint::new(ChoicePointId(5), events(&[0, 1]));
    ex.on_decision_point_registered(&mut late);
    assert!(late.is_done());
}

#[test]
fn test_conflict_restarts_at_backtrack_point() {
    // Both events write f@42; S1 -e0-> S2 -e1-> S1 -e0-> S2.
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    let write_f = || Access::write("f", ObjectId(42));

    decide(&mut ex, &mut host, 1, &[0, 1]);
    execute(&mut ex, &mut host, write_f(), 2);
    let (_, flow) = decide(&mut ex, &mut host, 2, &[0, 1]);
    assert_eq!(flow, Flow::Continue);
    execute(&mut ex, &mut host, write_f(), 1);

    // Completing e1 at S2 conflicts with e0 at S1.
    let (_, flow) = decide(&mut ex, &mut host, 3, &[0, 1]);
    assert_eq!(flow, Flow::Continue);
    assert_eq!(ex.context().registry.created(), 1);
    assert_eq!(ex.context().registry.peek_highest_state(), Some(StateId::new(1)));
    execute(&mut ex, &mut host, write_f(), 2);

    // S2 has now seen both events: the execution ends.
    let (_, flow) = decide(&mut ex, &mut host, 4, &[0, 1]);
    assert_eq!(flow, Flow::Restarted);
    assert_eq!(host.restored, vec![1]);
    assert_eq!(host.resets, vec![events(&[1, 0])]);
    assert_eq!(
        host.done,
        vec![ChoicePointId(1), ChoicePointId(2), ChoicePointId(3), ChoicePointId(4)]
    );

    // The host installs the backtrack decision point and advances it directly.
    let mut cp = ChoicePoint::new(ChoicePointId(5), events(&[1, 0]));
    cp.advance();
    host.active = Some(ActiveChoice::Event(cp.id()));
    let flow = ex.on_choice_advanced(&mut host, &mut cp).unwrap();
    assert_eq!(flow, Flow::Continue);
    assert_eq!(cp.current(), Some(Event::new(1)));
    assert_eq!(ex.counter(), 1);
    assert_eq!(ex.schedule(), &events(&[1, 0])[..]);

    let started = &ex.history()[1];
    assert_eq!(started.state, StateId::new(1));
    assert_eq!(started.schedule, events(&[1, 0]));
}

#[test]
fn test_empty_first_decision_point_disables_reduction() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost::default();
    let (_, flow) = decide(&mut ex, &mut host, 1, &[]);
    assert_eq!(flow, Flow::Continue);
    assert!(!ex.is_reducing());
    decide(&mut ex, &mut host, 2, &[0, 1]);
    assert_eq!(ex.statistics().transitions(), 2);
    assert_eq!(ex.statistics().unique_transitions(), 0);

    let summary = ex.on_search_finished().unwrap();
    assert!(!summary.state_reduction);
    assert_eq!(summary.events, 0);
}

#[test]
fn test_reduction_off_by_config() {
    let config = ExploreConfig {
        state_reduction: false,
        ..ExploreConfig::default()
    };
    let mut ex: Explorer<u32> = Explorer::new(config);
    let mut host = ScriptedHost::default();
    let (cp, _) = decide(&mut ex, &mut host, 1, &[0, 1]);
    assert!(!ex.is_reducing());
    assert_eq!(cp.values(), &events(&[0, 1])[..]);
    assert!(ex.history().is_empty());
}

#[test]
fn test_nested_accesses_attributed_to_enclosing_event() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    decide(&mut ex, &mut host, 1, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);
    decide(&mut ex, &mut host, 2, &[0, 1]);

    host.active = Some(ActiveChoice::Nested {
        enclosing: ChoicePointId(1),
    });
    ex.on_access_observed(&host, Some(&Access::write("n", ObjectId(1))))
        .unwrap();

    let exec = ex
        .context()
        .executions
        .get(ex.current_execution())
        .unwrap();
    assert!(exec.rw_set(0).unwrap().writes_location("n", ObjectId(1)));
    assert!(exec.rw_set(1).is_none());
}

#[test]
fn test_access_before_first_decision_ignored() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let host = ScriptedHost::default();
    ex.on_access_observed(&host, Some(&Access::write("a", ObjectId(1))))
        .unwrap();
    ex.on_access_observed(&host, None).unwrap();
    let exec = ex
        .context()
        .executions
        .get(ex.current_execution())
        .unwrap();
    assert!(exec.rw_set(0).is_none());
}

#[test]
fn test_timeout_is_fatal() {
    let config = ExploreConfig {
        max_time_secs: 1,
        ..ExploreConfig::default()
    };
    let mut ex: Explorer<u32> = Explorer::new(config);
    let host = ScriptedHost::default();
    ex.on_search_started();
    std::thread::sleep(Duration::from_millis(1100));
    let err = ex.on_access_observed(&host, None).unwrap_err();
    assert!(matches!(err, ExploreError::Timeout { limit: 1 }));
}

#[test]
fn test_depth_bound_ends_execution() {
    let config = ExploreConfig {
        max_depth: 2,
        ..ExploreConfig::default()
    };
    let mut ex: Explorer<u32> = Explorer::new(config);
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    decide(&mut ex, &mut host, 1, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);
    decide(&mut ex, &mut host, 2, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("b", ObjectId(1)), 3);
    let (_, flow) = decide(&mut ex, &mut host, 3, &[0, 1]);
    assert_eq!(flow, Flow::Finished);
    assert_eq!(ex.statistics().transitions(), 2);
}

#[test]
fn test_split_round_keeps_summary() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    ex.on_split_advanced();
    decide(&mut ex, &mut host, 1, &[0, 1]);
    execute(&mut ex, &mut host, Access::write("a", ObjectId(1)), 2);
    decide(&mut ex, &mut host, 2, &[0, 1]);
    assert!(ex.context().summary.contains_state(StateId::new(1)));
    let first_round = ex.current_execution();

    ex.on_split_advanced();
    assert_eq!(ex.counter(), 0);
    assert!(ex.schedule().is_empty());
    assert_ne!(ex.current_execution(), first_round);
    assert!(ex.context().summary.contains_state(StateId::new(1)));

    host.state = 1;
    let (cp, flow) = decide(&mut ex, &mut host, 3, &[0, 1]);
    assert_eq!((cp.current(), flow), (Some(Event::new(0)), Flow::Continue));
    assert_eq!(ex.history().len(), 2);
}

#[test]
fn test_report_appended_on_finish() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.txt");
    let config = ExploreConfig {
        report_path: Some(path.clone()),
        ..ExploreConfig::default()
    };
    let mut ex: Explorer<u32> = Explorer::new(config);
    ex.on_search_finished().unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("State reduction mode         : true"));
}

/// Register a decision point, then advance it the host's own way: the
/// pre-selection is dropped and the first listed value is taken.
fn decide_ignoring_preselection(
    ex: &mut Explorer<u32>,
    host: &mut ScriptedHost,
    id: u64,
    offered: &[u32],
) -> (ChoicePoint, Flow) {
    let mut cp = ChoicePoint::new(ChoicePointId(id), events(offered));
    ex.on_decision_point_registered(&mut cp);
    cp.reset();
    cp.advance();
    host.active = Some(ActiveChoice::Event(cp.id()));
    let flow = ex.on_choice_advanced(host, &mut cp).unwrap();
    (cp, flow)
}

#[test]
fn test_host_choice_forced_to_fair_schedule() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    let k = 7;
    let mut counts = [0usize; 3];
    for step in 0..k {
        let (cp, flow) = decide_ignoring_preselection(&mut ex, &mut host, step as u64 + 1, &[0, 1, 2]);
        assert_eq!(flow, Flow::Continue);
        let chosen = cp.current().unwrap();
        assert_eq!(chosen, Event::new((step % 3) as u32));
        counts[chosen.index()] += 1;
        // Fresh state every step: nothing is ever matched.
        host.state = step as u32 + 2;
        ex.on_state_entered(&host);
    }
    for count in counts {
        assert!(count == k / 3 || count == k.div_ceil(3), "unfair count {count}");
    }
    assert_eq!(ex.statistics().transitions(), k);
}

#[test]
fn test_reachable_transitions_through_explorer() {
    let mut ex: Explorer<u32> = Explorer::new(ExploreConfig::default());
    let mut host = ScriptedHost {
        state: 1,
        ..Default::default()
    };
    for step in 0..4u32 {
        decide(&mut ex, &mut host, step as u64 + 1, &[0, 1]);
        host.state = step + 2;
        ex.on_state_entered(&host);
    }
    let x = ex.current_execution();

    // States 2..=4 were entered before decisions 1..=3.
    let from_two = ex.reachable_transitions(StateId::new(2));
    assert_eq!(
        from_two.into_iter().collect::<Vec<_>>(),
        vec![TransitionRef::new(x, 1), TransitionRef::new(x, 2), TransitionRef::new(x, 3)]
    );
    assert_eq!(ex.reachable_transitions(StateId::new(4)).len(), 1);
    assert_eq!(
        ex.reachable_transitions_at(StateId::new(3)).into_iter().collect::<Vec<_>>(),
        vec![TransitionRef::new(x, 2)]
    );

    // The initial state and the state just entered were never recorded:
    // both fall back to the current execution's last transition.
    let last = vec![TransitionRef::new(x, 3)];
    assert_eq!(ex.reachable_transitions_at(StateId::new(1)).into_iter().collect::<Vec<_>>(), last);
    assert_eq!(ex.reachable_transitions_at(StateId::new(5)).into_iter().collect::<Vec<_>>(), last);
}
