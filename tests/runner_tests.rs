//! Tests for the Stage Runner
//!
//! These tests verify:
//! - Stages run in order and stop at the first failure
//! - Precondition misses issue no action for the failing stage
//! - Dispatch failures are reported separately from precondition misses
//! - Delays, waits and stage gaps reach the sleeper

use stagepilot::{
    ActionDispatcher, BuiltinWorkflow, Coordinates, Delay, DispatchedAction, DryRunDispatcher,
    PositionCollection, RunState, Sleeper, StageDescriptor, StagePilotError, StageRunner,
    UiAction,
};
use std::time::Duration;

/// Records every requested sleep instead of sleeping
#[derive(Default)]
struct RecordingSleeper {
    sleeps: Vec<Duration>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
    }
}

/// Fails every click, accepts everything else
struct BrokenMouse;

impl ActionDispatcher for BrokenMouse {
    fn click(&mut self, _at: Coordinates) -> anyhow::Result<()> {
        anyhow::bail!("no display")
    }

    fn double_click(&mut self, _at: Coordinates) -> anyhow::Result<()> {
        anyhow::bail!("no display")
    }

    fn type_text(&mut self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn positions(set: &[(&str, i32, i32)], unset: &[&str]) -> PositionCollection {
    let names = set.iter().map(|(n, _, _)| *n).chain(unset.iter().copied());
    let mut collection = PositionCollection::from_schema(names);
    for (name, x, y) in set {
        collection
            .set(name, Coordinates::new(*x, *y).unwrap())
            .unwrap();
    }
    collection
}

fn click_stage(name: &str, target: &str) -> StageDescriptor {
    StageDescriptor::new(name).step(UiAction::click(target), Delay::Default)
}

const DELAY: Duration = Duration::from_millis(500);

#[test]
fn test_single_stage_clicks_and_waits() {
    let stages = vec![
        StageDescriptor::new("only")
            .requires("A")
            .step(UiAction::click("A"), Delay::Default),
    ];
    let positions = positions(&[("A", 10, 10)], &[]);
    let mut dispatcher = DryRunDispatcher::new();
    let mut sleeper = RecordingSleeper::default();

    let report = StageRunner::new(&stages)
        .execute(&positions, DELAY, &mut dispatcher, &mut sleeper)
        .expect("Should succeed");

    assert_eq!(
        dispatcher.dispatched(),
        &[DispatchedAction::Click(Coordinates { x: 10, y: 10 })]
    );
    assert_eq!(sleeper.sleeps, vec![DELAY]);
    assert_eq!(report.completed_stages, vec!["only".to_string()]);
    assert_eq!(report.actions_dispatched, 1);
    assert_eq!(report.history.last(), Some(&RunState::Completed));
}

#[test]
fn test_unmet_precondition_stops_at_stage_k() {
    // Stage 3 of 5 targets an unset position
    let stages = vec![
        click_stage("s1", "p1"),
        click_stage("s2", "p2"),
        click_stage("s3", "missing"),
        click_stage("s4", "p1"),
        click_stage("s5", "p2"),
    ];
    let positions = positions(&[("p1", 1, 1), ("p2", 2, 2)], &["missing"]);
    let mut dispatcher = DryRunDispatcher::new();
    let mut sleeper = RecordingSleeper::default();

    let failure = StageRunner::new(&stages)
        .execute(&positions, DELAY, &mut dispatcher, &mut sleeper)
        .unwrap_err();

    assert_eq!(failure.index, 2);
    assert_eq!(failure.stage, "s3");
    assert_eq!(failure.completed_stages, vec!["s1".to_string(), "s2".to_string()]);
    assert!(failure.is_precondition());
    assert!(matches!(
        failure.source,
        StagePilotError::PreconditionNotMet { ref position, .. } if position == "missing"
    ));
    // Only stages 1 and 2 dispatched anything
    assert_eq!(
        dispatcher.dispatched(),
        &[
            DispatchedAction::Click(Coordinates { x: 1, y: 1 }),
            DispatchedAction::Click(Coordinates { x: 2, y: 2 }),
        ]
    );
}

#[test]
fn test_declared_requirement_checked_before_body() {
    // Body would only type, but the stage declares a requirement
    let stages = vec![StageDescriptor::new("typing")
        .requires("field")
        .step(UiAction::type_text("hello"), Delay::Default)];
    let positions = positions(&[], &["field"]);
    let mut dispatcher = DryRunDispatcher::new();

    let failure = StageRunner::new(&stages)
        .execute(&positions, DELAY, &mut dispatcher, &mut RecordingSleeper::default())
        .unwrap_err();

    assert!(failure.is_precondition());
    assert!(dispatcher.dispatched().is_empty());
}

#[test]
fn test_dispatch_failure_is_distinguished() {
    let stages = vec![
        StageDescriptor::new("type").step(UiAction::type_text("x"), Delay::Immediate),
        click_stage("click", "p"),
        click_stage("never", "p"),
    ];
    let positions = positions(&[("p", 5, 5)], &[]);

    let failure = StageRunner::new(&stages)
        .execute(&positions, DELAY, &mut BrokenMouse, &mut RecordingSleeper::default())
        .unwrap_err();

    assert_eq!(failure.stage, "click");
    assert!(!failure.is_precondition());
    match failure.source {
        StagePilotError::ActionDispatch { stage, reason, .. } => {
            assert_eq!(stage, "click");
            assert!(reason.contains("no display"));
        }
        other => panic!("Expected ActionDispatch, got {:?}", other),
    }
}

#[test]
fn test_delays_waits_and_stage_gap() {
    let stages = vec![
        StageDescriptor::new("first")
            .step(UiAction::click("p"), Delay::DefaultPlus(2.0))
            .step(UiAction::wait(30.0), Delay::Immediate),
        StageDescriptor::new("second").step(UiAction::type_text("s\n"), Delay::Fixed(0.25)),
    ];
    let positions = positions(&[("p", 1, 2)], &[]);
    let mut sleeper = RecordingSleeper::default();

    let report = StageRunner::new(&stages)
        .with_stage_gap(Some(Delay::Default))
        .execute(&positions, DELAY, &mut DryRunDispatcher::new(), &mut sleeper)
        .expect("Should succeed");

    assert_eq!(
        sleeper.sleeps,
        vec![
            DELAY + Duration::from_secs(2),
            Duration::from_secs(30),
            Duration::ZERO,
            DELAY, // gap between the two stages only
            Duration::from_millis(250),
        ]
    );
    assert_eq!(report.actions_dispatched, 2);
    assert_eq!(report.waited, sleeper.sleeps.iter().sum::<Duration>());
}

#[test]
fn test_wait_totals_saturate_instead_of_overflowing() {
    let stages = vec![
        StageDescriptor::new("first").step(UiAction::click("p"), Delay::DefaultPlus(5.0)),
        StageDescriptor::new("second").step(UiAction::wait(10.0), Delay::Default),
    ];
    let positions = positions(&[("p", 1, 1)], &[]);
    let mut sleeper = RecordingSleeper::default();

    let report = StageRunner::new(&stages)
        .with_stage_gap(Some(Delay::Default))
        .execute(&positions, Duration::MAX, &mut DryRunDispatcher::new(), &mut sleeper)
        .expect("Should succeed");

    assert_eq!(sleeper.sleeps[0], Duration::MAX);
    assert_eq!(report.waited, Duration::MAX);
}

#[test]
fn test_every_execute_restarts_at_stage_zero() {
    let stages = vec![click_stage("a", "p"), click_stage("b", "p")];
    let positions = positions(&[("p", 3, 3)], &[]);
    let runner = StageRunner::new(&stages);
    let mut dispatcher = DryRunDispatcher::new();

    runner
        .execute(&positions, DELAY, &mut dispatcher, &mut RecordingSleeper::default())
        .unwrap();
    let report = runner
        .execute(&positions, DELAY, &mut dispatcher, &mut RecordingSleeper::default())
        .unwrap();

    assert_eq!(report.completed_stages, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(dispatcher.dispatched().len(), 4);
}

#[test]
fn test_message_sender_sequence() {
    let definition = BuiltinWorkflow::MessageSender.definition();
    let positions = positions(&[("icon_position", 120, 340)], &[]);
    let mut dispatcher = DryRunDispatcher::new();
    let mut sleeper = RecordingSleeper::default();

    StageRunner::new(&definition.stages)
        .execute(&positions, Duration::from_secs(1), &mut dispatcher, &mut sleeper)
        .expect("Should succeed");

    assert_eq!(
        dispatcher.dispatched(),
        &[
            DispatchedAction::DoubleClick(Coordinates { x: 120, y: 340 }),
            DispatchedAction::TypeText("1\n".into()),
            DispatchedAction::TypeText("s\n".into()),
        ]
    );
    assert_eq!(
        sleeper.sleeps,
        vec![
            Duration::from_secs(3),
            Duration::from_secs(1),
            Duration::ZERO
        ]
    );
}
