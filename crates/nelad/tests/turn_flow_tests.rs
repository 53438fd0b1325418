//! End-to-end arbitration scenarios.
//!
//! Each test feeds scripted classifier outputs through the full turn
//! pipeline and checks which machine runs, what gets parked, and what the
//! user is told.

use chrono::Utc;
use nela_shared::{
    ActiveMachine, AddonKind, ArbiterConfig, ClassifierOutput, DecisionCode, DecisionStatus,
    MachineDirective, MachineKind, PendingDecision, PendingKind, SafetyLevel, SessionState,
    SignalKind, ToolSignal, TraceWriter,
};
use nelad::turn::TurnEngine;

fn engine_with(config: ArbiterConfig) -> (TurnEngine, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let trace = TraceWriter::new(dir.path(), 1024 * 1024);
    (TurnEngine::new(config, trace), dir)
}

fn engine() -> (TurnEngine, tempfile::TempDir) {
    engine_with(ArbiterConfig::default())
}

/// "delete meditation and create running" with the given confidences
fn dual_tool_output(conf_delete: f64, conf_create: f64) -> ClassifierOutput {
    let mut output = ClassifierOutput::default();
    output.bundle.delete_action = ToolSignal::detected(Some("meditation"), conf_delete);
    output.bundle.create_action = ToolSignal::detected(Some("running"), conf_create);
    output
}

fn single_tool_output(kind: SignalKind, target: &str, confidence: f64) -> ClassifierOutput {
    let mut output = ClassifierOutput::default();
    *output.bundle.tool_signal_mut(kind).unwrap() = ToolSignal::detected(Some(target), confidence);
    output
}

fn decision(status: DecisionStatus, code: DecisionCode, confidence: f64) -> PendingDecision {
    PendingDecision {
        status,
        pending_kind: PendingKind::DualTool,
        decision_code: code,
        confidence,
    }
}

#[test]
fn clear_dual_tool_launches_delete_and_defers_create() {
    let (engine, _dir) = engine();
    let mut state = SessionState::default();

    let outcome = engine.process_turn(
        &mut state,
        dual_tool_output(0.9, 0.85),
        "delete meditation and create running",
        "user-1",
        Utc::now(),
    );

    // The stronger half runs this turn, no confirmation asked
    assert_eq!(
        outcome.directive,
        MachineDirective::Start {
            kind: MachineKind::DeleteAction,
            target: Some("meditation".to_string()),
        }
    );
    assert_eq!(outcome.addons.len(), 1);
    assert_eq!(outcome.addons[0].kind, AddonKind::Info);

    // The other half is a single deferred topic
    assert_eq!(state.deferred.len(), 1);
    let topic = &state.deferred[0];
    assert_eq!(topic.machine, MachineKind::CreateAction);
    assert_eq!(topic.action_target.as_deref(), Some("running"));
    assert_eq!(topic.trigger_count, 1);
    assert!(state.pending_dual_tool.is_none());
}

#[test]
fn ambiguous_dual_tool_asks_and_starts_nothing() {
    let (engine, _dir) = engine();
    let mut state = SessionState::default();

    let outcome = engine.process_turn(
        &mut state,
        dual_tool_output(0.6, 0.6),
        "delete meditation and create running",
        "user-1",
        Utc::now(),
    );

    assert_eq!(outcome.directive, MachineDirective::Idle);
    assert_eq!(outcome.addons.len(), 1);
    assert_eq!(outcome.addons[0].kind, AddonKind::Confirmation);
    assert!(state.active_machine.is_none());
    assert!(state.deferred.is_empty());

    let pending = state.pending_dual_tool.as_ref().expect("pending stored");
    assert_eq!(pending.reask_count, 0);
}

#[test]
fn competing_intent_during_active_machine_is_deferred() {
    let (engine, _dir) = engine();
    let mut state = SessionState {
        active_machine: Some(ActiveMachine::new(MachineKind::UpdateAction, Some("running"))),
        ..Default::default()
    };

    let outcome = engine.process_turn(
        &mut state,
        single_tool_output(SignalKind::DeleteAction, "meditation", 0.9),
        "delete meditation",
        "user-1",
        Utc::now(),
    );

    // The running machine keeps the turn; the delete intent is parked
    assert_eq!(outcome.directive, MachineDirective::ContinueActive);
    assert!(outcome.ack_prefix.is_some());
    assert_eq!(state.deferred.len(), 1);
    assert_eq!(state.deferred[0].machine, MachineKind::DeleteAction);
    assert_eq!(
        state.active_machine.as_ref().unwrap(),
        &ActiveMachine::new(MachineKind::UpdateAction, Some("running"))
    );
}

#[test]
fn safety_crisis_interrupts_without_deferral() {
    let (engine, _dir) = engine();
    let mut state = SessionState {
        active_machine: Some(ActiveMachine::new(MachineKind::UpdateAction, Some("running"))),
        ..Default::default()
    };

    let mut output = ClassifierOutput::default();
    output.bundle.safety = SafetyLevel::Crisis;
    let outcome = engine.process_turn(&mut state, output, "worrying message", "user-1", Utc::now());

    assert_eq!(
        outcome.directive,
        MachineDirective::Start {
            kind: MachineKind::Safety,
            target: None,
        }
    );
    assert!(state.deferred.is_empty());
    assert_eq!(state.active_machine.as_ref().unwrap().kind, MachineKind::Safety);
}

#[test]
fn pending_resolution_confirm_both_across_turns() {
    let (engine, _dir) = engine();
    let mut state = SessionState::default();

    engine.process_turn(
        &mut state,
        dual_tool_output(0.6, 0.6),
        "delete meditation and create running",
        "user-1",
        Utc::now(),
    );
    assert!(state.pending_dual_tool.is_some());

    // Next turn: the user confirms both, in the offered order
    let mut output = ClassifierOutput::default();
    output.pending_decision = Some(decision(DecisionStatus::Resolved, DecisionCode::ConfirmBoth, 0.9));
    let outcome = engine.process_turn(&mut state, output, "yes, both", "user-1", Utc::now());

    // Offered order put neither half first by confidence (tie), so the
    // filter-priority half (create) runs and delete is deferred
    assert_eq!(
        outcome.directive,
        MachineDirective::Start {
            kind: MachineKind::CreateAction,
            target: Some("running".to_string()),
        }
    );
    assert!(state.pending_dual_tool.is_none());
    assert_eq!(state.deferred.len(), 1);
    assert_eq!(state.deferred[0].machine, MachineKind::DeleteAction);
}

#[test]
fn pending_resolution_only_second_runs_it_alone() {
    let (engine, _dir) = engine();
    let mut state = SessionState::default();

    engine.process_turn(
        &mut state,
        dual_tool_output(0.6, 0.6),
        "delete meditation and create running",
        "user-1",
        Utc::now(),
    );

    let mut output = ClassifierOutput::default();
    output.pending_decision = Some(decision(DecisionStatus::Resolved, DecisionCode::OnlySecond, 0.8));
    let outcome = engine.process_turn(&mut state, output, "just the second one", "user-1", Utc::now());

    match &outcome.directive {
        MachineDirective::Start { kind, .. } => assert_eq!(*kind, MachineKind::DeleteAction),
        other => panic!("expected a start directive, got {:?}", other),
    }
    assert!(state.deferred.is_empty());
    assert!(state.pending_dual_tool.is_none());
}

#[test]
fn unclear_answer_reasks_once_then_drops() {
    let (engine, _dir) = engine();
    let mut state = SessionState::default();

    engine.process_turn(
        &mut state,
        dual_tool_output(0.6, 0.6),
        "delete meditation and create running",
        "user-1",
        Utc::now(),
    );

    // First unclear answer: re-asked, pending survives
    let mut output = ClassifierOutput::default();
    output.pending_decision = Some(decision(DecisionStatus::Unresolved, DecisionCode::None, 0.9));
    let outcome = engine.process_turn(&mut state, output, "hmm maybe", "user-1", Utc::now());
    assert_eq!(outcome.directive, MachineDirective::Idle);
    assert_eq!(outcome.addons.len(), 1);
    assert_eq!(outcome.addons[0].kind, AddonKind::Confirmation);
    assert_eq!(state.pending_dual_tool.as_ref().unwrap().reask_count, 1);

    // Second unclear answer: dropped, conversation moves on
    let mut output = ClassifierOutput::default();
    output.pending_decision = Some(decision(DecisionStatus::Unresolved, DecisionCode::None, 0.9));
    let outcome = engine.process_turn(&mut state, output, "whatever", "user-1", Utc::now());
    assert!(state.pending_dual_tool.is_none());
    assert_eq!(outcome.directive, MachineDirective::Idle);
    assert!(outcome.addons.is_empty());
}

#[test]
fn dual_tool_during_active_machine_defers_both() {
    let (engine, _dir) = engine();
    let mut state = SessionState {
        active_machine: Some(ActiveMachine::new(MachineKind::TopicExploration, Some("sleep"))),
        ..Default::default()
    };

    let outcome = engine.process_turn(
        &mut state,
        dual_tool_output(0.9, 0.9),
        "delete meditation and create running",
        "user-1",
        Utc::now(),
    );

    assert_eq!(outcome.directive, MachineDirective::ContinueActive);
    assert_eq!(outcome.addons.len(), 1);
    assert_eq!(outcome.addons[0].kind, AddonKind::Notification);
    assert_eq!(state.deferred.len(), 2);
    assert!(state.pending_dual_tool.is_none());
}

#[test]
fn deferred_topic_resurfaces_after_flow_completes() {
    let (engine, _dir) = engine();
    let mut state = SessionState {
        active_machine: Some(ActiveMachine::new(MachineKind::UpdateAction, Some("running"))),
        ..Default::default()
    };

    // Turn 1: competing delete intent gets parked
    engine.process_turn(
        &mut state,
        single_tool_output(SignalKind::DeleteAction, "meditation", 0.9),
        "delete meditation",
        "user-1",
        Utc::now(),
    );
    assert_eq!(state.deferred.len(), 1);

    // Turn 2: the update flow finishes, nothing new is requested
    let mut output = ClassifierOutput::default();
    output.bundle.flow_resolution = nela_shared::FlowResolution::Completed;
    let outcome = engine.process_turn(&mut state, output, "thanks, done", "user-1", Utc::now());

    assert_eq!(
        outcome.directive,
        MachineDirective::Start {
            kind: MachineKind::DeleteAction,
            target: Some("meditation".to_string()),
        }
    );
    assert!(state.deferred.is_empty());
}

#[test]
fn repeat_deferral_keeps_one_topic_and_changes_wording() {
    let (engine, _dir) = engine();
    let mut state = SessionState {
        active_machine: Some(ActiveMachine::new(MachineKind::UpdateAction, Some("running"))),
        ..Default::default()
    };

    let first = engine.process_turn(
        &mut state,
        single_tool_output(SignalKind::DeleteAction, "meditation", 0.9),
        "delete meditation",
        "user-1",
        Utc::now(),
    );
    let second = engine.process_turn(
        &mut state,
        single_tool_output(SignalKind::DeleteAction, "meditation", 0.9),
        "I said delete meditation",
        "user-1",
        Utc::now(),
    );

    assert_eq!(state.deferred.len(), 1);
    assert_eq!(state.deferred[0].trigger_count, 2);
    let first_text = &first.addons[0].text;
    let second_text = &second.addons[0].text;
    assert_ne!(first_text, second_text);
}

#[test]
fn turn_counter_advances_once_per_turn() {
    let (engine, _dir) = engine();
    let mut state = SessionState::default();
    for expected in 1..=3u64 {
        engine.process_turn(&mut state, ClassifierOutput::default(), "hi", "user-1", Utc::now());
        assert_eq!(state.turn, expected);
    }
}

#[test]
fn deferred_cap_evicts_oldest_non_safety() {
    let (engine, _dir) = engine_with(ArbiterConfig {
        max_deferred_topics: 2,
        ..Default::default()
    });
    let mut state = SessionState {
        active_machine: Some(ActiveMachine::new(MachineKind::TopicExploration, Some("sleep"))),
        ..Default::default()
    };

    let plans = [
        (SignalKind::DeleteAction, "meditation"),
        (SignalKind::CreateAction, "running"),
        (SignalKind::UpdateAction, "reading"),
    ];
    for (kind, target) in plans {
        engine.process_turn(
            &mut state,
            single_tool_output(kind, target, 0.9),
            &format!("{} {}", kind.verb(), target),
            "user-1",
            Utc::now(),
        );
    }

    assert_eq!(state.deferred.len(), 2);
    // The first parked topic was the eviction victim
    assert!(state
        .deferred
        .iter()
        .all(|t| t.machine != MachineKind::DeleteAction));
}
