//! Turn pipeline.
//!
//! One synchronous pass per user turn: ledger update, pending dual-tool
//! resolution, mother-signal filtering, then either the dual-tool path or
//! the deferral path. Exactly one machine directive comes out; parked
//! intents go into the session state; add-ons tell the user what will
//! happen and when.

use crate::deferral::{self, DeferralOutcome};
use crate::dual_tool::{self, DualToolOutcomeKind};
use crate::{context, dialogue, filter, history};
use chrono::{DateTime, Utc};
use nela_shared::{
    ActiveMachine, Addon, ArbiterConfig, ClassifierOutput, ClassifierRequest, DeferralReason,
    DialogueTurn, FlowResolution, MachineDirective, MachineKind, SessionState, TraceEvent,
    TraceWriter,
};
use tracing::info;

/// Everything one processed turn hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub directive: MachineDirective,
    /// Short lead-in for the reply, when a competing intent was parked
    pub ack_prefix: Option<String>,
    pub addons: Vec<Addon>,
}

/// The arbitration engine: one instance per process, stateless between
/// turns apart from the trace sink.
pub struct TurnEngine {
    config: ArbiterConfig,
    trace: TraceWriter,
}

impl TurnEngine {
    pub fn new(config: ArbiterConfig, trace: TraceWriter) -> Self {
        Self { config, trace }
    }

    /// Assemble the classifier request for the upcoming turn
    pub fn build_request(
        &self,
        state: &SessionState,
        user_text: &str,
        last_assistant_text: Option<&str>,
        recent_dialogue: Vec<DialogueTurn>,
    ) -> ClassifierRequest {
        ClassifierRequest {
            user_text: user_text.to_string(),
            last_assistant_text: last_assistant_text.map(String::from),
            recent_dialogue,
            history: state.history.clone(),
            active_machine: state.active_machine.as_ref().map(|m| m.kind),
            snapshot: context::snapshot(state, nela_shared::SafetyLevel::None),
            flow_context: None,
        }
    }

    /// Process one turn against the already-obtained classifier output.
    ///
    /// Pure over `(state, output, user_text)` apart from trace emission;
    /// the caller persists the mutated state afterwards.
    pub fn process_turn(
        &self,
        state: &mut SessionState,
        output: ClassifierOutput,
        user_text: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> TurnOutcome {
        state.turn += 1;
        let mut bundle = output.bundle;
        let mut addons = vec![];

        if !output.new_signals.is_empty() {
            self.trace.emit(
                user_id,
                &TraceEvent::NewSignalsDetected {
                    turn: state.turn,
                    kinds: output.new_signals.iter().map(|s| s.kind).collect(),
                },
            );
        }
        history::update_history(
            state,
            &output.new_signals,
            &output.enrichments,
            &self.config,
            now,
        );

        if state.pending_dual_tool.is_some() {
            if let Some(addon) = dual_tool::resolve_pending(
                state,
                &mut bundle,
                output.pending_decision.as_ref(),
                &self.config,
                now,
                &self.trace,
                user_id,
            ) {
                addons.push(addon);
            }
        }

        // A finished flow releases the conversation before routing
        if matches!(
            bundle.flow_resolution,
            FlowResolution::Completed | FlowResolution::Abandoned
        ) && state.active_machine.is_some()
        {
            info!(resolution = ?bundle.flow_resolution, "active machine released");
            state.active_machine = None;
        }

        // Crisis interrupts whatever is running, with no deferral
        if bundle.safety.is_crisis() {
            if let Some(active) = &state.active_machine {
                self.trace.emit(
                    user_id,
                    &TraceEvent::DeferralDecision {
                        turn: state.turn,
                        deferred: false,
                        reason: DeferralReason::SafetyInterrupt,
                        active_machine: Some(active.kind),
                        active_target: active.target.clone(),
                        new_machine: Some(MachineKind::Safety),
                        new_target: None,
                    },
                );
            }
            state.active_machine = Some(ActiveMachine::new(MachineKind::Safety, None));
            return TurnOutcome {
                directive: MachineDirective::Start {
                    kind: MachineKind::Safety,
                    target: None,
                },
                ack_prefix: None,
                addons,
            };
        }

        let outcome = filter::filter_signals(&bundle);

        // Exactly two tool intents compete: the dual-tool sub-protocol
        if let (Some(primary), Some(secondary)) = (outcome.primary, outcome.secondary_tool) {
            let intent = dual_tool::extract_dual_tool(&bundle, primary, secondary);
            let launch = intent.tool_a.clone();
            let result = dual_tool::handle_dual_tool(
                state,
                &mut bundle,
                intent,
                user_text,
                &self.config,
                now,
                &self.trace,
                user_id,
            );
            let directive = match result.outcome {
                DualToolOutcomeKind::LaunchPrimaryDeferSecondary => {
                    self.start_machine(state, MachineKind::for_signal(launch.kind), launch.target_hint.as_deref())
                }
                DualToolOutcomeKind::AskConfirmation => MachineDirective::Idle,
                DualToolOutcomeKind::DeferBoth => MachineDirective::ContinueActive,
            };
            addons.push(result.addon);
            return TurnOutcome {
                directive,
                ack_prefix: None,
                addons,
            };
        }

        // Single (or no) intent: the deferral manager decides
        let deferral_outcome = deferral::handle_deferral(
            state,
            &mut bundle,
            outcome.primary,
            user_text,
            &self.config,
            now,
            &self.trace,
            user_id,
        );
        self.settle_single_intent(state, &bundle, outcome.primary, deferral_outcome, addons)
    }

    fn settle_single_intent(
        &self,
        state: &mut SessionState,
        bundle: &nela_shared::SignalBundle,
        primary: Option<nela_shared::SignalKind>,
        deferral_outcome: DeferralOutcome,
        mut addons: Vec<Addon>,
    ) -> TurnOutcome {
        if let Some(addon) = deferral_outcome.addon.clone() {
            addons.push(addon);
        }

        let directive = match deferral_outcome.reason {
            DeferralReason::Deferred
            | DeferralReason::NoNewMachine
            | DeferralReason::Continuation => MachineDirective::ContinueActive,
            DeferralReason::SafetyInterrupt => MachineDirective::ContinueActive,
            DeferralReason::NoActiveMachine => match primary {
                Some(kind) => {
                    let (machine, target) = context::implied_machine(bundle, kind);
                    self.start_machine(state, machine, target.as_deref())
                }
                None => self.resurface_or_idle(state, &mut addons),
            },
        };

        TurnOutcome {
            directive,
            ack_prefix: deferral_outcome.ack_prefix,
            addons,
        }
    }

    fn start_machine(
        &self,
        state: &mut SessionState,
        machine: MachineKind,
        target: Option<&str>,
    ) -> MachineDirective {
        info!(machine = %machine, target = target.unwrap_or("-"), "starting machine");
        state.active_machine = Some(ActiveMachine::new(machine, target));
        MachineDirective::Start {
            kind: machine,
            target: target.map(String::from),
        }
    }

    /// With nothing to do this turn, bring back the oldest parked topic
    fn resurface_or_idle(&self, state: &mut SessionState, addons: &mut Vec<Addon>) -> MachineDirective {
        // Never hijack a turn while a confirmation question is outstanding
        if state.pending_dual_tool.is_some() {
            return MachineDirective::Idle;
        }
        let oldest = state
            .deferred
            .iter()
            .enumerate()
            .min_by_key(|(_, t)| t.created_at)
            .map(|(i, _)| i);
        let Some(pos) = oldest else {
            return MachineDirective::Idle;
        };
        let topic = state.deferred.remove(pos);
        info!(machine = %topic.machine, "resurfacing deferred topic");
        let seed = dialogue::seed_from_str(&format!(
            "{}:{}",
            topic.machine,
            topic.action_target.as_deref().unwrap_or("")
        ));
        addons.push(Addon::info(dialogue::resurface_note(
            topic.machine,
            topic.action_target.as_deref(),
            seed,
        )));
        self.start_machine(state, topic.machine, topic.action_target.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nela_shared::{SafetyLevel, SignalKind, ToolSignal};

    fn engine() -> (TurnEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let trace = TraceWriter::new(dir.path(), 1024 * 1024);
        (TurnEngine::new(ArbiterConfig::default(), trace), dir)
    }

    fn output_with_delete(target: &str, confidence: f64) -> ClassifierOutput {
        let mut output = ClassifierOutput::default();
        output.bundle.delete_action = ToolSignal::detected(Some(target), confidence);
        output
    }

    #[test]
    fn test_idle_turn_produces_idle_directive() {
        let (engine, _dir) = engine();
        let mut state = SessionState::default();
        let outcome = engine.process_turn(
            &mut state,
            ClassifierOutput::default(),
            "how are you?",
            "u",
            Utc::now(),
        );
        assert_eq!(outcome.directive, MachineDirective::Idle);
        assert!(outcome.addons.is_empty());
        assert_eq!(state.turn, 1);
    }

    #[test]
    fn test_single_intent_starts_machine() {
        let (engine, _dir) = engine();
        let mut state = SessionState::default();
        let outcome = engine.process_turn(
            &mut state,
            output_with_delete("meditation", 0.9),
            "delete meditation",
            "u",
            Utc::now(),
        );
        assert_eq!(
            outcome.directive,
            MachineDirective::Start {
                kind: MachineKind::DeleteAction,
                target: Some("meditation".to_string()),
            }
        );
        assert_eq!(
            state.active_machine.as_ref().unwrap().kind,
            MachineKind::DeleteAction
        );
    }

    #[test]
    fn test_crisis_interrupts_running_machine() {
        let (engine, _dir) = engine();
        let mut state = SessionState {
            active_machine: Some(ActiveMachine::new(MachineKind::UpdateAction, Some("running"))),
            ..Default::default()
        };
        let mut output = ClassifierOutput::default();
        output.bundle.safety = SafetyLevel::Crisis;
        let outcome = engine.process_turn(&mut state, output, "dark message", "u", Utc::now());
        assert_eq!(
            outcome.directive,
            MachineDirective::Start {
                kind: MachineKind::Safety,
                target: None,
            }
        );
        assert!(state.deferred.is_empty());
    }

    #[test]
    fn test_completed_flow_releases_machine_for_new_intent() {
        let (engine, _dir) = engine();
        let mut state = SessionState {
            active_machine: Some(ActiveMachine::new(MachineKind::CreateAction, Some("running"))),
            ..Default::default()
        };
        let mut output = output_with_delete("meditation", 0.9);
        output.bundle.flow_resolution = FlowResolution::Completed;
        let outcome = engine.process_turn(
            &mut state,
            output,
            "done, now delete meditation",
            "u",
            Utc::now(),
        );
        assert_eq!(
            outcome.directive,
            MachineDirective::Start {
                kind: MachineKind::DeleteAction,
                target: Some("meditation".to_string()),
            }
        );
    }

    #[test]
    fn test_quiet_turn_resurfaces_deferred_topic() {
        let (engine, _dir) = engine();
        let mut state = SessionState::default();
        state.deferred.push(nela_shared::DeferredTopic::new(
            MachineKind::DeleteAction,
            Some("meditation"),
            "wants meditation gone",
            Utc::now(),
        ));
        let outcome =
            engine.process_turn(&mut state, ClassifierOutput::default(), "ok", "u", Utc::now());
        assert_eq!(
            outcome.directive,
            MachineDirective::Start {
                kind: MachineKind::DeleteAction,
                target: Some("meditation".to_string()),
            }
        );
        assert!(state.deferred.is_empty());
        assert_eq!(outcome.addons.len(), 1);
    }
}
