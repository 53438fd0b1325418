//! Dual-tool resolver.
//!
//! A two-step sub-protocol (detect, then confirm-or-launch) for utterances
//! that plainly request two distinct tool operations at once ("delete
//! meditation and create running"). The two are never mixed: one runs now,
//! the other is deferred, or the user is asked once.

use crate::{deferral, dialogue};
use chrono::{DateTime, Duration, Utc};
use nela_shared::{
    Addon, ArbiterConfig, DecisionCode, DecisionStatus, PendingDecision, PendingDualTool,
    PendingKind, SessionState, SignalBundle, SignalKind, ToolCandidate, TraceEvent, TraceWriter,
};
use tracing::{debug, info};

/// Two distinct tool operations detected in one utterance.
///
/// `tool_a` is the half the arbiter would run first: the higher-confidence
/// one, falling back to filter priority on a tie. The `confirm_reversed`
/// decision code lets the user swap the guess.
#[derive(Debug, Clone, PartialEq)]
pub struct DualToolIntent {
    pub tool_a: ToolCandidate,
    pub tool_b: ToolCandidate,
}

/// How a dual-tool turn was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DualToolOutcomeKind {
    /// Tool A launches this turn, tool B is parked
    LaunchPrimaryDeferSecondary,
    /// Unclear; the user is asked to confirm order or pick one
    AskConfirmation,
    /// A machine is running; both tools are parked
    DeferBoth,
}

impl DualToolOutcomeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LaunchPrimaryDeferSecondary => "launch_primary_defer_secondary",
            Self::AskConfirmation => "ask_confirmation",
            Self::DeferBoth => "defer_both",
        }
    }
}

/// Result of the detect step for this turn
#[derive(Debug, Clone, PartialEq)]
pub struct DualToolResult {
    pub outcome: DualToolOutcomeKind,
    pub addon: Addon,
}

/// Build the intent pair from the filter's primary + secondary tool.
pub fn extract_dual_tool(
    bundle: &SignalBundle,
    primary: SignalKind,
    secondary: SignalKind,
) -> DualToolIntent {
    let first = ToolCandidate::new(primary, bundle.target_hint(primary), bundle.confidence(primary));
    let second = ToolCandidate::new(
        secondary,
        bundle.target_hint(secondary),
        bundle.confidence(secondary),
    );
    if second.confidence > first.confidence {
        DualToolIntent {
            tool_a: second,
            tool_b: first,
        }
    } else {
        DualToolIntent {
            tool_a: first,
            tool_b: second,
        }
    }
}

/// A dual-tool utterance is clear enough to auto-launch iff both
/// confidences reach the threshold, the two verbs differ, and at least one
/// half has an identifiable target.
pub fn is_dual_tool_clear(intent: &DualToolIntent, config: &ArbiterConfig) -> bool {
    intent.tool_a.confidence >= config.dual_tool_clear_confidence
        && intent.tool_b.confidence >= config.dual_tool_clear_confidence
        && intent.tool_a.verb != intent.tool_b.verb
        && (intent.tool_a.target_hint.is_some() || intent.tool_b.target_hint.is_some())
}

/// Settle a freshly detected dual-tool utterance.
///
/// With no machine active: clear pairs launch tool A and park tool B with
/// no confirmation; ambiguous pairs persist a pending question. With a
/// machine active both halves are parked unconditionally - the user cannot
/// act on either right now anyway.
#[allow(clippy::too_many_arguments)]
pub fn handle_dual_tool(
    state: &mut SessionState,
    bundle: &mut SignalBundle,
    intent: DualToolIntent,
    user_text: &str,
    config: &ArbiterConfig,
    now: DateTime<Utc>,
    trace: &TraceWriter,
    user_id: &str,
) -> DualToolResult {
    let seed = dialogue::seed_from_str(user_text);

    let result = if let Some(active) = state.active_machine.clone() {
        for tool in [&intent.tool_a, &intent.tool_b] {
            deferral::defer_signal(
                state,
                nela_shared::MachineKind::for_signal(tool.kind),
                tool.target_hint.as_deref(),
                user_text,
                config,
                now,
                trace,
                user_id,
            );
        }
        bundle.clear_signal(intent.tool_a.kind);
        bundle.clear_signal(intent.tool_b.kind);
        DualToolResult {
            outcome: DualToolOutcomeKind::DeferBoth,
            addon: Addon::notification(dialogue::dual_tool_notification(
                active.kind,
                active.target.as_deref(),
                &intent.tool_a,
                &intent.tool_b,
                seed,
            )),
        }
    } else if is_dual_tool_clear(&intent, config) {
        deferral::defer_signal(
            state,
            nela_shared::MachineKind::for_signal(intent.tool_b.kind),
            intent.tool_b.target_hint.as_deref(),
            user_text,
            config,
            now,
            trace,
            user_id,
        );
        bundle.clear_signal(intent.tool_b.kind);
        info!(
            launch = %intent.tool_a.kind,
            deferred = %intent.tool_b.kind,
            "clear dual-tool, launching first half"
        );
        DualToolResult {
            outcome: DualToolOutcomeKind::LaunchPrimaryDeferSecondary,
            addon: Addon::info(dialogue::dual_tool_info(&intent.tool_a, &intent.tool_b, seed)),
        }
    } else {
        bundle.clear_signal(intent.tool_a.kind);
        bundle.clear_signal(intent.tool_b.kind);
        let question = dialogue::dual_tool_confirmation(&intent.tool_a, &intent.tool_b, seed);
        state.pending_dual_tool = Some(PendingDualTool::new(
            intent.tool_a.clone(),
            intent.tool_b.clone(),
            state.turn,
            now,
        ));
        DualToolResult {
            outcome: DualToolOutcomeKind::AskConfirmation,
            addon: Addon::confirmation(question),
        }
    };

    trace.emit(
        user_id,
        &TraceEvent::DualToolOutcome {
            turn: state.turn,
            outcome: result.outcome.as_str().to_string(),
            tool_a: intent.tool_a.kind,
            tool_b: intent.tool_b.kind,
        },
    );
    result
}

fn pending_expired(pending: &PendingDualTool, state_turn: u64, config: &ArbiterConfig, now: DateTime<Utc>) -> bool {
    if pending.turn_created > 0 {
        state_turn.saturating_sub(pending.turn_created) > config.dual_tool_ttl_turns
    } else {
        // Legacy blobs without a turn counter fall back to wall-clock age
        now - pending.created_at > Duration::minutes(config.dual_tool_ttl_minutes)
    }
}

/// Resolve an outstanding pending dual-tool question against this turn's
/// normalized decision signal.
///
/// Expired entries are dropped first. A resolved decision reactivates the
/// chosen half's raw signal in the bundle and clears the other so it
/// cannot also fire. Unclear answers re-ask once; a second unclear answer
/// drops the pending state so the conversation is never blocked.
pub fn resolve_pending(
    state: &mut SessionState,
    bundle: &mut SignalBundle,
    decision: Option<&PendingDecision>,
    config: &ArbiterConfig,
    now: DateTime<Utc>,
    trace: &TraceWriter,
    user_id: &str,
) -> Option<Addon> {
    let pending = state.pending_dual_tool.clone()?;
    let turn = state.turn;

    if pending_expired(&pending, turn, config, now) {
        debug!("pending dual-tool expired, dropping");
        state.pending_dual_tool = None;
        emit_outcome(trace, user_id, turn, "expired", &pending);
        return None;
    }

    let clear_decision = decision.filter(|d| {
        d.status == DecisionStatus::Resolved
            && d.pending_kind == PendingKind::DualTool
            && d.confidence >= config.decision_confidence_floor
            && d.decision_code != DecisionCode::None
    });

    let Some(decision) = clear_decision else {
        if pending.reask_count == 0 {
            let mut bumped = pending.clone();
            bumped.reask_count = 1;
            state.pending_dual_tool = Some(bumped);
            emit_outcome(trace, user_id, turn, "reask", &pending);
            return Some(Addon::confirmation(dialogue::dual_tool_reask(
                &pending.tool_a,
                &pending.tool_b,
            )));
        }
        // Second unclear answer: drop, never retry indefinitely
        state.pending_dual_tool = None;
        emit_outcome(trace, user_id, turn, "dropped", &pending);
        return None;
    };

    state.pending_dual_tool = None;
    let (run_now, defer_later) = match decision.decision_code {
        DecisionCode::ConfirmBoth => (Some(&pending.tool_a), Some(&pending.tool_b)),
        DecisionCode::ConfirmReversed => (Some(&pending.tool_b), Some(&pending.tool_a)),
        DecisionCode::OnlyFirst => (Some(&pending.tool_a), None),
        DecisionCode::OnlySecond => (Some(&pending.tool_b), None),
        DecisionCode::DeclineAll | DecisionCode::None => (None, None),
    };

    if let Some(tool) = run_now {
        bundle.reactivate_tool(tool.kind, tool.target_hint.as_deref(), tool.confidence);
    }
    for tool in [&pending.tool_a, &pending.tool_b] {
        if run_now.map(|t| t.kind) != Some(tool.kind) {
            bundle.clear_signal(tool.kind);
        }
    }
    if let Some(tool) = defer_later {
        deferral::defer_signal(
            state,
            nela_shared::MachineKind::for_signal(tool.kind),
            tool.target_hint.as_deref(),
            &tool.describe(),
            config,
            now,
            trace,
            user_id,
        );
    }

    let outcome = match decision.decision_code {
        DecisionCode::ConfirmBoth => "confirm_both",
        DecisionCode::ConfirmReversed => "confirm_reversed",
        DecisionCode::OnlyFirst => "only_first",
        DecisionCode::OnlySecond => "only_second",
        DecisionCode::DeclineAll | DecisionCode::None => "decline_all",
    };
    emit_outcome(trace, user_id, turn, outcome, &pending);

    match (run_now, defer_later) {
        (Some(run), Some(postponed)) => Some(Addon::info(dialogue::dual_tool_info(
            run,
            postponed,
            dialogue::seed_from_str(&run.describe()),
        ))),
        _ => None,
    }
}

fn emit_outcome(
    trace: &TraceWriter,
    user_id: &str,
    turn: u64,
    outcome: &str,
    pending: &PendingDualTool,
) {
    trace.emit(
        user_id,
        &TraceEvent::DualToolOutcome {
            turn,
            outcome: outcome.to_string(),
            tool_a: pending.tool_a.kind,
            tool_b: pending.tool_b.kind,
        },
    );
}
