//! Deferral manager.
//!
//! When a non-safety machine is already running and a different intent
//! appears, the intent is parked as a deferred topic instead of
//! interrupting the running machine. Safety-crisis signals are never
//! deferred.

use crate::{context, dialogue};
use chrono::{DateTime, Duration, Utc};
use nela_shared::{
    Addon, ArbiterConfig, DeferralReason, DeferredTopic, MachineKind, SessionState, SignalBundle,
    SignalKind, TraceEvent, TraceWriter,
};
use tracing::info;

/// What the deferral pass decided for this turn
#[derive(Debug, Clone, PartialEq)]
pub struct DeferralOutcome {
    pub reason: DeferralReason,
    /// Short lead-in prepended to the running machine's reply
    pub ack_prefix: Option<String>,
    /// Full acknowledgment naming the parked topic
    pub addon: Option<Addon>,
}

impl DeferralOutcome {
    fn pass_through(reason: DeferralReason) -> Self {
        Self {
            reason,
            ack_prefix: None,
            addon: None,
        }
    }

    /// Whether the triggering signal was consumed by a deferral
    pub fn deferred(&self) -> bool {
        self.reason == DeferralReason::Deferred
    }
}

/// Drop deferred topics older than the TTL, tracing each removal once.
pub fn prune_expired(
    state: &mut SessionState,
    config: &ArbiterConfig,
    now: DateTime<Utc>,
    trace: &TraceWriter,
    user_id: &str,
) {
    let ttl = Duration::minutes(config.deferred_topic_ttl_minutes);
    let turn = state.turn;
    let expired: Vec<DeferredTopic> = state
        .deferred
        .iter()
        .filter(|t| now - t.created_at > ttl)
        .cloned()
        .collect();
    if expired.is_empty() {
        return;
    }
    state.deferred.retain(|t| now - t.created_at <= ttl);
    for topic in expired {
        info!(topic_id = %topic.id, machine = %topic.machine, "deferred topic expired");
        trace.emit(
            user_id,
            &TraceEvent::TopicPruned {
                turn,
                topic_id: topic.id,
                machine: topic.machine,
                age_minutes: (now - topic.created_at).num_minutes(),
            },
        );
    }
}

/// Park an intent as a deferred topic, deduplicating on (machine, target).
///
/// Returns true when this is the first time the topic is parked. The
/// outstanding-topics cap is enforced by cancelling the oldest non-safety
/// topic, never by refusing the new one.
pub fn defer_signal(
    state: &mut SessionState,
    machine: MachineKind,
    target: Option<&str>,
    summary: &str,
    config: &ArbiterConfig,
    now: DateTime<Utc>,
    trace: &TraceWriter,
    user_id: &str,
) -> bool {
    let turn = state.turn;
    if let Some(existing) = state.deferred_topic_mut(machine, target) {
        existing.bump(summary);
        return false;
    }

    state
        .deferred
        .push(DeferredTopic::new(machine, target, summary, now));

    while state.deferred.len() > config.max_deferred_topics {
        let Some(victim_id) = state.oldest_non_safety_deferred() else {
            break;
        };
        let Some(pos) = state.deferred.iter().position(|t| t.id == victim_id) else {
            break;
        };
        let victim = state.deferred.remove(pos);
        info!(topic_id = %victim.id, machine = %victim.machine, "deferred topic cancelled for cap");
        trace.emit(
            user_id,
            &TraceEvent::TopicCancelled {
                turn,
                topic_id: victim.id,
                machine: victim.machine,
            },
        );
    }
    true
}

/// Decide whether this turn's filtered primary signal must wait.
///
/// Prunes expired topics, then either passes the turn through to the
/// running machine or parks the new intent and silences its raw signal so
/// the machine is not disturbed.
#[allow(clippy::too_many_arguments)]
pub fn handle_deferral(
    state: &mut SessionState,
    bundle: &mut SignalBundle,
    primary: Option<SignalKind>,
    user_text: &str,
    config: &ArbiterConfig,
    now: DateTime<Utc>,
    trace: &TraceWriter,
    user_id: &str,
) -> DeferralOutcome {
    prune_expired(state, config, now, trace, user_id);

    let turn = state.turn;
    let active = match context::active_machine(state) {
        Some(a) => a.clone(),
        None => {
            emit_decision(trace, user_id, turn, false, DeferralReason::NoActiveMachine, None, None);
            return DeferralOutcome::pass_through(DeferralReason::NoActiveMachine);
        }
    };

    let Some(primary) = primary else {
        emit_decision(
            trace,
            user_id,
            turn,
            false,
            DeferralReason::NoNewMachine,
            Some(&active),
            None,
        );
        return DeferralOutcome::pass_through(DeferralReason::NoNewMachine);
    };
    let (new_machine, new_target) = context::implied_machine(bundle, primary);

    if context::is_continuation(&active, new_machine, new_target.as_deref()) {
        emit_decision(
            trace,
            user_id,
            turn,
            false,
            DeferralReason::Continuation,
            Some(&active),
            Some((new_machine, new_target.as_deref())),
        );
        return DeferralOutcome::pass_through(DeferralReason::Continuation);
    }

    if bundle.safety.is_crisis() {
        emit_decision(
            trace,
            user_id,
            turn,
            false,
            DeferralReason::SafetyInterrupt,
            Some(&active),
            Some((new_machine, new_target.as_deref())),
        );
        return DeferralOutcome::pass_through(DeferralReason::SafetyInterrupt);
    }

    let first_time = defer_signal(
        state,
        new_machine,
        new_target.as_deref(),
        user_text,
        config,
        now,
        trace,
        user_id,
    );
    bundle.clear_signal(primary);

    let seed = dialogue::seed_from_str(&format!(
        "{}:{}",
        new_machine,
        new_target.as_deref().unwrap_or("")
    ));
    let ack = if first_time {
        dialogue::first_deferral_ack(new_machine, new_target.as_deref(), seed)
    } else {
        dialogue::repeat_deferral_ack(new_machine, new_target.as_deref(), seed)
    };

    emit_decision(
        trace,
        user_id,
        turn,
        true,
        DeferralReason::Deferred,
        Some(&active),
        Some((new_machine, new_target.as_deref())),
    );

    DeferralOutcome {
        reason: DeferralReason::Deferred,
        ack_prefix: Some("One moment -".to_string()),
        addon: Some(Addon::notification(ack)),
    }
}

fn emit_decision(
    trace: &TraceWriter,
    user_id: &str,
    turn: u64,
    deferred: bool,
    reason: DeferralReason,
    active: Option<&nela_shared::ActiveMachine>,
    new: Option<(MachineKind, Option<&str>)>,
) {
    trace.emit(
        user_id,
        &TraceEvent::DeferralDecision {
            turn,
            deferred,
            reason,
            active_machine: active.map(|a| a.kind),
            active_target: active.and_then(|a| a.target.clone()),
            new_machine: new.map(|(m, _)| m),
            new_target: new.and_then(|(_, t)| t.map(String::from)),
        },
    );
}
