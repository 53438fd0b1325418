//! Signal history ledger.
//!
//! A turn-indexed log of previously detected signals, handed back to the
//! classifier so repeated mentions enrich instead of re-trigger. The
//! ledger never drives behavior on its own.
//!
//! Entries carry the absolute turn they were detected on; age is computed
//! at read time against the session's turn counter, so nothing is mutated
//! to age an entry.

use chrono::{DateTime, Utc};
use nela_shared::{
    ArbiterConfig, DetectedSignal, Enrichment, HistoryStatus, SessionState, SignalHistoryEntry,
};
use tracing::debug;

/// Apply one turn's worth of ledger maintenance.
///
/// Prunes entries past the retention floor, applies enrichments in place,
/// appends genuinely new signals, and flags entries matching the active
/// machine.
pub fn update_history(
    state: &mut SessionState,
    new_signals: &[DetectedSignal],
    enrichments: &[Enrichment],
    config: &ArbiterConfig,
    now: DateTime<Utc>,
) {
    let current_turn = state.turn;

    // Prune everything older than the retention floor
    let before = state.history.len();
    state
        .history
        .retain(|e| e.age(current_turn) <= config.history_retention_turns);
    if state.history.len() < before {
        debug!(
            pruned = before - state.history.len(),
            turn = current_turn,
            "pruned aged history entries"
        );
    }

    // Enrichments replace the brief of an existing entry, never duplicate
    for enrichment in enrichments {
        if let Some(entry) = state
            .history
            .iter_mut()
            .find(|e| e.matches(enrichment.kind, enrichment.action_target.as_deref()))
        {
            entry.brief = nela_shared::clamp_brief(&enrichment.brief);
        }
    }

    // Append new signals, skipping exact duplicates on kind + target
    let machine_active = state.active_machine.is_some();
    for signal in new_signals {
        let duplicate = state
            .history
            .iter()
            .any(|e| e.matches(signal.kind, signal.action_target.as_deref()));
        if duplicate {
            continue;
        }
        let mut entry = SignalHistoryEntry::new(
            signal.kind,
            current_turn,
            &signal.brief,
            signal.action_target.as_deref(),
            now,
        );
        entry.status = if machine_active {
            HistoryStatus::Deferred
        } else {
            HistoryStatus::Pending
        };
        state.history.push(entry);
    }

    // Entries matching the running machine are in-machine for this turn
    if let Some(active) = &state.active_machine {
        let active_kind = active.kind;
        for entry in &mut state.history {
            if nela_shared::MachineKind::for_signal(entry.kind) == active_kind {
                entry.status = HistoryStatus::InMachine;
            }
        }
    }
}
