//! Flow context adapter.
//!
//! Answers "is a machine active, which one, on what target" by inspecting
//! the persisted session state, and builds the state snapshot handed to
//! the classifier. Used by both the filter callers and the deferral
//! manager.

use nela_shared::{
    ActiveMachine, MachineKind, SessionState, SignalBundle, SignalKind, StateSnapshot,
};

/// The machine currently owning the conversation, if any
pub fn active_machine(state: &SessionState) -> Option<&ActiveMachine> {
    state.active_machine.as_ref()
}

/// The machine a filtered primary signal would start, with its target
pub fn implied_machine(bundle: &SignalBundle, primary: SignalKind) -> (MachineKind, Option<String>) {
    (
        MachineKind::for_signal(primary),
        bundle.target_hint(primary).map(String::from),
    )
}

/// Whether a new (machine, target) pair is a continuation of the active
/// machine. A missing target hint counts as continuation: "keep going"
/// utterances rarely restate the item.
pub fn is_continuation(
    active: &ActiveMachine,
    new_machine: MachineKind,
    new_target: Option<&str>,
) -> bool {
    if active.kind != new_machine {
        return false;
    }
    match new_target {
        None => true,
        Some(t) => active.target.as_deref() == Some(t),
    }
}

/// Snapshot of conversation state for the classifier prompt
pub fn snapshot(state: &SessionState, bundle_risk: nela_shared::SafetyLevel) -> StateSnapshot {
    StateSnapshot {
        mode: state.mode,
        tool_flow_active: state
            .active_machine
            .as_ref()
            .map(|m| !m.kind.is_safety())
            .unwrap_or(false),
        risk_level: bundle_risk,
    }
}
