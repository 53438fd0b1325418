//! Classifier boundary contract.
//!
//! The classifier is an external LLM call. This boundary is untrusted:
//! every field of its output has a safe default, and the engine runs a
//! repair pass before falling back to the all-defaults bundle.

use crate::machine::MachineKind;
use crate::session::{SessionMode, SignalHistoryEntry};
use crate::signals::{SafetyLevel, SignalBundle, SignalKind};
use serde::{Deserialize, Serialize};

/// One prior dialogue exchange handed to the classifier for context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueTurn {
    pub user: String,
    pub assistant: String,
}

/// Snapshot of conversation state the classifier conditions on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StateSnapshot {
    #[serde(default)]
    pub mode: SessionMode,
    /// Whether a tool flow or investigation is currently running
    #[serde(default)]
    pub tool_flow_active: bool,
    #[serde(default)]
    pub risk_level: SafetyLevel,
}

/// Everything the engine sends to the classifier for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierRequest {
    pub user_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assistant_text: Option<String>,
    /// Last ~3 exchanges, oldest first
    #[serde(default)]
    pub recent_dialogue: Vec<DialogueTurn>,
    #[serde(default)]
    pub history: Vec<SignalHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_machine: Option<MachineKind>,
    #[serde(default)]
    pub snapshot: StateSnapshot,
    /// Optional flow-specific context, opaque to the arbiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_context: Option<serde_json::Value>,
}

/// A brand-new signal the classifier spotted this turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedSignal {
    pub kind: SignalKind,
    /// Short human-readable brief for the history ledger
    #[serde(default)]
    pub brief: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target: Option<String>,
}

/// A replacement brief for an existing history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target: Option<String>,
    pub brief: String,
}

/// Resolution status of a pending question, as judged by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    /// The user's turn did not address the pending question
    #[default]
    Unrelated,
    Resolved,
    /// Addressed but unclear
    Unresolved,
}

/// What kind of pending state a decision refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PendingKind {
    #[default]
    DualTool,
}

/// Deterministic outcome codes for a resolved dual-tool question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecisionCode {
    #[default]
    None,
    /// Run the first tool now, defer the second
    ConfirmBoth,
    /// Swap: run the second tool now, defer the first
    ConfirmReversed,
    OnlyFirst,
    OnlySecond,
    /// Drop both, silently
    DeclineAll,
}

/// Normalized decision signal for a pending question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PendingDecision {
    #[serde(default)]
    pub status: DecisionStatus,
    #[serde(default)]
    pub pending_kind: PendingKind,
    #[serde(default)]
    pub decision_code: DecisionCode,
    #[serde(default)]
    pub confidence: f64,
}

/// The classifier's full answer for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClassifierOutput {
    #[serde(default)]
    pub bundle: SignalBundle,
    #[serde(default)]
    pub new_signals: Vec<DetectedSignal>,
    #[serde(default)]
    pub enrichments: Vec<Enrichment>,
    /// Machine-specific side signals, opaque to the arbiter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_signals: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_decision: Option<PendingDecision>,
}
