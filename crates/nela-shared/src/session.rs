//! Per-user session state blob.
//!
//! One explicit tagged structure with named fields, mutated by exactly one
//! turn-processing pass at a time. The caller guarantees single writer per
//! turn per user; the arbiter does not enforce it.

use crate::machine::{ActiveMachine, MachineKind};
use crate::signals::{SignalKind, MAX_BRIEF_LEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    /// Seen, nothing decided yet
    #[default]
    Pending,
    /// The active machine matches this entry's kind
    InMachine,
    /// Parked behind a running machine
    Deferred,
    /// Handled, kept only for classifier context
    Resolved,
}

/// One previously detected signal, kept so the classifier does not
/// re-trigger on repeated mentions.
///
/// Entries store the absolute turn they were detected on; relative age is
/// computed at read time against the session's turn counter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalHistoryEntry {
    pub kind: SignalKind,
    /// Absolute turn index the signal was first seen on
    pub detected_turn: u64,
    /// Short human-readable summary, clamped to 100 chars
    pub brief: String,
    #[serde(default)]
    pub status: HistoryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target: Option<String>,
    pub detected_at: DateTime<Utc>,
}

impl SignalHistoryEntry {
    pub fn new(
        kind: SignalKind,
        turn: u64,
        brief: &str,
        action_target: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            detected_turn: turn,
            brief: clamp_brief(brief),
            status: HistoryStatus::Pending,
            action_target: action_target.map(String::from),
            detected_at: now,
        }
    }

    /// Turns since detection, 0 = this turn
    pub fn age(&self, current_turn: u64) -> u64 {
        current_turn.saturating_sub(self.detected_turn)
    }

    /// Same identity = same kind and same target; a missing target only
    /// matches another missing target.
    pub fn matches(&self, kind: SignalKind, target: Option<&str>) -> bool {
        self.kind == kind && self.action_target.as_deref() == target
    }
}

/// Clamp a brief to the contract length on a char boundary
pub fn clamp_brief(brief: &str) -> String {
    if brief.chars().count() <= MAX_BRIEF_LEN {
        brief.to_string()
    } else {
        brief.chars().take(MAX_BRIEF_LEN).collect()
    }
}

/// An intent recognized but postponed because another machine owns the
/// conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredTopic {
    pub id: Uuid,
    pub machine: MachineKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_target: Option<String>,
    pub summary: String,
    /// How many turns have re-raised this topic
    pub trigger_count: u32,
    pub created_at: DateTime<Utc>,
}

impl DeferredTopic {
    pub fn new(
        machine: MachineKind,
        action_target: Option<&str>,
        summary: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            machine,
            action_target: action_target.map(String::from),
            summary: clamp_brief(summary),
            trigger_count: 1,
            created_at: now,
        }
    }

    pub fn matches(&self, machine: MachineKind, target: Option<&str>) -> bool {
        self.machine == machine && self.action_target.as_deref() == target
    }

    /// Same topic raised again: bump the count, replace the summary
    pub fn bump(&mut self, summary: &str) {
        self.trigger_count += 1;
        self.summary = clamp_brief(summary);
    }
}

/// One half of a dual-tool utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCandidate {
    pub kind: SignalKind,
    /// Verb label shown to the user ("delete", "create", ...)
    pub verb: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hint: Option<String>,
    pub confidence: f64,
}

impl ToolCandidate {
    pub fn new(kind: SignalKind, target_hint: Option<&str>, confidence: f64) -> Self {
        Self {
            kind,
            verb: kind.verb().to_string(),
            target_hint: target_hint.map(String::from),
            confidence,
        }
    }

    /// "delete meditation" / "create an action"
    pub fn describe(&self) -> String {
        match &self.target_hint {
            Some(t) => format!("{} {}", self.verb, t),
            None => format!("{} an action", self.verb),
        }
    }
}

/// An unresolved two-tool utterance awaiting the user's confirmation.
///
/// `reask_count` never exceeds 1: a second unclear answer terminates the
/// pending state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDualTool {
    pub tool_a: ToolCandidate,
    pub tool_b: ToolCandidate,
    /// Absolute turn the pending state was created on (0 = unknown,
    /// timestamp fallback applies)
    #[serde(default)]
    pub turn_created: u64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub reask_count: u8,
}

impl PendingDualTool {
    pub fn new(tool_a: ToolCandidate, tool_b: ToolCandidate, turn: u64, now: DateTime<Utc>) -> Self {
        Self {
            tool_a,
            tool_b,
            turn_created: turn,
            created_at: now,
            reask_count: 0,
        }
    }
}

/// Conversation mode snapshot shared with the classifier prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    Chat,
    Onboarding,
    Checkup,
}

/// The per-user state blob the store persists between turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SessionState {
    /// Monotonic turn counter, incremented once per processed turn
    #[serde(default)]
    pub turn: u64,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_machine: Option<ActiveMachine>,
    #[serde(default)]
    pub history: Vec<SignalHistoryEntry>,
    #[serde(default)]
    pub deferred: Vec<DeferredTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_dual_tool: Option<PendingDualTool>,
}

impl SessionState {
    /// Find a deferred topic by identity
    pub fn deferred_topic_mut(
        &mut self,
        machine: MachineKind,
        target: Option<&str>,
    ) -> Option<&mut DeferredTopic> {
        self.deferred.iter_mut().find(|t| t.matches(machine, target))
    }

    /// Oldest non-safety deferred topic, for cap eviction
    pub fn oldest_non_safety_deferred(&self) -> Option<Uuid> {
        self.deferred
            .iter()
            .filter(|t| !t.machine.is_safety())
            .min_by_key(|t| t.created_at)
            .map(|t| t.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_age_is_relative_to_turn_counter() {
        let entry = SignalHistoryEntry::new(
            SignalKind::CreateAction,
            5,
            "wants a running habit",
            Some("running"),
            Utc::now(),
        );
        assert_eq!(entry.age(5), 0);
        assert_eq!(entry.age(8), 3);
        // Counter resets must not underflow
        assert_eq!(entry.age(3), 0);
    }

    #[test]
    fn test_brief_clamped_to_contract_length() {
        let long = "x".repeat(300);
        let entry =
            SignalHistoryEntry::new(SignalKind::Checkup, 0, &long, None, Utc::now());
        assert_eq!(entry.brief.chars().count(), MAX_BRIEF_LEN);
    }

    #[test]
    fn test_missing_target_matches_only_missing_target() {
        let entry = SignalHistoryEntry::new(SignalKind::DeleteAction, 0, "b", None, Utc::now());
        assert!(entry.matches(SignalKind::DeleteAction, None));
        assert!(!entry.matches(SignalKind::DeleteAction, Some("meditation")));
    }

    #[test]
    fn test_deferred_bump_replaces_summary() {
        let mut topic =
            DeferredTopic::new(MachineKind::CreateAction, Some("running"), "first", Utc::now());
        topic.bump("second mention");
        assert_eq!(topic.trigger_count, 2);
        assert_eq!(topic.summary, "second mention");
    }

    #[test]
    fn test_oldest_non_safety_skips_safety_topics() {
        let mut state = SessionState::default();
        let old = Utc::now() - chrono::Duration::minutes(10);
        let mut safety = DeferredTopic::new(MachineKind::Safety, None, "crisis", old);
        safety.created_at = old - chrono::Duration::minutes(10);
        let victim = DeferredTopic::new(MachineKind::CreateAction, Some("x"), "s", old);
        let victim_id = victim.id;
        state.deferred.push(safety);
        state.deferred.push(victim);
        state
            .deferred
            .push(DeferredTopic::new(MachineKind::UpdateAction, None, "s", Utc::now()));
        assert_eq!(state.oldest_non_safety_deferred(), Some(victim_id));
    }
}
