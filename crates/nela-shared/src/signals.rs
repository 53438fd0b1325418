//! Turn signal contract.
//!
//! One `SignalBundle` is produced per conversational turn by the classifier
//! and consumed by everything downstream. Every sub-signal has a neutral
//! default so the bundle is fully populated even when the classifier says
//! nothing about a dimension.

use serde::{Deserialize, Serialize};

/// Maximum length of a history brief, enforced on ingest
pub const MAX_BRIEF_LEN: usize = 100;

/// Top-level detected intent categories competing for a turn.
///
/// Priority between competing kinds is a single declarative rank table
/// (`SignalKind::rank`), lower rank wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Open-ended exploration of a topic
    TopicExploration,
    /// Opportunity to dig into the user's deeper motivation
    DeepReasons,
    /// Break an existing action into smaller steps
    Breakdown,
    /// Create a new action
    CreateAction,
    /// Update an existing action
    UpdateAction,
    /// Delete an action
    DeleteAction,
    /// Deactivate (pause) an action
    DeactivateAction,
    /// Reactivate a paused action
    ActivateAction,
    /// Track progress on an action
    TrackProgress,
    /// Periodic checkup conversation
    Checkup,
}

impl SignalKind {
    /// Total priority order between mother signals; lower wins.
    pub fn rank(self) -> u8 {
        match self {
            Self::TopicExploration => 0,
            Self::DeepReasons => 1,
            Self::Breakdown => 2,
            Self::CreateAction => 3,
            Self::UpdateAction => 4,
            Self::DeleteAction => 5,
            Self::DeactivateAction => 6,
            Self::ActivateAction => 7,
            Self::TrackProgress => 8,
            Self::Checkup => 9,
        }
    }

    /// Whether this kind is carried as a tool record in the bundle
    pub fn is_tool(self) -> bool {
        matches!(
            self,
            Self::Breakdown
                | Self::CreateAction
                | Self::UpdateAction
                | Self::DeleteAction
                | Self::DeactivateAction
                | Self::ActivateAction
                | Self::TrackProgress
        )
    }

    /// Whether this kind can form one half of a dual-tool utterance.
    ///
    /// `TrackProgress` is a tool record but co-occurs as commentary, not as
    /// a second operation, so it never pairs.
    pub fn is_dual_eligible(self) -> bool {
        matches!(
            self,
            Self::Breakdown
                | Self::CreateAction
                | Self::UpdateAction
                | Self::DeleteAction
                | Self::DeactivateAction
                | Self::ActivateAction
        )
    }

    /// Human verb used in disambiguation text
    pub fn verb(self) -> &'static str {
        match self {
            Self::TopicExploration => "explore",
            Self::DeepReasons => "reflect on",
            Self::Breakdown => "break down",
            Self::CreateAction => "create",
            Self::UpdateAction => "update",
            Self::DeleteAction => "delete",
            Self::DeactivateAction => "pause",
            Self::ActivateAction => "resume",
            Self::TrackProgress => "track",
            Self::Checkup => "check in on",
        }
    }

    /// All kinds, in rank order
    pub fn all() -> [SignalKind; 10] {
        [
            Self::TopicExploration,
            Self::DeepReasons,
            Self::Breakdown,
            Self::CreateAction,
            Self::UpdateAction,
            Self::DeleteAction,
            Self::DeactivateAction,
            Self::ActivateAction,
            Self::TrackProgress,
            Self::Checkup,
        ]
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TopicExploration => "topic_exploration",
            Self::DeepReasons => "deep_reasons",
            Self::Breakdown => "breakdown",
            Self::CreateAction => "create_action",
            Self::UpdateAction => "update_action",
            Self::DeleteAction => "delete_action",
            Self::DeactivateAction => "deactivate_action",
            Self::ActivateAction => "activate_action",
            Self::TrackProgress => "track_progress",
            Self::Checkup => "checkup",
        };
        write!(f, "{}", s)
    }
}

/// Safety assessment for the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    /// Nothing concerning detected
    #[default]
    None,
    /// Elevated distress, watch but do not interrupt
    Elevated,
    /// Crisis-level signal, always interrupts
    Crisis,
}

impl SafetyLevel {
    pub fn is_crisis(self) -> bool {
        matches!(self, Self::Crisis)
    }
}

/// Coarse classification of what the user is doing this turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryIntent {
    #[default]
    Unknown,
    /// Free conversation, no operational request
    Conversation,
    /// Asking for an operation on their actions
    ActionRequest,
    /// Answering a question the assistant asked
    Response,
}

/// Whether the user is trying to interrupt the running flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionKind {
    #[default]
    None,
    /// Wants to pause the current flow
    Pause,
    /// Wants to abandon the current flow
    Cancel,
}

/// Whether the turn resolves the running flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowResolution {
    #[default]
    None,
    Completed,
    Abandoned,
}

/// Strength of a tool intent as judged by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentStrength {
    #[default]
    None,
    Weak,
    Strong,
}

/// How deep the user wants to go on a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationDepth {
    #[default]
    None,
    Surface,
    Deep,
}

/// Engagement level read off the user's messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngagementLevel {
    #[default]
    Unknown,
    Low,
    Medium,
    High,
}

/// Dashboard preference expressed this turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DashboardIntent {
    #[default]
    None,
    WantsDashboard,
    DeclinesDashboard,
}

/// One tool-family sub-signal (create/update/delete/...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolSignal {
    /// Hard detection flag from the classifier
    #[serde(default)]
    pub detected: bool,
    /// Graded intent strength
    #[serde(default)]
    pub strength: IntentStrength,
    /// Free-text label of the item the intent is about
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_hint: Option<String>,
    /// Classifier confidence in [0, 1]
    #[serde(default)]
    pub confidence: f64,
}

impl ToolSignal {
    /// Build a detected signal (used by tests and reactivation)
    pub fn detected(target_hint: Option<&str>, confidence: f64) -> Self {
        Self {
            detected: true,
            strength: IntentStrength::Strong,
            target_hint: target_hint.map(String::from),
            confidence,
        }
    }

    /// A tool signal counts as detected if its flag is set or its
    /// strength is anything but none.
    pub fn is_detected(&self) -> bool {
        self.detected || self.strength != IntentStrength::None
    }

    /// Reset to the neutral default
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Everything the classifier says about one turn.
///
/// Fully populated by construction: any field the classifier omits
/// deserializes to its neutral default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SignalBundle {
    #[serde(default)]
    pub safety: SafetyLevel,
    #[serde(default)]
    pub primary_intent: PrimaryIntent,
    #[serde(default)]
    pub interruption: InterruptionKind,
    #[serde(default)]
    pub flow_resolution: FlowResolution,

    #[serde(default)]
    pub create_action: ToolSignal,
    #[serde(default)]
    pub update_action: ToolSignal,
    #[serde(default)]
    pub delete_action: ToolSignal,
    #[serde(default)]
    pub deactivate_action: ToolSignal,
    #[serde(default)]
    pub activate_action: ToolSignal,
    #[serde(default)]
    pub breakdown: ToolSignal,
    #[serde(default)]
    pub track_progress: ToolSignal,

    #[serde(default)]
    pub exploration_depth: ExplorationDepth,
    #[serde(default)]
    pub deep_reasons_opportunity: bool,
    #[serde(default)]
    pub deep_reasons_confidence: f64,
    #[serde(default)]
    pub explanation_need: bool,
    #[serde(default)]
    pub research_need: bool,
    #[serde(default)]
    pub engagement: EngagementLevel,
    #[serde(default)]
    pub dashboard: DashboardIntent,
    #[serde(default)]
    pub checkup_requested: bool,
}

impl SignalBundle {
    /// Borrow the tool record for a tool-family kind
    pub fn tool_signal(&self, kind: SignalKind) -> Option<&ToolSignal> {
        match kind {
            SignalKind::CreateAction => Some(&self.create_action),
            SignalKind::UpdateAction => Some(&self.update_action),
            SignalKind::DeleteAction => Some(&self.delete_action),
            SignalKind::DeactivateAction => Some(&self.deactivate_action),
            SignalKind::ActivateAction => Some(&self.activate_action),
            SignalKind::Breakdown => Some(&self.breakdown),
            SignalKind::TrackProgress => Some(&self.track_progress),
            _ => None,
        }
    }

    /// Mutably borrow the tool record for a tool-family kind
    pub fn tool_signal_mut(&mut self, kind: SignalKind) -> Option<&mut ToolSignal> {
        match kind {
            SignalKind::CreateAction => Some(&mut self.create_action),
            SignalKind::UpdateAction => Some(&mut self.update_action),
            SignalKind::DeleteAction => Some(&mut self.delete_action),
            SignalKind::DeactivateAction => Some(&mut self.deactivate_action),
            SignalKind::ActivateAction => Some(&mut self.activate_action),
            SignalKind::Breakdown => Some(&mut self.breakdown),
            SignalKind::TrackProgress => Some(&mut self.track_progress),
            _ => None,
        }
    }

    /// Type-specific "detected" predicate for a mother-signal kind
    pub fn is_detected(&self, kind: SignalKind) -> bool {
        match kind {
            SignalKind::TopicExploration => self.exploration_depth != ExplorationDepth::None,
            SignalKind::DeepReasons => self.deep_reasons_opportunity,
            SignalKind::Checkup => self.checkup_requested,
            tool => self
                .tool_signal(tool)
                .map(ToolSignal::is_detected)
                .unwrap_or(false),
        }
    }

    /// All detected mother-signal candidates, in rank order
    pub fn detected_kinds(&self) -> Vec<SignalKind> {
        SignalKind::all()
            .into_iter()
            .filter(|k| self.is_detected(*k))
            .collect()
    }

    /// Target hint for a kind, if the kind carries one
    pub fn target_hint(&self, kind: SignalKind) -> Option<&str> {
        self.tool_signal(kind)
            .and_then(|t| t.target_hint.as_deref())
    }

    /// Confidence for a kind (tool records and deep-reasons carry one)
    pub fn confidence(&self, kind: SignalKind) -> f64 {
        match kind {
            SignalKind::DeepReasons => self.deep_reasons_confidence,
            _ => self.tool_signal(kind).map(|t| t.confidence).unwrap_or(0.0),
        }
    }

    /// Silence a signal so nothing downstream acts on it this turn
    pub fn clear_signal(&mut self, kind: SignalKind) {
        match kind {
            SignalKind::TopicExploration => self.exploration_depth = ExplorationDepth::None,
            SignalKind::DeepReasons => {
                self.deep_reasons_opportunity = false;
                self.deep_reasons_confidence = 0.0;
            }
            SignalKind::Checkup => self.checkup_requested = false,
            tool => {
                if let Some(t) = self.tool_signal_mut(tool) {
                    t.clear();
                }
            }
        }
    }

    /// Re-arm a tool signal so normal machine-start logic downstream
    /// picks it up verbatim (used after dual-tool resolution).
    pub fn reactivate_tool(&mut self, kind: SignalKind, target_hint: Option<&str>, confidence: f64) {
        if let Some(t) = self.tool_signal_mut(kind) {
            *t = ToolSignal::detected(target_hint, confidence);
        }
    }
}
