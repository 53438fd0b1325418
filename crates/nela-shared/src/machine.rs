//! Intent machine kinds and the directive handed to the machine runner.
//!
//! A machine is a multi-turn stateful conversation flow. The arbiter only
//! needs its kind and current target; flow content lives elsewhere.

use crate::signals::SignalKind;
use serde::{Deserialize, Serialize};

/// Closed set of intent machines the arbiter can route to.
///
/// "Same machine kind" comparisons are exhaustive matches on this enum,
/// never string equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineKind {
    CreateAction,
    UpdateAction,
    DeleteAction,
    DeactivateAction,
    ActivateAction,
    BreakdownAction,
    TrackProgress,
    TopicExploration,
    DeepReasons,
    Checkup,
    /// Crisis handling; the only machine allowed to interrupt another
    Safety,
}

impl MachineKind {
    /// The machine a mother signal would start
    pub fn for_signal(kind: SignalKind) -> Self {
        match kind {
            SignalKind::CreateAction => Self::CreateAction,
            SignalKind::UpdateAction => Self::UpdateAction,
            SignalKind::DeleteAction => Self::DeleteAction,
            SignalKind::DeactivateAction => Self::DeactivateAction,
            SignalKind::ActivateAction => Self::ActivateAction,
            SignalKind::Breakdown => Self::BreakdownAction,
            SignalKind::TrackProgress => Self::TrackProgress,
            SignalKind::TopicExploration => Self::TopicExploration,
            SignalKind::DeepReasons => Self::DeepReasons,
            SignalKind::Checkup => Self::Checkup,
        }
    }

    pub fn is_safety(self) -> bool {
        matches!(self, Self::Safety)
    }

    /// Human label used in add-on text ("I'm helping you update ...")
    pub fn label(self) -> &'static str {
        match self {
            Self::CreateAction => "creating an action",
            Self::UpdateAction => "updating an action",
            Self::DeleteAction => "deleting an action",
            Self::DeactivateAction => "pausing an action",
            Self::ActivateAction => "resuming an action",
            Self::BreakdownAction => "breaking down an action",
            Self::TrackProgress => "tracking progress",
            Self::TopicExploration => "exploring a topic",
            Self::DeepReasons => "reflecting on your reasons",
            Self::Checkup => "checking in",
            Self::Safety => "making sure you're okay",
        }
    }
}

impl std::fmt::Display for MachineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CreateAction => "create_action",
            Self::UpdateAction => "update_action",
            Self::DeleteAction => "delete_action",
            Self::DeactivateAction => "deactivate_action",
            Self::ActivateAction => "activate_action",
            Self::BreakdownAction => "breakdown_action",
            Self::TrackProgress => "track_progress",
            Self::TopicExploration => "topic_exploration",
            Self::DeepReasons => "deep_reasons",
            Self::Checkup => "checkup",
            Self::Safety => "safety",
        };
        write!(f, "{}", s)
    }
}

/// The machine currently owning the conversation, if any
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveMachine {
    pub kind: MachineKind,
    /// Free-text label of the item the machine is working on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

impl ActiveMachine {
    pub fn new(kind: MachineKind, target: Option<&str>) -> Self {
        Self {
            kind,
            target: target.map(String::from),
        }
    }
}

/// Exactly one of these is handed to the machine runner per turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "directive")]
pub enum MachineDirective {
    /// Start a machine of the given kind on the given target
    Start {
        kind: MachineKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
    /// The running machine keeps the turn
    ContinueActive,
    /// Nothing to do this turn
    Idle,
}

/// Tone of an add-on line prepended/appended to the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonKind {
    /// Tells the user what will happen and when
    Info,
    /// Asks the user to confirm order or pick one
    Confirmation,
    /// Names the running machine and promises deferred work
    Notification,
}

/// A short natural-language line accompanying the directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addon {
    pub kind: AddonKind,
    pub text: String,
}

impl Addon {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: AddonKind::Info,
            text: text.into(),
        }
    }

    pub fn confirmation(text: impl Into<String>) -> Self {
        Self {
            kind: AddonKind::Confirmation,
            text: text.into(),
        }
    }

    pub fn notification(text: impl Into<String>) -> Self {
        Self {
            kind: AddonKind::Notification,
            text: text.into(),
        }
    }
}
