//! Arbiter configuration.
//!
//! Every cap, TTL, and threshold the arbitration layer uses lives here and
//! can be overridden from a TOML file. Missing fields fall back to the
//! documented defaults, so an empty file is a valid config.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_max_deferred_topics() -> usize {
    5
}

fn default_deferred_topic_ttl_minutes() -> i64 {
    30
}

fn default_history_retention_turns() -> u64 {
    10
}

fn default_dual_tool_ttl_turns() -> u64 {
    2
}

fn default_dual_tool_ttl_minutes() -> i64 {
    5
}

fn default_dual_tool_clear_confidence() -> f64 {
    0.7
}

fn default_decision_confidence_floor() -> f64 {
    0.55
}

/// Caps, TTLs and thresholds for the arbitration layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterConfig {
    /// Maximum outstanding deferred topics per user; exceeding the cap
    /// cancels the oldest non-safety topic
    #[serde(default = "default_max_deferred_topics")]
    pub max_deferred_topics: usize,

    /// Deferred topics older than this are pruned
    #[serde(default = "default_deferred_topic_ttl_minutes")]
    pub deferred_topic_ttl_minutes: i64,

    /// History entries older than this many turns are dropped
    #[serde(default = "default_history_retention_turns")]
    pub history_retention_turns: u64,

    /// Pending dual-tool questions expire after this many turns
    #[serde(default = "default_dual_tool_ttl_turns")]
    pub dual_tool_ttl_turns: u64,

    /// Timestamp fallback for pending entries lacking a turn counter
    #[serde(default = "default_dual_tool_ttl_minutes")]
    pub dual_tool_ttl_minutes: i64,

    /// Both tool confidences must reach this for an auto-launch
    #[serde(default = "default_dual_tool_clear_confidence")]
    pub dual_tool_clear_confidence: f64,

    /// Pending decisions below this confidence count as unclear
    #[serde(default = "default_decision_confidence_floor")]
    pub decision_confidence_floor: f64,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            max_deferred_topics: default_max_deferred_topics(),
            deferred_topic_ttl_minutes: default_deferred_topic_ttl_minutes(),
            history_retention_turns: default_history_retention_turns(),
            dual_tool_ttl_turns: default_dual_tool_ttl_turns(),
            dual_tool_ttl_minutes: default_dual_tool_ttl_minutes(),
            dual_tool_clear_confidence: default_dual_tool_clear_confidence(),
            decision_confidence_floor: default_decision_confidence_floor(),
        }
    }
}

fn default_classifier_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_classifier_model() -> String {
    "qwen3:4b".to_string()
}

fn default_classifier_timeout_secs() -> u64 {
    120
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

/// Classifier endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Base URL of the chat endpoint
    #[serde(default = "default_classifier_url")]
    pub url: String,

    #[serde(default = "default_classifier_model")]
    pub model: String,

    #[serde(default = "default_classifier_timeout_secs")]
    pub timeout_secs: u64,

    /// How long the backend keeps the model loaded after a request
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: default_classifier_url(),
            model: default_classifier_model(),
            timeout_secs: default_classifier_timeout_secs(),
            keep_alive: default_keep_alive(),
        }
    }
}

fn default_trace_dir() -> String {
    "/var/log/nela".to_string()
}

fn default_trace_max_file_size() -> u64 {
    10 * 1024 * 1024
}

/// Trace sink settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_trace_dir")]
    pub dir: String,

    #[serde(default = "default_trace_max_file_size")]
    pub max_file_size: u64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            dir: default_trace_dir(),
            max_file_size: default_trace_max_file_size(),
        }
    }
}

/// Top-level config file shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct NelaConfig {
    #[serde(default)]
    pub arbiter: ArbiterConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

impl NelaConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Load from a path if given, otherwise defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
