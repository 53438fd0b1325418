//! Structured arbitration trace events.
//!
//! Every routing decision emits one event with enough fields to
//! reconstruct the decision offline. Events go to a rotating JSONL file
//! and, at debug level, to the `tracing` subscriber.

use crate::machine::MachineKind;
use crate::signals::SignalKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

const TRACE_LOG_FILE: &str = "arbiter.jsonl";

/// Reason codes for deferral decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeferralReason {
    /// No machine active, nothing to defer behind
    NoActiveMachine,
    /// Turn implies no new machine
    NoNewMachine,
    /// Same machine kind and target: the running machine keeps the turn
    Continuation,
    /// Safety always interrupts, never defers
    SafetyInterrupt,
    /// A different machine was implied while one is running
    Deferred,
}

/// One arbitration decision, serialized as a JSONL line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum TraceEvent {
    DeferralDecision {
        turn: u64,
        deferred: bool,
        reason: DeferralReason,
        #[serde(skip_serializing_if = "Option::is_none")]
        active_machine: Option<MachineKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        active_target: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_machine: Option<MachineKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_target: Option<String>,
    },
    NewSignalsDetected {
        turn: u64,
        kinds: Vec<SignalKind>,
    },
    DualToolOutcome {
        turn: u64,
        outcome: String,
        tool_a: SignalKind,
        tool_b: SignalKind,
    },
    TopicPruned {
        turn: u64,
        topic_id: Uuid,
        machine: MachineKind,
        age_minutes: i64,
    },
    TopicCancelled {
        turn: u64,
        topic_id: Uuid,
        machine: MachineKind,
    },
    ClassifierFallback {
        turn: u64,
        problems: Vec<String>,
    },
}

/// Envelope written to disk
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TraceRecord {
    timestamp: DateTime<Utc>,
    user_id: String,
    #[serde(flatten)]
    event: TraceEvent,
}

/// Append-only JSONL trace sink with size-based rotation.
///
/// Emission is best-effort: a failed write warns and drops the event,
/// it never fails the turn.
#[derive(Debug, Clone)]
pub struct TraceWriter {
    dir: PathBuf,
    max_file_size: u64,
}

impl TraceWriter {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: u64) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    /// Record one event for one user
    pub fn emit(&self, user_id: &str, event: &TraceEvent) {
        debug!(user_id, ?event, "arbiter trace");
        let record = TraceRecord {
            timestamp: Utc::now(),
            user_id: user_id.to_string(),
            event: event.clone(),
        };
        if let Err(e) = self.append(&record) {
            warn!("failed to write trace event: {}", e);
        }
    }

    fn append(&self, record: &TraceRecord) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(TRACE_LOG_FILE);
        self.rotate_if_needed(&path)?;
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{}", line)
    }

    fn rotate_if_needed(&self, path: &Path) -> std::io::Result<()> {
        if let Ok(meta) = fs::metadata(path) {
            if meta.len() >= self.max_file_size {
                let rotated = path.with_extension("jsonl.1");
                fs::rename(path, rotated)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = TraceEvent::DeferralDecision {
            turn: 4,
            deferred: true,
            reason: DeferralReason::Deferred,
            active_machine: Some(MachineKind::UpdateAction),
            active_target: Some("running".to_string()),
            new_machine: Some(MachineKind::DeleteAction),
            new_target: Some("meditation".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"deferral_decision""#));
        assert!(json.contains(r#""reason":"deferred""#));
    }

    #[test]
    fn test_writer_appends_jsonl_lines() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path(), 1024 * 1024);
        writer.emit(
            "user-1",
            &TraceEvent::NewSignalsDetected {
                turn: 1,
                kinds: vec![SignalKind::CreateAction],
            },
        );
        writer.emit(
            "user-1",
            &TraceEvent::TopicCancelled {
                turn: 2,
                topic_id: Uuid::new_v4(),
                machine: MachineKind::CreateAction,
            },
        );
        let content = fs::read_to_string(dir.path().join(TRACE_LOG_FILE)).unwrap();
        assert_eq!(content.lines().count(), 2);
        for line in content.lines() {
            let v: serde_json::Value = serde_json::from_str(line).unwrap();
            assert_eq!(v["user_id"], "user-1");
        }
    }

    #[test]
    fn test_rotation_moves_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = TraceWriter::new(dir.path(), 10);
        for turn in 0..3 {
            writer.emit(
                "u",
                &TraceEvent::NewSignalsDetected {
                    turn,
                    kinds: vec![],
                },
            );
        }
        assert!(dir.path().join("arbiter.jsonl.1").exists());
    }
}
