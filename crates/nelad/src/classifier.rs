//! LLM turn classifier client.
//!
//! Calls a chat endpoint once per turn and parses the structured signal
//! contract out of the model's text. The boundary is untrusted: invalid
//! output goes through one repair pass (same model, quoting the problems
//! found); if repair also fails the caller gets a sanitized or
//! all-defaults output, never an error surfaced to the user.

use anyhow::{Context, Result};
use nela_shared::{ClassifierConfig, ClassifierOutput, ClassifierRequest, NelaError, MAX_BRIEF_LEN};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = r#"You are the turn classifier for Nela, a coaching assistant.
Read the user's latest message in context and answer with ONE JSON object, no prose, matching:
{
  "bundle": {
    "safety": "none|elevated|crisis",
    "primary_intent": "unknown|conversation|action_request|response",
    "interruption": "none|pause|cancel",
    "flow_resolution": "none|completed|abandoned",
    "create_action": {"detected": bool, "strength": "none|weak|strong", "target_hint": string|null, "confidence": 0.0-1.0},
    "update_action": {...}, "delete_action": {...}, "deactivate_action": {...},
    "activate_action": {...}, "breakdown": {...}, "track_progress": {...},
    "exploration_depth": "none|surface|deep",
    "deep_reasons_opportunity": bool, "deep_reasons_confidence": 0.0-1.0,
    "explanation_need": bool, "research_need": bool,
    "engagement": "unknown|low|medium|high",
    "dashboard": "none|wants_dashboard|declines_dashboard",
    "checkup_requested": bool
  },
  "new_signals": [{"kind": "...", "brief": "<=100 chars", "action_target": string|null}],
  "enrichments": [{"kind": "...", "action_target": string|null, "brief": "<=100 chars"}],
  "pending_decision": {"status": "resolved|unresolved|unrelated", "pending_kind": "dual_tool",
                       "decision_code": "none|confirm_both|confirm_reversed|only_first|only_second|decline_all",
                       "confidence": 0.0-1.0} | null
}
Signals already listed in the history you receive must become enrichments, not new_signals.
Omit anything you are not sure about; omitted fields default to neutral."#;

const REPAIR_PROMPT: &str = "Your previous answer did not match the required JSON contract. \
Problems found are listed below. Reply with ONE corrected JSON object and nothing else.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    keep_alive: &'a str,
    format: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatMessage,
}

/// Check the semantic contract of parsed output; empty = valid.
pub fn validate_output(output: &ClassifierOutput) -> Vec<String> {
    let mut problems = vec![];
    let bundle = &output.bundle;
    for (name, signal) in [
        ("create_action", &bundle.create_action),
        ("update_action", &bundle.update_action),
        ("delete_action", &bundle.delete_action),
        ("deactivate_action", &bundle.deactivate_action),
        ("activate_action", &bundle.activate_action),
        ("breakdown", &bundle.breakdown),
        ("track_progress", &bundle.track_progress),
    ] {
        if !(0.0..=1.0).contains(&signal.confidence) {
            problems.push(format!("{}.confidence out of [0,1]", name));
        }
    }
    if !(0.0..=1.0).contains(&bundle.deep_reasons_confidence) {
        problems.push("deep_reasons_confidence out of [0,1]".to_string());
    }
    for signal in &output.new_signals {
        if signal.brief.trim().is_empty() {
            problems.push(format!("new signal {} has an empty brief", signal.kind));
        }
        if signal.brief.chars().count() > MAX_BRIEF_LEN {
            problems.push(format!("new signal {} brief exceeds 100 chars", signal.kind));
        }
    }
    for enrichment in &output.enrichments {
        if enrichment.brief.chars().count() > MAX_BRIEF_LEN {
            problems.push(format!("enrichment {} brief exceeds 100 chars", enrichment.kind));
        }
    }
    if let Some(decision) = &output.pending_decision {
        if !(0.0..=1.0).contains(&decision.confidence) {
            problems.push("pending_decision.confidence out of [0,1]".to_string());
        }
    }
    problems
}

/// Clamp out-of-range values in place so a nearly-valid output stays
/// usable when the repair pass fails too.
pub fn sanitize_output(output: &mut ClassifierOutput) {
    let bundle = &mut output.bundle;
    for signal in [
        &mut bundle.create_action,
        &mut bundle.update_action,
        &mut bundle.delete_action,
        &mut bundle.deactivate_action,
        &mut bundle.activate_action,
        &mut bundle.breakdown,
        &mut bundle.track_progress,
    ] {
        signal.confidence = signal.confidence.clamp(0.0, 1.0);
    }
    bundle.deep_reasons_confidence = bundle.deep_reasons_confidence.clamp(0.0, 1.0);
    for signal in &mut output.new_signals {
        signal.brief = nela_shared::clamp_brief(&signal.brief);
    }
    for enrichment in &mut output.enrichments {
        enrichment.brief = nela_shared::clamp_brief(&enrichment.brief);
    }
    if let Some(decision) = &mut output.pending_decision {
        decision.confidence = decision.confidence.clamp(0.0, 1.0);
    }
}

/// Pull the first JSON object out of sloppy LLM text (code fences,
/// leading prose, trailing commentary).
pub fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            if c != '\\' {
                escaped = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_output(raw: &str) -> std::result::Result<ClassifierOutput, NelaError> {
    let json = extract_json(raw).ok_or_else(|| NelaError::MalformedOutput {
        problems: vec!["no JSON object in response".to_string()],
    })?;
    let output: ClassifierOutput =
        serde_json::from_str(json).map_err(|e| NelaError::MalformedOutput {
            problems: vec![format!("invalid JSON structure: {}", e)],
        })?;
    let problems = validate_output(&output);
    if problems.is_empty() {
        Ok(output)
    } else {
        Err(NelaError::MalformedOutput { problems })
    }
}

/// Classifier client for an Ollama-style chat endpoint
pub struct LlmClassifier {
    http_client: reqwest::Client,
    config: ClassifierConfig,
}

impl LlmClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            http_client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Classify one turn, repairing malformed output once.
    ///
    /// Errors only on transport failure; malformed output degrades through
    /// repair, then sanitize, then the all-defaults output. A parseable
    /// crisis safety level always survives the fallback.
    pub async fn classify(&self, request: &ClassifierRequest) -> Result<ClassifierOutput> {
        let user_prompt = serde_json::to_string_pretty(request)
            .context("failed to serialize classifier request")?;

        let raw = self.call_chat(&[user_message(&user_prompt)]).await?;
        let problems = match parse_output(&raw) {
            Ok(output) => {
                debug!("classifier output valid on first pass");
                return Ok(output);
            }
            Err(NelaError::MalformedOutput { problems }) => problems,
            Err(e) => vec![e.to_string()],
        };

        warn!(problems = ?problems, "classifier output malformed, running repair pass");
        let repair_user = format!(
            "{}\n\nPrevious answer:\n{}\n\nProblems:\n- {}",
            REPAIR_PROMPT,
            raw,
            problems.join("\n- ")
        );
        let repaired_raw = self
            .call_chat(&[user_message(&user_prompt), assistant_message(&raw), user_message(&repair_user)])
            .await?;

        match parse_output(&repaired_raw) {
            Ok(output) => {
                info!("repair pass produced valid classifier output");
                Ok(output)
            }
            Err(e) => {
                warn!(error = %e, "repair pass failed, falling back");
                Ok(fallback_output(&raw, &repaired_raw))
            }
        }
    }

    async fn call_chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let mut all_messages = vec![ChatMessage {
            role: "system".to_string(),
            content: SYSTEM_PROMPT.to_string(),
        }];
        all_messages.extend_from_slice(messages);

        let request = ChatRequest {
            model: &self.config.model,
            messages: all_messages,
            stream: false,
            keep_alive: &self.config.keep_alive,
            format: "json",
        };

        let url = format!("{}/api/chat", self.config.url.trim_end_matches('/'));
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| NelaError::ClassifierUnavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(NelaError::ClassifierUnavailable(format!(
                "classifier endpoint returned {}",
                status
            ))
            .into());
        }
        let chat: ChatResponse = response
            .json()
            .await
            .context("classifier response was not valid chat JSON")?;
        Ok(chat.message.content)
    }
}

fn user_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: "user".to_string(),
        content: content.to_string(),
    }
}

fn assistant_message(content: &str) -> ChatMessage {
    ChatMessage {
        role: "assistant".to_string(),
        content: content.to_string(),
    }
}

/// Build the safest usable output after a failed repair: a nearly-valid
/// parse is sanitized; otherwise all defaults, keeping any parseable
/// crisis signal.
fn fallback_output(raw: &str, repaired_raw: &str) -> ClassifierOutput {
    for text in [repaired_raw, raw] {
        if let Some(json) = extract_json(text) {
            if let Ok(mut output) = serde_json::from_str::<ClassifierOutput>(json) {
                sanitize_output(&mut output);
                return output;
            }
        }
    }
    ClassifierOutput::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nela_shared::{DetectedSignal, SafetyLevel, SignalKind};

    #[test]
    fn test_extract_json_strips_fences_and_prose() {
        let raw = "Sure! Here is the answer:\n```json\n{\"bundle\": {}}\n```\nHope that helps.";
        assert_eq!(extract_json(raw), Some("{\"bundle\": {}}"));
    }

    #[test]
    fn test_extract_json_handles_nested_and_strings() {
        let raw = r#"{"a": {"b": "braces } in { string"}, "c": 1} trailing"#;
        let json = extract_json(raw).unwrap();
        let v: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(v["c"], 1);
    }

    #[test]
    fn test_validate_flags_out_of_range_confidence() {
        let mut output = ClassifierOutput::default();
        output.bundle.delete_action.confidence = 1.7;
        let problems = validate_output(&output);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("delete_action"));
    }

    #[test]
    fn test_validate_flags_overlong_brief() {
        let mut output = ClassifierOutput::default();
        output.new_signals.push(DetectedSignal {
            kind: SignalKind::CreateAction,
            brief: "x".repeat(150),
            action_target: None,
        });
        let problems = validate_output(&output);
        assert!(problems.iter().any(|p| p.contains("exceeds 100 chars")));
    }

    #[test]
    fn test_sanitize_clamps_everything() {
        let mut output = ClassifierOutput::default();
        output.bundle.delete_action.confidence = 3.0;
        output.bundle.deep_reasons_confidence = -0.5;
        output.new_signals.push(DetectedSignal {
            kind: SignalKind::CreateAction,
            brief: "x".repeat(150),
            action_target: None,
        });
        sanitize_output(&mut output);
        assert!(validate_output(&output).is_empty());
    }

    #[test]
    fn test_fallback_keeps_parseable_crisis() {
        let raw = r#"{"bundle": {"safety": "crisis", "delete_action": {"confidence": 9.0}}}"#;
        let output = fallback_output(raw, "total garbage");
        assert_eq!(output.bundle.safety, SafetyLevel::Crisis);
        assert!((output.bundle.delete_action.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_fallback_on_garbage_is_all_defaults() {
        let output = fallback_output("no json here", "also nothing");
        assert_eq!(output, ClassifierOutput::default());
    }

    #[test]
    fn test_parse_output_roundtrip() {
        let raw = r#"{"bundle": {"create_action": {"detected": true, "target_hint": "running", "confidence": 0.9}}}"#;
        let output = parse_output(raw).unwrap();
        assert!(output.bundle.is_detected(SignalKind::CreateAction));
    }
}
