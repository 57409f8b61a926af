//! The reasoning-process boundary.
//!
//! The underlying language model is a black box to this core: given an
//! instruction and the conversation so far, it returns either a tool call
//! or a final text answer. Everything else about the model (prompting
//! quality, provider protocol) stays behind the [`Reasoner`] trait.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use crate::error::{DealdeskError, DealdeskResult};
use crate::tools::protocol::{ToolCall, ToolStatus};

/// One entry in a worker turn's conversation transcript.
#[derive(Debug, Clone)]
pub enum TranscriptEntry {
    /// The rendered instruction that opened the turn.
    Instruction(String),
    /// A tool call the reasoner made earlier in the turn.
    ToolCall { tool_name: String, arguments: Value },
    /// The (possibly degraded) result of that call.
    ToolResult {
        tool_name: String,
        status: ToolStatus,
        payload: String,
    },
}

/// The reasoner's decision for one cycle of a worker turn.
#[derive(Debug, Clone)]
pub enum ReasonerStep {
    /// Invoke a tool and continue the turn.
    ToolCall(ToolCall),
    /// Terminate the turn with this final answer.
    Final(String),
}

/// Boundary to the reasoning process driving a worker turn.
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// Given the transcript so far, decide the next step for this worker.
    async fn next_step(
        &self,
        worker_id: &str,
        transcript: &[TranscriptEntry],
    ) -> DealdeskResult<ReasonerStep>;
}

/// Reasoner backed by a generative-language HTTP API.
///
/// The model is asked to either answer directly or emit a fenced
/// ```tool_call``` JSON block naming a tool and its arguments.
pub struct HttpReasoner {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpReasoner {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    fn render_transcript(transcript: &[TranscriptEntry]) -> Vec<Value> {
        let mut contents = Vec::new();
        for entry in transcript {
            match entry {
                TranscriptEntry::Instruction(text) => {
                    contents.push(json!({"role": "user", "parts": [{"text": text}]}));
                }
                TranscriptEntry::ToolCall { tool_name, arguments } => {
                    contents.push(json!({
                        "role": "model",
                        "parts": [{"text": format!(
                            "```tool_call\n{{\"tool_name\":{:?},\"arguments\":{}}}\n```",
                            tool_name, arguments
                        )}]
                    }));
                }
                TranscriptEntry::ToolResult {
                    tool_name,
                    status,
                    payload,
                } => {
                    let status_label = match status {
                        ToolStatus::Ok => "ok",
                        ToolStatus::Timeout => "timeout",
                        ToolStatus::Error => "error",
                    };
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": format!(
                            "Tool '{}' returned (status: {}):\n{}",
                            tool_name, status_label, payload
                        )}]
                    }));
                }
            }
        }
        contents
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn next_step(
        &self,
        worker_id: &str,
        transcript: &[TranscriptEntry],
    ) -> DealdeskResult<ReasonerStep> {
        let mut url = format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        );
        if let Some(key) = &self.api_key {
            url = format!("{}?key={}", url, key);
        }

        let body = json!({ "contents": Self::render_transcript(transcript) });
        log::debug!("[Reasoner {}] requesting decision from {}", worker_id, self.model);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DealdeskError::Reasoner(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DealdeskError::Reasoner(format!(
                "model API returned {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| DealdeskError::Reasoner(format!("bad response body: {}", e)))?;

        let text = payload["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(DealdeskError::Reasoner(
                "model returned no text candidates".to_string(),
            ));
        }

        match extract_tool_call(&text) {
            Some(call) => Ok(ReasonerStep::ToolCall(call)),
            None => Ok(ReasonerStep::Final(text)),
        }
    }
}

/// Extract a fenced tool-call block from model output, if present.
///
/// Recognized shape:
/// ````text
/// ```tool_call
/// {"tool_name": "web_search", "arguments": {"query": "..."}}
/// ```
/// ````
pub fn extract_tool_call(text: &str) -> Option<ToolCall> {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```tool_call\s*(\{.*?\})\s*```").expect("tool_call fence pattern")
    });
    let captures = fence.captures(text)?;
    let raw = captures.get(1)?.as_str();
    match serde_json::from_str::<ToolCall>(raw) {
        Ok(call) => Some(call),
        Err(e) => {
            log::warn!("[Reasoner] unparseable tool_call block ignored: {}", e);
            None
        }
    }
}
