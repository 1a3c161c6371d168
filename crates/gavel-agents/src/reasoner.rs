//! Reasoner invocation — the uniform contract wrapping each external
//! reasoning engine.
//!
//! The invoker returns the *raw* stance payload as untrusted JSON;
//! typed validation belongs to the guard layer. It enforces a hard
//! per-call timeout and never retries: transport failures are
//! immediately fatal for the run, and the single repair retry for
//! hallucinated citations is driven by the orchestrator, not here.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use adjudication::{EvidenceBundle, Role};

use crate::config::Endpoint;
use crate::prompts::role_instructions;

/// Invocation failure. All variants are fatal for the run.
#[derive(Debug, Clone, Error)]
pub enum ReasonerError {
    /// Network or backend failure.
    #[error("transport failure for {role}: {cause}")]
    Transport { role: Role, cause: String },

    /// The hard per-call deadline elapsed. Treated identically to a
    /// transport failure.
    #[error("reasoner {role} timed out after {timeout_ms}ms")]
    Timeout { role: Role, timeout_ms: u64 },

    /// The reasoner produced no parseable JSON payload at all.
    #[error("malformed payload from {role}: {reason}")]
    Malformed { role: Role, reason: String },
}

impl ReasonerError {
    /// Short machine-readable kind label for fail-closed conditions.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Timeout { .. } => "TRANSPORT_ERROR",
            Self::Malformed { .. } => "STRUCTURAL_VIOLATION",
        }
    }
}

/// Uniform contract over the external reasoning engines.
///
/// `repair_note` carries the guard's correction note on the single
/// repair retry; `None` on the first invocation.
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn invoke(
        &self,
        role: Role,
        question: &str,
        bundle: &EvidenceBundle,
        repair_note: Option<&str>,
    ) -> Result<serde_json::Value, ReasonerError>;
}

// ── OpenAI-compatible chat completions wire types ────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP reasoner driving an OpenAI-compatible endpoint.
pub struct HttpReasoner {
    client: reqwest::Client,
    endpoint: Endpoint,
    timeout: Duration,
}

impl HttpReasoner {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            timeout,
        }
    }
}

#[async_trait]
impl Reasoner for HttpReasoner {
    async fn invoke(
        &self,
        role: Role,
        question: &str,
        bundle: &EvidenceBundle,
        repair_note: Option<&str>,
    ) -> Result<serde_json::Value, ReasonerError> {
        let mut user = bundle.context_block(question);
        if let Some(note) = repair_note {
            user.push_str("\n\n");
            user.push_str(note);
        }

        let request = ChatRequest {
            model: &self.endpoint.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: role_instructions(role).text,
                },
                ChatMessage {
                    role: "user",
                    content: &user,
                },
            ],
            // Determinism matters more than creativity here.
            temperature: 0.0,
        };

        let url = format!("{}/chat/completions", self.endpoint.url);

        // The deadline covers the whole exchange, body read included;
        // a backend that returns headers promptly but stalls the body
        // must still trip it.
        let exchange = async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.endpoint.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| ReasonerError::Transport {
                    role,
                    cause: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(ReasonerError::Transport {
                    role,
                    cause: format!("endpoint returned {}", response.status()),
                });
            }

            response
                .json::<ChatResponse>()
                .await
                .map_err(|e| ReasonerError::Transport {
                    role,
                    cause: format!("response body: {e}"),
                })
        };

        let parsed = match tokio::time::timeout(self.timeout, exchange).await {
            Err(_) => {
                return Err(ReasonerError::Timeout {
                    role,
                    timeout_ms: self.timeout.as_millis() as u64,
                })
            }
            Ok(result) => result?,
        };

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ReasonerError::Malformed {
                role,
                reason: "empty choices".to_string(),
            })?;

        debug!(role = %role, chars = content.len(), "reasoner responded");
        extract_json_object(content).ok_or_else(|| ReasonerError::Malformed {
            role,
            reason: "no JSON object in completion".to_string(),
        })
    }
}

/// Pull the first JSON object out of a completion, tolerating markdown
/// fences and surrounding prose.
fn extract_json_object(raw: &str) -> Option<serde_json::Value> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let start = stripped.find('{')?;
    let end = stripped.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&stripped[start..=end]).ok()
}
