//! Runtime configuration for the gavel pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Reasoner inference endpoint (OpenAI-compatible chat completions).
#[derive(Debug, Clone, Deserialize)]
pub struct Endpoint {
    pub url: String,
    pub model: String,
    /// Bearer token; local backends usually ignore it.
    pub api_key: String,
}

/// Top-level gavel configuration.
#[derive(Debug, Clone)]
pub struct GavelConfig {
    /// Endpoint serving all three reasoner roles.
    pub endpoint: Endpoint,
    /// Hard per-invocation deadline. Exceeding it is a transport
    /// failure and fails the run closed.
    pub reasoner_timeout: Duration,
    /// Repair retries per reasoner on hallucinated citations.
    pub max_repair_retries: u32,
    /// Directory holding the markdown document pack.
    pub docs_dir: PathBuf,
    /// Trace store location.
    pub trace_path: PathBuf,
    /// When true, identical inputs replay the cached verdict.
    pub deterministic_replay: bool,
}

impl Default for GavelConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint {
                url: std::env::var("GAVEL_ENDPOINT_URL")
                    .unwrap_or_else(|_| "http://localhost:8080/v1".into()),
                model: std::env::var("GAVEL_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
                api_key: std::env::var("GAVEL_API_KEY").unwrap_or_else(|_| "not-needed".into()),
            },
            reasoner_timeout: Duration::from_secs(
                std::env::var("GAVEL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(60),
            ),
            max_repair_retries: 1,
            docs_dir: PathBuf::from(
                std::env::var("GAVEL_DOCS_DIR").unwrap_or_else(|_| "./data/docs".into()),
            ),
            trace_path: PathBuf::from(
                std::env::var("GAVEL_TRACE_PATH").unwrap_or_else(|_| "./data/traces.jsonl".into()),
            ),
            deterministic_replay: true,
        }
    }
}

/// Check if an inference endpoint is reachable (GET /models).
pub async fn check_endpoint(url: &str) -> bool {
    let models_url = format!("{url}/models");
    match reqwest::Client::new()
        .get(&models_url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}
