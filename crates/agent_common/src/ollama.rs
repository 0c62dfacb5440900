//! HTTP client for the local Ollama API.
//!
//! The LLM is a collaborator, not an authority: it phrases answers and
//! may request a tool call, but routing, arithmetic and fact extraction
//! never depend on its output.
//!
//! Endpoints used:
//! - GET  /          - health check
//! - POST /api/generate - generate response (non-streaming)

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::AgentError;

/// Timeout for the health check (ms); generation gets its own budget.
const HEALTH_CHECK_TIMEOUT_MS: u64 = 2000;

/// Cap on generated tokens; answers here are one short paragraph.
const NUM_PREDICT: i32 = 500;

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for one configured model. Cheap to clone; builds its reqwest
/// client per request like every other collaborator call here.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Health check against the service root.
    pub async fn is_available(&self) -> bool {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_millis(HEALTH_CHECK_TIMEOUT_MS))
            .build()
        {
            Ok(c) => c,
            Err(_) => return false,
        };
        match client.get(&self.base_url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Generate a completion. Timeouts and connection failures surface
    /// as `LlmUnavailable`; the caller decides how to degrade.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, AgentError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            system: system.map(|s| s.to_string()),
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: NUM_PREDICT,
            },
        };

        let url = format!("{}/api/generate", self.base_url);
        let resp = client.post(&url).json(&request).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                AgentError::LlmUnavailable(e.to_string())
            } else {
                AgentError::Http(e.to_string())
            }
        })?;

        if !resp.status().is_success() {
            return Err(AgentError::LlmUnavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let generated: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::LlmUnavailable(e.to_string()))?;

        debug!(model = %self.model, chars = generated.response.len(), "llm completion received");
        Ok(generated.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let client = OllamaClient::new(&LlmConfig {
            ollama_url: "http://127.0.0.1:11434/".to_string(),
            ..LlmConfig::default()
        });
        assert_eq!(client.base_url, "http://127.0.0.1:11434");
    }

    #[test]
    fn test_request_serialization_skips_empty_system() {
        let request = GenerateRequest {
            model: "mistral:instruct".to_string(),
            prompt: "hi".to_string(),
            system: None,
            stream: false,
            options: GenerateOptions {
                temperature: 0.3,
                num_predict: NUM_PREDICT,
            },
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("system"));
        assert!(json.contains("\"stream\":false"));
    }
}
