//! Configuration for the guarded agent.
//!
//! Loaded once at process start (by agentctl) and passed by value into
//! the components that need it. The library never reads environment
//! state; the binary resolves credentials into this struct before any
//! component runs.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::AgentError;

/// LLM collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Ollama endpoint.
    #[serde(default = "default_ollama_url")]
    pub ollama_url: String,

    /// Model for the knowledge path and search-answer phrasing.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature; low for consistent tool phrasing.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Generation timeout in seconds.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_ollama_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "mistral:instruct".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_llm_timeout() -> u64 {
    60
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: default_ollama_url(),
            model: default_model(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

/// Search collaborator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// SerpAPI key. Empty means search is disabled and every search
    /// branch fails with `SearchUnavailable` instead of guessing.
    #[serde(default)]
    pub serpapi_key: String,

    /// Request timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Retry a failed search once after a short backoff.
    #[serde(default = "default_retry_once")]
    pub retry_once: bool,

    /// Backoff before the retry, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_search_timeout() -> u64 {
    10
}

fn default_retry_once() -> bool {
    true
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            serpapi_key: String::new(),
            timeout_secs: default_search_timeout(),
            retry_once: default_retry_once(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Arithmetic display and bound settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcConfig {
    /// Magnitude bound; results above it fail with `Overflow`.
    #[serde(default = "default_magnitude_bound")]
    pub magnitude_bound: f64,
}

fn default_magnitude_bound() -> f64 {
    1e15
}

impl Default for CalcConfig {
    fn default() -> Self {
        Self {
            magnitude_bound: default_magnitude_bound(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub calc: CalcConfig,
}

impl AgentConfig {
    /// Load from a TOML file, falling back to defaults when the file is
    /// missing. A present-but-invalid file is an error, not a silent
    /// default.
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| AgentError::Config(e.to_string()))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }

    pub fn search_enabled(&self) -> bool {
        !self.search.serpapi_key.is_empty()
    }
}
