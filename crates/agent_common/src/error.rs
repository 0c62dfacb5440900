//! Error types for the guarded agent.
//!
//! Every core failure is typed and surfaces to the caller; none is
//! swallowed and none turns into a default numeric guess.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Empty or unusable query")]
    InvalidQuery,

    #[error("No evaluable expression found in: {0}")]
    UnparsableExpression(String),

    #[error("Division by zero in expression: {0}")]
    DivisionByZero(String),

    #[error("Result magnitude exceeds the configured bound ({0})")]
    Overflow(f64),

    #[error("Search provider unavailable: {0}")]
    SearchUnavailable(String),

    #[error("Could not extract a usable number from search results")]
    ExtractionFailed,

    #[error("No tool call found in model output")]
    NoToolCallFound,

    #[error("Tool call for '{tool}' is missing required argument '{argument}'")]
    IncompleteToolCall { tool: String, argument: String },

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),
}

impl AgentError {
    /// Whether the caller may retry this failure (transient collaborator
    /// outages only; user-input and parse failures are reported instead).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::SearchUnavailable(_) | AgentError::LlmUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AgentError::SearchUnavailable("timeout".into()).is_retryable());
        assert!(AgentError::LlmUnavailable("connect".into()).is_retryable());
        assert!(!AgentError::InvalidQuery.is_retryable());
        assert!(!AgentError::ExtractionFailed.is_retryable());
        assert!(!AgentError::DivisionByZero("1 / 0".into()).is_retryable());
    }
}
