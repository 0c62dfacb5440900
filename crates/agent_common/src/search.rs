//! Search collaborator: routing, timeout and the SerpAPI client.
//!
//! The core's only responsibilities here are deciding when to search
//! (the pre-router's job) and treating whatever comes back as untrusted
//! free text. No numeric value leaves a search result without going
//! through the normalizer first.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::error::AgentError;

/// Seam for the external search collaborator, so tests can stub it.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Raw result text for a sub-query. Plain text; no schema assumed
    /// beyond "may contain numbers and unit words".
    async fn search(&self, query: &str) -> Result<String, AgentError>;
}

/// Applies timeout and the optional single retry around a provider.
pub struct SearchRouter {
    provider: Box<dyn SearchProvider>,
    timeout: Duration,
    retry_once: bool,
    retry_backoff: Duration,
}

impl SearchRouter {
    pub fn new(provider: Box<dyn SearchProvider>, config: &SearchConfig) -> Self {
        Self {
            provider,
            timeout: Duration::from_secs(config.timeout_secs),
            retry_once: config.retry_once,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub async fn search(&self, query: &str) -> Result<String, AgentError> {
        info!(query, "search dispatched");
        match self.attempt(query).await {
            Ok(text) => Ok(text),
            Err(e) if e.is_retryable() && self.retry_once => {
                warn!(error = %e, "search failed, retrying once");
                tokio::time::sleep(self.retry_backoff).await;
                self.attempt(query).await
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(&self, query: &str) -> Result<String, AgentError> {
        let result = tokio::time::timeout(self.timeout, self.provider.search(query))
            .await
            .map_err(|_| AgentError::SearchUnavailable("request timed out".to_string()))??;
        if result.trim().is_empty() {
            return Err(AgentError::SearchUnavailable(
                "no results returned".to_string(),
            ));
        }
        debug!(bytes = result.len(), "search result received");
        Ok(result)
    }
}

// =============================================================================
// SerpAPI provider
// =============================================================================

const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

/// How many organic results to fold into the combined snippet text.
const MAX_ORGANIC_RESULTS: usize = 3;

#[derive(Debug, Clone, Deserialize, Default)]
struct SerpApiResponse {
    #[serde(default)]
    answer_box: Option<Snippet>,
    #[serde(default)]
    knowledge_graph: Option<Snippet>,
    #[serde(default)]
    organic_results: Vec<OrganicResult>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct Snippet {
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl Snippet {
    fn text(&self) -> Option<&str> {
        self.snippet.as_deref().or(self.description.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    link: Option<String>,
}

/// Live Google results via SerpAPI. Answer box and knowledge graph come
/// first; they are the snippets most likely to carry the fact or rate
/// being asked about.
pub struct SerpApiProvider {
    api_key: String,
    timeout: Duration,
}

impl SerpApiProvider {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            api_key: config.serpapi_key.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn combine(response: SerpApiResponse) -> String {
        let mut combined = Vec::new();

        if let Some(text) = response.answer_box.as_ref().and_then(Snippet::text) {
            combined.push(format!("Answer box: {}", text));
        }
        if let Some(text) = response.knowledge_graph.as_ref().and_then(Snippet::text) {
            combined.push(format!("Knowledge graph: {}", text));
        }

        for result in response.organic_results.iter().take(MAX_ORGANIC_RESULTS) {
            let (Some(title), Some(link)) = (&result.title, &result.link) else {
                continue;
            };
            let snippet = result.snippet.as_deref().unwrap_or("");
            combined.push(format!("Title: {} | Snippet: {} | URL: {}", title, snippet, link));
        }

        combined.join(" ||| ")
    }
}

#[async_trait]
impl SearchProvider for SerpApiProvider {
    async fn search(&self, query: &str) -> Result<String, AgentError> {
        if self.api_key.is_empty() {
            return Err(AgentError::SearchUnavailable(
                "no search API key configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AgentError::Http(e.to_string()))?;

        let resp = client
            .get(SERPAPI_ENDPOINT)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("engine", "google"),
                ("q", query),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AgentError::SearchUnavailable(e.to_string())
                } else {
                    AgentError::Http(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            return Err(AgentError::SearchUnavailable(format!(
                "status {}",
                resp.status()
            )));
        }

        let parsed: SerpApiResponse = resp
            .json()
            .await
            .map_err(|e| AgentError::SearchUnavailable(e.to_string()))?;

        Ok(Self::combine(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        response: &'static str,
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        async fn search(&self, _query: &str) -> Result<String, AgentError> {
            Ok(self.response.to_string())
        }
    }

    struct FlakyProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchProvider for FlakyProvider {
        async fn search(&self, _query: &str) -> Result<String, AgentError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(AgentError::SearchUnavailable("transient".to_string()))
            } else {
                Ok("recovered".to_string())
            }
        }
    }

    fn fast_retry_config() -> SearchConfig {
        SearchConfig {
            serpapi_key: "test".to_string(),
            timeout_secs: 1,
            retry_once: true,
            retry_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_passthrough() {
        let router = SearchRouter::new(
            Box::new(StubProvider {
                response: "1 USD = 157.3 JPY",
            }),
            &fast_retry_config(),
        );
        assert_eq!(router.search("usd to jpy").await.unwrap(), "1 USD = 157.3 JPY");
    }

    #[tokio::test]
    async fn test_retries_once_on_transient_failure() {
        let router = SearchRouter::new(
            Box::new(FlakyProvider {
                calls: AtomicUsize::new(0),
            }),
            &fast_retry_config(),
        );
        assert_eq!(router.search("q").await.unwrap(), "recovered");
    }

    #[tokio::test]
    async fn test_no_retry_when_disabled() {
        let mut config = fast_retry_config();
        config.retry_once = false;
        let router = SearchRouter::new(
            Box::new(FlakyProvider {
                calls: AtomicUsize::new(0),
            }),
            &config,
        );
        assert!(matches!(
            router.search("q").await,
            Err(AgentError::SearchUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_result_is_unavailable() {
        let router = SearchRouter::new(
            Box::new(StubProvider { response: "  " }),
            &fast_retry_config(),
        );
        // Empty goes through the retry path and still ends unavailable.
        assert!(matches!(
            router.search("q").await,
            Err(AgentError::SearchUnavailable(_))
        ));
    }

    #[test]
    fn test_serpapi_combine_prefers_answer_box() {
        let response: SerpApiResponse = serde_json::from_str(
            r#"{
                "answer_box": {"snippet": "1 USD = 157.3 JPY"},
                "organic_results": [
                    {"title": "Rates", "snippet": "latest rates", "link": "https://example.com"}
                ]
            }"#,
        )
        .unwrap();
        let combined = SerpApiProvider::combine(response);
        assert!(combined.starts_with("Answer box: 1 USD = 157.3 JPY"));
        assert!(combined.contains("Title: Rates"));
    }

    #[test]
    fn test_serpapi_combine_empty() {
        let combined = SerpApiProvider::combine(SerpApiResponse::default());
        assert!(combined.is_empty());
    }
}
