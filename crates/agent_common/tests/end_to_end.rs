// End-to-end flows over a stubbed search provider
// ===============================================
//
// The LLM endpoint in these tests points at an unreachable port, so any
// path that silently leaned on model output would fail here. Arithmetic
// and conversion must come out of the deterministic pipeline alone.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use agent_common::search::SearchProvider;
use agent_common::{Agent, AgentConfig, AgentError};

struct StubSearch {
    calls: Arc<AtomicUsize>,
    result: Result<&'static str, &'static str>,
}

#[async_trait]
impl SearchProvider for StubSearch {
    async fn search(&self, _query: &str) -> Result<String, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.result {
            Ok(text) => Ok(text.to_string()),
            Err(reason) => Err(AgentError::SearchUnavailable(reason.to_string())),
        }
    }
}

fn offline_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.llm.ollama_url = "http://127.0.0.1:1".to_string();
    config.llm.timeout_secs = 1;
    config.search.retry_once = false;
    config.search.timeout_secs = 1;
    config
}

fn agent(result: Result<&'static str, &'static str>, calls: Arc<AtomicUsize>) -> Agent {
    Agent::with_search_provider(&offline_config(), Box::new(StubSearch { calls, result }))
}

#[tokio::test]
async fn arithmetic_resolves_with_no_network_at_all() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Ok("must not be consulted"), calls.clone());

    let answer = agent.run("What is 150 plus 25 times 4?").await.unwrap();
    assert!(answer.contains("250"), "answer was: {answer}");
    assert!(answer.contains("150 + 25 * 4"), "answer was: {answer}");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "arithmetic must never search");
}

#[tokio::test]
async fn aggregate_phrasing_routes_to_arithmetic_and_solves() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Ok("unused"), calls.clone());

    let answer = agent.run("the sum of 3 and 4 and 5").await.unwrap();
    assert!(answer.contains("12"), "answer was: {answer}");
    assert!(answer.contains("3 + 4 + 5"), "answer was: {answer}");

    let answer = agent.run("the difference between 90 and 33").await.unwrap();
    assert!(answer.contains("57"), "answer was: {answer}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn currency_conversion_uses_searched_rate() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(
        Ok("Answer box: 1 USD = 157.3 JPY as of this morning"),
        calls.clone(),
    );

    let answer = agent
        .run("How many Japanese Yen is 100 US Dollars right now?")
        .await
        .unwrap();
    assert!(answer.contains("15,730.00"), "answer was: {answer}");
    assert!(answer.contains("157.3"), "rate should be reported: {answer}");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn conversion_keeps_the_query_arithmetic() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Ok("1 USD = 157.3 JPY"), calls.clone());

    let answer = agent.run("100 dollars times 2 in yen").await.unwrap();
    assert!(answer.contains("31,460.00"), "answer was: {answer}");
    assert!(answer.contains("200"), "scaled amount should be reported: {answer}");
}

#[tokio::test]
async fn rate_only_query_reports_the_rate_itself() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Ok("1 USD = 157.3 JPY"), calls.clone());

    let answer = agent.run("how much is 1 dollar in yen").await.unwrap();
    assert!(answer.contains("157.30"), "answer was: {answer}");
    assert!(answer.contains("per 1 USD"), "answer was: {answer}");
}

#[tokio::test]
async fn search_outage_surfaces_as_search_unavailable() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Err("request timed out"), calls.clone());

    let err = agent
        .run("convert 250 usd to eur")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::SearchUnavailable(_)), "got {err:?}");
}

#[tokio::test]
async fn numberless_results_fail_extraction_instead_of_guessing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Ok("markets were quiet today, no figures published"), calls.clone());

    let err = agent.run("convert 250 usd to eur").await.unwrap_err();
    assert!(matches!(err, AgentError::ExtractionFailed), "got {err:?}");
}

#[tokio::test]
async fn forced_search_degrades_to_snippets_when_llm_is_down() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(
        Ok("Title: Japan PM | Snippet: the incumbent took office last year | URL: https://example.org"),
        calls.clone(),
    );

    let answer = agent
        .run("Who is the current Prime Minister of Japan?")
        .await
        .unwrap();
    assert!(answer.contains("the incumbent took office last year"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn knowledge_queries_require_the_llm() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = agent(Ok("unused"), calls.clone());

    let err = agent.run("explain borrowing in Rust").await.unwrap_err();
    assert!(matches!(err, AgentError::LlmUnavailable(_)), "got {err:?}");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
