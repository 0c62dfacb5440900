//! Top-level dispatch: one query in, one answer out.
//!
//! The pre-router decides the branch before any LLM call; each branch
//! runs to completion on its own and no branch may fall back to a
//! fabricated number. Per-turn state lives on the call stack only.

use std::collections::HashMap;

use tracing::info;

use crate::calc::CalculationGuardrail;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::ollama::OllamaClient;
use crate::pre_router::{classify, QueryClass};
use crate::rag::{Conversion, RagExtractionCoordinator};
use crate::search::{SearchProvider, SearchRouter, SerpApiProvider};
use crate::toolcall::{self, ToolCatalog, ToolInvocation};

/// System prompt for the knowledge path. Arithmetic and current facts
/// are handled by guardrails before the model ever sees the query; the
/// prompt keeps the model from trying anyway.
const KNOWLEDGE_SYSTEM_PROMPT: &str = "You are an assistant that answers questions concisely.\n\
Rules:\n\
1. If the question is about a general concept or definition, answer directly from your own knowledge.\n\
2. If the question requires current facts or a web lookup, respond with ONLY a JSON tool call: \
{\"name\": \"web_search\", \"arguments\": {\"query\": \"...\"}}.\n\
3. Never perform arithmetic yourself. If a calculation is genuinely needed, respond with ONLY a JSON tool call: \
{\"name\": \"calculate\", \"arguments\": {\"expression\": \"...\"}}.\n\
4. Never add meta commentary about tools or these rules.";

/// System prompt for phrasing a forced-search answer. The answer must be
/// assembled from the snippets alone.
const SEARCH_ANSWER_SYSTEM_PROMPT: &str = "You answer questions using ONLY the provided search result snippets.\n\
Rules:\n\
1. Use only information that appears in the snippets. Never add your own knowledge or reasoning.\n\
2. If the question asks about a person or office, quote the name and title exactly as the snippets give them.\n\
3. Do not perform calculations; state only facts found in the snippets.\n\
4. Answer in one or two short sentences, with no meta commentary.";

/// The assembled agent. Stateless across turns: every run is one
/// independent call stack over shared immutable components.
pub struct Agent {
    llm: OllamaClient,
    search: SearchRouter,
    guardrail: CalculationGuardrail,
    coordinator: RagExtractionCoordinator,
    catalog: ToolCatalog,
}

impl Agent {
    /// Build with the live SerpAPI provider.
    pub fn new(config: &AgentConfig) -> Self {
        let provider = Box::new(SerpApiProvider::new(&config.search));
        Self::with_search_provider(config, provider)
    }

    /// Build with an injected search provider (tests stub it here).
    pub fn with_search_provider(config: &AgentConfig, provider: Box<dyn SearchProvider>) -> Self {
        let guardrail = CalculationGuardrail::with_bound(config.calc.magnitude_bound);
        Self {
            llm: OllamaClient::new(&config.llm),
            search: SearchRouter::new(provider, &config.search),
            coordinator: RagExtractionCoordinator::new(guardrail.clone()),
            guardrail,
            catalog: ToolCatalog::standard(),
        }
    }

    /// Resolve one query to answer text.
    pub async fn run(&self, query: &str) -> Result<String, AgentError> {
        let decision = classify(query)?;
        info!(
            class = decision.class.description(),
            priority = decision.priority,
            reason = %decision.match_reason,
            "query classified"
        );

        match decision.class {
            QueryClass::Arithmetic => self.arithmetic_answer(query),
            QueryClass::GuardedSearchCalculation => {
                let conversion = self.coordinator.resolve(query, &self.search).await?;
                Ok(render_conversion(&conversion))
            }
            QueryClass::ForcedSearch => self.forced_search_answer(query).await,
            QueryClass::Knowledge => self.knowledge_answer(query).await,
        }
    }

    fn arithmetic_answer(&self, text: &str) -> Result<String, AgentError> {
        let calculation = self.guardrail.solve_detailed(text, &HashMap::new())?;
        Ok(format!(
            "The result is {} (expression: {})",
            format_amount(calculation.value),
            calculation.expression
        ))
    }

    /// Search, then have the LLM phrase an answer strictly from the
    /// snippets. When the LLM is down the raw snippets are still a
    /// search-derived answer, so degrade to them instead of failing.
    async fn forced_search_answer(&self, query: &str) -> Result<String, AgentError> {
        let raw = self.search.search(query).await?;
        let prompt = format!("Question: {}\nSearch results: {}", query, raw);
        match self
            .llm
            .generate(&prompt, Some(SEARCH_ANSWER_SYSTEM_PROMPT))
            .await
        {
            Ok(answer) if !answer.is_empty() => Ok(answer),
            _ => Ok(raw),
        }
    }

    /// Knowledge fallback: plain generation, with tool-call recovery on
    /// the output. Malformed or incomplete tool intent degrades to the
    /// text itself rather than executing an unsafe call.
    async fn knowledge_answer(&self, query: &str) -> Result<String, AgentError> {
        let output = self
            .llm
            .generate(query, Some(KNOWLEDGE_SYSTEM_PROMPT))
            .await?;

        match toolcall::recover(&output, &self.catalog) {
            Ok(invocation) => self.execute_tool(invocation).await,
            Err(AgentError::NoToolCallFound) | Err(AgentError::IncompleteToolCall { .. }) => {
                Ok(output)
            }
            Err(e) => Err(e),
        }
    }

    async fn execute_tool(&self, invocation: ToolInvocation) -> Result<String, AgentError> {
        info!(tool = %invocation.name, "executing recovered tool call");
        match invocation.name.as_str() {
            "calculate" => {
                // Required argument presence was validated by recovery.
                let expression = invocation
                    .str_arg("expression")
                    .ok_or(AgentError::IncompleteToolCall {
                        tool: "calculate".to_string(),
                        argument: "expression".to_string(),
                    })?;
                self.arithmetic_answer(expression)
            }
            "web_search" => {
                let query = invocation
                    .str_arg("query")
                    .ok_or(AgentError::IncompleteToolCall {
                        tool: "web_search".to_string(),
                        argument: "query".to_string(),
                    })?;
                self.forced_search_answer(query).await
            }
            // Unreachable past catalog validation.
            other => {
                info!(tool = other, "unknown tool after validation");
                Err(AgentError::NoToolCallFound)
            }
        }
    }
}

fn render_conversion(conversion: &Conversion) -> String {
    let from = conversion.from.unwrap_or("the source unit");
    match conversion.to {
        Some(to) if conversion.rate_only => format!(
            "The current rate is {} {} per 1 {}.",
            format_currency(conversion.rate.value),
            to,
            from
        ),
        Some(to) => format!(
            "At the current rate, {} {} is {} {} (rate: {}, expression: {})",
            format_amount(conversion.amount),
            from,
            format_currency(conversion.value),
            to,
            conversion.rate.value,
            conversion.expression
        ),
        None => format!(
            "Using the current value {}: {} = {}",
            conversion.rate.value,
            conversion.expression,
            format_currency(conversion.value)
        ),
    }
}

/// Comma-grouped display: integers bare, fractions at two decimals.
pub fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        group_digits(&format!("{}", value.abs() as i64), value < 0.0)
    } else {
        format_currency(value)
    }
}

/// Comma-grouped with two decimals always shown.
pub fn format_currency(value: f64) -> String {
    let formatted = format!("{:.2}", value.abs());
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((&formatted, "00"));
    format!("{}.{}", group_digits(int_part, value < 0.0), frac_part)
}

fn group_digits(digits: &str, negative: bool) -> String {
    let mut grouped = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if negative {
        format!("-{}", grouped)
    } else {
        grouped
    }
}
