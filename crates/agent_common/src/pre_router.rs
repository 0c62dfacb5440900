//! Deterministic priority routing, BEFORE any LLM call.
//!
//! Classification is an ordered battery of keyword/pattern detectors; the
//! first match wins and nothing downstream may override it. Calculations
//! and current-fact lookups are therefore decided by rules the tests can
//! pin down, never by model output.
//!
//! Detector order (priority value, smaller = checked earlier):
//!   0.5  currency conversion  -> guarded search + calculation
//!   1.0  arithmetic           -> calculation guardrail
//!   1.5  recency / live fact  -> forced search
//!   2.0  default              -> knowledge (plain LLM generation)

use serde::{Deserialize, Serialize};

use crate::error::AgentError;
use crate::numeric::NumericNormalizer;

/// Resolution strategy for one query. Computed once, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryClass {
    /// Pure arithmetic, symbolic or in operator words.
    Arithmetic,
    /// Needs live data; answer must come from search-derived text.
    ForcedSearch,
    /// Needs live data AND a calculation on top of it (currency conversion).
    GuardedSearchCalculation,
    /// Anything else: the LLM's own knowledge is acceptable.
    Knowledge,
}

impl QueryClass {
    pub fn description(&self) -> &'static str {
        match self {
            QueryClass::Arithmetic => "deterministic arithmetic",
            QueryClass::ForcedSearch => "live web search",
            QueryClass::GuardedSearchCalculation => "search then calculate",
            QueryClass::Knowledge => "knowledge generation",
        }
    }
}

/// Priority weights. The value is the guardrail number: smallest is
/// checked first and overrides everything after it.
pub const PRIORITY_CURRENCY: f32 = 0.5;
pub const PRIORITY_ARITHMETIC: f32 = 1.0;
pub const PRIORITY_RECENCY: f32 = 1.5;
pub const PRIORITY_KNOWLEDGE: f32 = 2.0;

/// Routing decision for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub class: QueryClass,
    pub priority: f32,
    /// Why this class matched (for debug output).
    pub match_reason: String,
}

/// Classify a query. Pure and deterministic; empty input is the only
/// failure mode.
pub fn classify(query: &str) -> Result<RoutingDecision, AgentError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AgentError::InvalidQuery);
    }

    let lower = trimmed.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '$' && c != '¥' && c != '€' && c != '£')
        .filter(|w| !w.is_empty())
        .collect();

    // 1. Currency conversion - must win over both arithmetic and recency,
    //    since the rate is live data and the math must not be guessed.
    if is_currency_conversion(&lower, &words) {
        return Ok(RoutingDecision {
            class: QueryClass::GuardedSearchCalculation,
            priority: PRIORITY_CURRENCY,
            match_reason: "matched two currency units".to_string(),
        });
    }

    // 2. Arithmetic - symbolic operators or operator words plus a numeric
    //    operand.
    if is_arithmetic_query(&lower, &words) {
        return Ok(RoutingDecision {
            class: QueryClass::Arithmetic,
            priority: PRIORITY_ARITHMETIC,
            match_reason: "matched arithmetic operators with numbers".to_string(),
        });
    }

    // 3. Recency - the answer can go stale, so the LLM's knowledge is off
    //    limits.
    if is_recency_query(&lower, &words) {
        return Ok(RoutingDecision {
            class: QueryClass::ForcedSearch,
            priority: PRIORITY_RECENCY,
            match_reason: "matched recency/live-fact keywords".to_string(),
        });
    }

    // 4. Default: knowledge generation.
    Ok(RoutingDecision {
        class: QueryClass::Knowledge,
        priority: PRIORITY_KNOWLEDGE,
        match_reason: "no deterministic match".to_string(),
    })
}

// =============================================================================
// Detectors
// =============================================================================

/// Currency unit lexicon. Word match on any alias counts the family once.
const CURRENCY_FAMILIES: &[(&str, &[&str])] = &[
    ("USD", &["dollar", "dollars", "usd", "$"]),
    ("JPY", &["yen", "jpy", "¥"]),
    ("EUR", &["euro", "euros", "eur", "€"]),
    ("GBP", &["pound", "pounds", "sterling", "gbp", "£"]),
];

/// Currency families mentioned in the query, in declaration order.
/// Word aliases match whole words; symbol aliases ("$") match anywhere.
pub fn currency_families(lower: &str, words: &[&str]) -> Vec<&'static str> {
    let mut found = Vec::new();
    for (code, aliases) in CURRENCY_FAMILIES {
        let hit = aliases.iter().any(|a| {
            if a.chars().all(|c| c.is_alphanumeric()) {
                words.contains(a)
            } else {
                lower.contains(a)
            }
        });
        if hit {
            found.push(*code);
        }
    }
    found
}

fn is_currency_conversion(lower: &str, words: &[&str]) -> bool {
    let families = currency_families(lower, words);
    if families.len() >= 2 {
        return true;
    }
    // Single unit still counts when the conversion intent is explicit.
    !families.is_empty() && (lower.contains("exchange rate") || lower.contains("convert"))
}

/// Operator words that flag a calculation. Single words are matched on
/// word boundaries so "surplus" does not trip "plus".
const OPERATOR_WORDS: &[&str] = &[
    "plus",
    "minus",
    "times",
    "added",
    "subtracted",
    "multiplied",
    "divided",
    "modulo",
];

const OPERATOR_PHRASES: &[&str] = &["percent of", "sum of", "difference between", "divided by"];

fn is_arithmetic_query(lower: &str, words: &[&str]) -> bool {
    let has_numbers = NumericNormalizer::new().first(lower).is_some();
    if !has_numbers {
        return false;
    }

    // Symbolic form: an operator between two numeric operands.
    if has_symbolic_operator(lower) {
        return true;
    }

    if OPERATOR_WORDS.iter().any(|w| words.contains(w)) {
        return true;
    }
    OPERATOR_PHRASES.iter().any(|p| lower.contains(p))
}

fn has_symbolic_operator(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if !matches!(b, b'+' | b'-' | b'*' | b'/' | b'%') {
            continue;
        }
        let before = bytes[..i].iter().rev().find(|c| !c.is_ascii_whitespace());
        let after = bytes[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
        let lhs_numeric = before.map(|c| c.is_ascii_digit() || *c == b')').unwrap_or(false);
        let rhs_numeric = after
            .map(|c| c.is_ascii_digit() || *c == b'(')
            .unwrap_or(false);
        if lhs_numeric && rhs_numeric {
            return true;
        }
    }
    false
}

const RECENCY_KEYWORDS: &[&str] = &[
    "current",
    "currently",
    "latest",
    "right now",
    "today",
    "tonight",
    "this week",
    "this year",
    "as of now",
    "breaking",
    "prime minister",
    "president",
    "price of",
    "stock price",
    "exchange rate",
    "weather",
    "news",
    "who is",
    "who won",
    "when is",
    "when did",
    "happening",
];

fn is_recency_query(lower: &str, _words: &[&str]) -> bool {
    RECENCY_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

// =============================================================================
// Tests
// =============================================================================
