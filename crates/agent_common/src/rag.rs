//! Search-then-calculate coordination for guarded queries.
//!
//! Currency conversion is the canonical case: the rate is live data, the
//! math must be exact, and an LLM is unreliable at both. The coordinator
//! chains search -> numeric extraction -> substitution -> guarded
//! evaluation, and every step is mechanical — the LLM never sees or
//! alters the extracted number.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::calc::CalculationGuardrail;
use crate::error::AgentError;
use crate::expression::Expression;
use crate::numeric::{NumericNormalizer, NumericToken};
use crate::pre_router::currency_families;
use crate::search::SearchRouter;

/// Outcome of one guarded search-and-calculate resolution.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// Amount resolved from the query: its own arithmetic evaluated when
    /// it carries any ("100 dollars times 2" -> 200), else the first
    /// numeric token, else 1.
    pub amount: f64,
    /// The rate recovered from search text.
    pub rate: NumericToken,
    /// Rounded final value (amount * rate).
    pub value: f64,
    /// The expression that was actually evaluated.
    pub expression: Expression,
    /// Sub-query sent to the search collaborator.
    pub subquery: String,
    /// Currency pair when one was recognized.
    pub from: Option<&'static str>,
    pub to: Option<&'static str>,
    /// The query asked for the unit rate itself, not a converted amount.
    pub rate_only: bool,
}

pub struct RagExtractionCoordinator {
    normalizer: NumericNormalizer,
    guardrail: CalculationGuardrail,
    strip_re: regex::Regex,
}

impl RagExtractionCoordinator {
    pub fn new(guardrail: CalculationGuardrail) -> Self {
        Self {
            normalizer: NumericNormalizer::new(),
            guardrail,
            strip_re: regex::Regex::new(
                r"(?i)\b(plus|minus|times|divided|multiplied|added|subtracted|by|percent)\b|[\d,.]+",
            )
            .unwrap(),
        }
    }

    /// Resolve a guarded search-and-calculate query. Each step is a hard
    /// dependency on the previous one succeeding; failures surface typed
    /// rather than falling back to a guessed number.
    pub async fn resolve(
        &self,
        query: &str,
        search: &SearchRouter,
    ) -> Result<Conversion, AgentError> {
        // Step 1: derive the fact-lookup sub-query.
        let plan = self.derive_subquery(query);
        info!(subquery = %plan.subquery, "rag step 1: sub-query derived");

        // Step 2: live search.
        let raw = search.search(&plan.subquery).await?;

        // Step 3: mechanical numeric extraction from untrusted text.
        let rate = select_rate(&self.normalizer, &raw).ok_or_else(|| {
            warn!("rag step 3: no usable numeric token in search result");
            AgentError::ExtractionFailed
        })?;
        info!(rate = rate.value, surface = %rate.surface, "rag step 3: rate extracted");

        // Step 4: substitute into the query's arithmetic portion. A query
        // like "100 dollars times 2 in yen" keeps its own operators: the
        // query side is evaluated first and only then scaled by the rate.
        let amount = match self.guardrail.solve(query) {
            Ok(value) => value,
            Err(AgentError::UnparsableExpression(_)) => plan.amount.unwrap_or(1.0),
            Err(e) => return Err(e),
        };
        let mut substitutions = HashMap::new();
        substitutions.insert("rate".to_string(), rate.value);
        let text = format!("{} * rate", amount);

        // Step 5: guarded evaluation and rounding.
        let calculation = self.guardrail.solve_detailed(&text, &substitutions)?;
        info!(value = calculation.value, "rag step 5: calculated");

        Ok(Conversion {
            amount,
            rate,
            value: calculation.value,
            expression: calculation.expression,
            subquery: plan.subquery,
            from: plan.from,
            to: plan.to,
            rate_only: amount == 1.0,
        })
    }

    /// Strip the calculation portion, keep the fact-lookup portion.
    ///
    /// For a recognized currency pair the sub-query is canonical
    /// ("USD to JPY exchange rate"); the FROM side is the unit the amount
    /// is attached to. Without a pair, operator words and numbers are
    /// removed and the remainder is searched as-is.
    fn derive_subquery(&self, query: &str) -> SubqueryPlan {
        let lower = query.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '$' && c != '¥' && c != '€' && c != '£')
            .filter(|w| !w.is_empty())
            .collect();

        let amount_token = self.normalizer.first(&lower);
        let amount = amount_token.as_ref().map(|t| t.value);

        let families = currency_families(&lower, &words);
        if !families.is_empty() {
            let (from, to) = orient_pair(&lower, &families, amount_token.as_ref());
            let subquery = match to {
                Some(to) => format!("{} to {} exchange rate", from, to),
                None => format!("{} exchange rate", from),
            };
            return SubqueryPlan {
                subquery,
                amount,
                from: Some(from),
                to,
            };
        }

        // Generic guarded query: drop numbers and operator words, search
        // the rest.
        let stripped = self.strip_re.replace_all(query, " ");
        let cleaned = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
        SubqueryPlan {
            subquery: if cleaned.is_empty() {
                query.to_string()
            } else {
                cleaned
            },
            amount,
            from: None,
            to: None,
        }
    }
}

struct SubqueryPlan {
    subquery: String,
    amount: Option<f64>,
    from: Option<&'static str>,
    to: Option<&'static str>,
}

/// Decide which side of the pair the amount belongs to: the family whose
/// alias appears closest after the amount is the FROM unit.
fn orient_pair<'q>(
    lower: &'q str,
    families: &[&'static str],
    amount: Option<&NumericToken>,
) -> (&'static str, Option<&'static str>) {
    if families.len() < 2 {
        return (families[0], None);
    }

    let amount_pos = amount
        .and_then(|t| lower.find(t.surface.trim_start_matches('-')))
        .unwrap_or(0);

    let mut best: Option<(usize, &'static str)> = None;
    for family in families {
        if let Some(pos) = family_position(lower, family) {
            if pos >= amount_pos {
                match best {
                    Some((best_pos, _)) if best_pos <= pos => {}
                    _ => best = Some((pos, family)),
                }
            }
        }
    }

    let from = best.map(|(_, f)| f).unwrap_or(families[0]);
    let to = families.iter().copied().find(|f| *f != from);
    (from, to)
}

fn family_position(lower: &str, family: &str) -> Option<usize> {
    let aliases: &[&str] = match family {
        "USD" => &["dollar", "usd", "$"],
        "JPY" => &["yen", "jpy", "¥"],
        "EUR" => &["euro", "eur", "€"],
        "GBP" => &["pound", "sterling", "gbp", "£"],
        _ => return None,
    };
    aliases.iter().filter_map(|a| lower.find(a)).min()
}

/// Pick the numeric token most plausible as a rate: first exact token
/// with a decimal point, else an exact token that is not a bare small
/// integer (the "1" in "1 USD = 157.3 JPY"), else any exact token, else
/// the first best-effort one.
fn select_rate(normalizer: &NumericNormalizer, text: &str) -> Option<NumericToken> {
    let tokens = normalizer.extract_all(text);
    if tokens.is_empty() {
        return None;
    }

    tokens
        .iter()
        .find(|t| t.is_exact() && t.has_decimal_point())
        .or_else(|| tokens.iter().find(|t| t.is_exact() && t.value.abs() >= 10.0))
        .or_else(|| tokens.iter().find(|t| t.is_exact()))
        .or_else(|| tokens.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::search::SearchProvider;
    use async_trait::async_trait;

    struct StubProvider {
        response: &'static str,
    }

    #[async_trait]
    impl SearchProvider for StubProvider {
        async fn search(&self, _query: &str) -> Result<String, AgentError> {
            Ok(self.response.to_string())
        }
    }

    fn stub_router(response: &'static str) -> SearchRouter {
        SearchRouter::new(
            Box::new(StubProvider { response }),
            &SearchConfig {
                serpapi_key: "test".to_string(),
                timeout_secs: 1,
                retry_once: false,
                retry_backoff_ms: 1,
            },
        )
    }

    fn coordinator() -> RagExtractionCoordinator {
        RagExtractionCoordinator::new(CalculationGuardrail::new())
    }

    #[tokio::test]
    async fn test_usd_to_jpy_conversion() {
        let router = stub_router("1 USD = 157.3 JPY");
        let conversion = coordinator()
            .resolve("How many Japanese Yen is 100 US Dollars right now?", &router)
            .await
            .unwrap();
        assert_eq!(conversion.amount, 100.0);
        assert_eq!(conversion.rate.value, 157.3);
        assert_eq!(conversion.value, 15730.0);
        assert_eq!(conversion.subquery, "USD to JPY exchange rate");
        assert_eq!(conversion.from, Some("USD"));
        assert_eq!(conversion.to, Some("JPY"));
        assert!(!conversion.rate_only);
    }

    #[tokio::test]
    async fn test_rate_extraction_prefers_decimal_over_leading_one() {
        let router = stub_router("1 USD equals 157.3 JPY as of today");
        let conversion = coordinator()
            .resolve("10 dollars in yen", &router)
            .await
            .unwrap();
        assert_eq!(conversion.rate.value, 157.3);
        assert_eq!(conversion.value, 1573.0);
    }

    #[tokio::test]
    async fn test_integer_rate_fallback() {
        // No decimal in the snippet; falls back to the plausible integer.
        let router = stub_router("1 dollar is about 157 yen");
        let conversion = coordinator()
            .resolve("100 dollars in yen", &router)
            .await
            .unwrap();
        assert_eq!(conversion.rate.value, 157.0);
        assert_eq!(conversion.value, 15700.0);
    }

    #[tokio::test]
    async fn test_extraction_failure_is_typed() {
        let router = stub_router("markets were closed and no figures were published");
        let err = coordinator()
            .resolve("100 dollars in yen", &router)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ExtractionFailed));
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        struct Down;
        #[async_trait]
        impl SearchProvider for Down {
            async fn search(&self, _query: &str) -> Result<String, AgentError> {
                Err(AgentError::SearchUnavailable("offline".to_string()))
            }
        }
        let router = SearchRouter::new(
            Box::new(Down),
            &SearchConfig {
                retry_once: false,
                ..SearchConfig::default()
            },
        );
        let err = coordinator()
            .resolve("100 dollars in yen", &router)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::SearchUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rate_only_query() {
        let router = stub_router("1 USD = 157.3 JPY");
        let conversion = coordinator()
            .resolve("how much is 1 dollar in yen", &router)
            .await
            .unwrap();
        assert!(conversion.rate_only);
        assert_eq!(conversion.value, 157.3);
    }

    #[tokio::test]
    async fn test_query_arithmetic_survives_into_conversion() {
        // The query's own operators scale the amount before the rate is
        // applied, instead of being dropped.
        let router = stub_router("1 USD = 157.3 JPY");
        let conversion = coordinator()
            .resolve("100 dollars times 2 in yen", &router)
            .await
            .unwrap();
        assert_eq!(conversion.amount, 200.0);
        assert_eq!(conversion.value, 31460.0);
        assert!(!conversion.rate_only);
    }

    #[tokio::test]
    async fn test_symbolic_sum_in_conversion_keeps_grouping() {
        let router = stub_router("1 USD = 157.3 JPY");
        let conversion = coordinator()
            .resolve("100 + 50 dollars in yen", &router)
            .await
            .unwrap();
        assert_eq!(conversion.amount, 150.0);
        assert_eq!(conversion.value, 23595.0);
    }

    #[test]
    fn test_subquery_orientation() {
        let plan = coordinator().derive_subquery("How many Japanese Yen is 100 US Dollars right now?");
        assert_eq!(plan.subquery, "USD to JPY exchange rate");
        assert_eq!(plan.amount, Some(100.0));

        let plan = coordinator().derive_subquery("convert 50 euros to pounds");
        assert_eq!(plan.subquery, "EUR to GBP exchange rate");
    }

    #[test]
    fn test_generic_subquery_strips_arithmetic() {
        let plan = coordinator().derive_subquery("20 times the height of everest in meters");
        assert_eq!(plan.subquery, "the height of everest in meters");
        assert_eq!(plan.amount, Some(20.0));
    }
}
