//! Numeric token extraction from untrusted free text.
//!
//! Search snippets and user queries both pass through here before any
//! number in them is trusted. Handles currency symbols, thousands
//! separators, decimal points and scale words ("2.5 million").

use serde::{Deserialize, Serialize};

/// How sure we are that a token means what it looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// Unambiguous numeric literal.
    Exact,
    /// Adjacent punctuation made the reading ambiguous (e.g. the dash in
    /// "5-10" could be a range or a minus sign).
    BestEffort,
}

/// A number recovered from free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericToken {
    /// Original surface form, scale word included ("15,564.20", "2.5 million").
    pub surface: String,
    /// Parsed magnitude with separators stripped and scale applied.
    pub value: f64,
    pub confidence: Confidence,
}

impl NumericToken {
    pub fn is_exact(&self) -> bool {
        self.confidence == Confidence::Exact
    }

    /// Whether the surface form carried a decimal point. Decimal-pointed
    /// tokens are the preferred candidates when extracting a rate.
    pub fn has_decimal_point(&self) -> bool {
        self.surface.contains('.')
    }
}

/// Scale words applied to the preceding magnitude as a single token.
const SCALE_WORDS: &[(&str, f64)] = &[
    ("thousand", 1e3),
    ("million", 1e6),
    ("billion", 1e9),
    ("trillion", 1e12),
];

/// Stateless extractor. The regex is compiled once at construction and the
/// extractor can be shared freely between turns.
#[derive(Debug, Clone)]
pub struct NumericNormalizer {
    number_re: regex::Regex,
}

impl NumericNormalizer {
    pub fn new() -> Self {
        // Grouped-thousands form first so "15,564.20" is one match, not three.
        let number_re = regex::Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?").unwrap();
        Self { number_re }
    }

    /// Lazily extract numeric tokens in left-to-right order of appearance.
    ///
    /// Never fails: text without numbers yields an empty sequence and the
    /// caller decides whether that is an error. Calling `extract` again
    /// restarts the scan.
    pub fn extract<'n, 't>(&'n self, text: &'t str) -> NumericTokens<'n, 't> {
        NumericTokens {
            text,
            matches: self.number_re.find_iter(text),
        }
    }

    /// Convenience for callers that want the whole sequence at once.
    pub fn extract_all(&self, text: &str) -> Vec<NumericToken> {
        self.extract(text).collect()
    }

    /// First token of the sequence, if any.
    pub fn first(&self, text: &str) -> Option<NumericToken> {
        self.extract(text).next()
    }
}

impl Default for NumericNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy iterator over the numeric tokens of one piece of text.
pub struct NumericTokens<'n, 't> {
    text: &'t str,
    matches: regex::Matches<'n, 't>,
}

impl Iterator for NumericTokens<'_, '_> {
    type Item = NumericToken;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let m = self.matches.next()?;
            if let Some(token) = build_token(self.text, m.start(), m.end(), m.as_str()) {
                return Some(token);
            }
        }
    }
}

fn build_token(text: &str, start: usize, end: usize, raw: &str) -> Option<NumericToken> {
    let mut value: f64 = raw.replace(',', "").parse().ok()?;
    let mut surface = raw.to_string();
    let mut confidence = Confidence::Exact;

    // Leading dash: a minus sign only when what precedes it could start a
    // number (start of text, whitespace, an operator, an opening paren).
    // Between two digits it is an ambiguous range separator ("5-10"), and
    // glued to a word ("covid-19") it is part of the word.
    if let Some(prev) = text[..start].chars().next_back() {
        if prev == '-' {
            let before_dash = text[..start - prev.len_utf8()].chars().next_back();
            let sign_position = match before_dash {
                None => true,
                Some(c) => {
                    c.is_whitespace() || matches!(c, '+' | '*' | '/' | '%' | '(' | '=' | ':' | ',')
                }
            };
            if sign_position {
                value = -value;
                surface = format!("-{surface}");
            } else {
                confidence = Confidence::BestEffort;
            }
        }
    }

    // Trailing dash glued to another digit marks the left side of a
    // possible range as ambiguous too.
    let mut rest = text[end..].chars();
    if rest.next() == Some('-') && rest.next().map(|c| c.is_ascii_digit()).unwrap_or(false) {
        confidence = Confidence::BestEffort;
    }

    // Scale word directly after the magnitude collapses into one token.
    let tail = text[end..].trim_start();
    for (word, factor) in SCALE_WORDS {
        if starts_with_word(tail, word) {
            value *= factor;
            surface = format!("{surface} {word}");
            break;
        }
    }

    Some(NumericToken {
        surface,
        value,
        confidence,
    })
}

/// Case-insensitive prefix match on a word boundary.
fn starts_with_word(text: &str, word: &str) -> bool {
    if text.len() < word.len() || !text[..word.len()].eq_ignore_ascii_case(word) {
        return false;
    }
    text[word.len()..]
        .chars()
        .next()
        .map(|c| !c.is_alphanumeric())
        .unwrap_or(true)
}
