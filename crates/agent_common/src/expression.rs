//! Natural-language arithmetic parsing and safe evaluation.
//!
//! Text like "10 apples plus 5 oranges" or "20 times the current rate" is
//! rewritten into a strict arithmetic grammar by a fixed operator lexicon.
//! This is a token rewrite, not grammar parsing: operator words map to
//! symbols, numbers are cleaned through the normalizer, every other word
//! is discarded. The resulting `Expression` carries only numeric literals,
//! parentheses and `+ - * / %`, and is the only thing the evaluator sees.

use std::collections::HashMap;
use std::fmt;

use crate::error::AgentError;
use crate::numeric::NumericNormalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinOp {
    fn from_symbol(c: char) -> Option<Self> {
        match c {
            '+' => Some(BinOp::Add),
            '-' => Some(BinOp::Sub),
            '*' => Some(BinOp::Mul),
            '/' => Some(BinOp::Div),
            '%' => Some(BinOp::Rem),
            _ => None,
        }
    }

    fn symbol(&self) -> char {
        match self {
            BinOp::Add => '+',
            BinOp::Sub => '-',
            BinOp::Mul => '*',
            BinOp::Div => '/',
            BinOp::Rem => '%',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprToken {
    Number(f64),
    Op(BinOp),
    LParen,
    RParen,
}

/// A validated arithmetic expression. Invariant: contains only numeric
/// literals, parentheses and allowlisted operators — free text and
/// unresolved placeholders never survive `ExpressionBuilder::build`.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    tokens: Vec<ExprToken>,
}

impl Expression {
    pub fn tokens(&self) -> &[ExprToken] {
        &self.tokens
    }

    /// Evaluate with standard precedence: `* / %` before `+ -`,
    /// left-to-right within a level, parentheses and unary minus honored.
    pub fn eval(&self) -> Result<f64, AgentError> {
        let mut parser = Parser {
            expr: self,
            pos: 0,
        };
        let value = parser.parse_sum()?;
        if parser.pos != self.tokens.len() {
            return Err(AgentError::UnparsableExpression(self.to_string()));
        }
        if !value.is_finite() {
            return Err(AgentError::Overflow(f64::MAX));
        }
        Ok(value)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::with_capacity(self.tokens.len());
        for token in &self.tokens {
            parts.push(match token {
                ExprToken::Number(n) => format_literal(*n),
                ExprToken::Op(op) => op.symbol().to_string(),
                ExprToken::LParen => "(".to_string(),
                ExprToken::RParen => ")".to_string(),
            });
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// Format a literal without float noise: integers bare, fractions as-is.
fn format_literal(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Operator-word lexicon, longest phrase first so "divided by" wins over
/// a later bare-word rule.
const LEXICON: &[(&str, &str)] = &[
    (r"(?i)\bsubtracted\s+from\b", " - "),
    (r"(?i)\bmultiplied\s+by\b", " * "),
    (r"(?i)\bdivided\s+by\b", " / "),
    (r"(?i)\badded\s+to\b", " + "),
    (r"(?i)\bpercent\s+of\b", " * 0.01 * "),
    (r"(?i)%\s*of\b", " * 0.01 * "),
    (r"(?i)\bpercent\b", " * 0.01 "),
    (r"(?i)\bmodulo\b", " % "),
    (r"(?i)\bmod\b", " % "),
    (r"(?i)\btimes\b", " * "),
    (r"(?i)\bplus\b", " + "),
    (r"(?i)\bminus\b", " - "),
    (r"(?i)\bover\b", " / "),
];

/// Rule-based builder from free text to `Expression`.
#[derive(Debug, Clone)]
pub struct ExpressionBuilder {
    normalizer: NumericNormalizer,
    lexicon: Vec<(regex::Regex, &'static str)>,
    token_re: regex::Regex,
    sum_re: regex::Regex,
    difference_re: regex::Regex,
    and_re: regex::Regex,
    word_dash_re: regex::Regex,
}

impl ExpressionBuilder {
    pub fn new() -> Self {
        let lexicon = LEXICON
            .iter()
            .map(|(pattern, replacement)| (regex::Regex::new(pattern).unwrap(), *replacement))
            .collect();
        // Numbers (grouped-thousands form first) or single operator symbols.
        let token_re =
            regex::Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?|[+\-*/%()]").unwrap();
        Self {
            normalizer: NumericNormalizer::new(),
            lexicon,
            token_re,
            sum_re: regex::Regex::new(r"(?i)\b(?:sum|total)\s+of\b").unwrap(),
            difference_re: regex::Regex::new(r"(?i)\bdifference\s+between\b").unwrap(),
            and_re: regex::Regex::new(r"(?i)\band\b").unwrap(),
            word_dash_re: regex::Regex::new(r"([A-Za-z])-(\d)").unwrap(),
        }
    }

    /// Aggregate phrases make "and" an operator: "sum of 3 and 4" joins
    /// its operands with `+`, "difference between 90 and 33" with `-`.
    /// Without such a phrase "and" stays ordinary free text.
    fn aggregate_joiner(&self, text: &str) -> Option<&'static str> {
        if self.difference_re.is_match(text) {
            Some(" - ")
        } else if self.sum_re.is_match(text) {
            Some(" + ")
        } else {
            None
        }
    }

    /// Build a validated expression from free text.
    ///
    /// `substitutions` resolves placeholder words ("rate") to concrete
    /// numbers before validation; a placeholder without a substitution is
    /// simply dropped with the rest of the free text, which makes the
    /// dangling operator fail validation rather than evaluate half an
    /// expression.
    pub fn build(
        &self,
        text: &str,
        substitutions: &HashMap<String, f64>,
    ) -> Result<Expression, AgentError> {
        // A dash glued between a word and a digit ("covid-19") is part of
        // the word, not a minus sign.
        let mut rewritten = self
            .word_dash_re
            .replace_all(text, "$1 $2")
            .into_owned();
        if let Some(joiner) = self.aggregate_joiner(&rewritten) {
            rewritten = self.and_re.replace_all(&rewritten, joiner).into_owned();
        }
        for (re, replacement) in &self.lexicon {
            rewritten = re.replace_all(&rewritten, *replacement).into_owned();
        }
        for (placeholder, value) in substitutions {
            let re = regex::Regex::new(&format!(r"(?i)\b{}\b", regex::escape(placeholder)))
                .map_err(|_| AgentError::UnparsableExpression(text.to_string()))?;
            rewritten = re
                .replace_all(&rewritten, format_literal(*value))
                .into_owned();
        }

        let mut tokens = Vec::new();
        for m in self.token_re.find_iter(&rewritten) {
            let s = m.as_str();
            if let Some(op) = s.chars().next().and_then(BinOp::from_symbol) {
                if s.len() == 1 {
                    tokens.push(ExprToken::Op(op));
                    continue;
                }
            }
            match s {
                "(" => tokens.push(ExprToken::LParen),
                ")" => tokens.push(ExprToken::RParen),
                _ => {
                    // Number: clean separators through the normalizer.
                    let token = self
                        .normalizer
                        .first(s)
                        .ok_or_else(|| AgentError::UnparsableExpression(text.to_string()))?;
                    tokens.push(ExprToken::Number(token.value));
                }
            }
        }

        self.validate(text, tokens)
    }

    fn validate(&self, source: &str, tokens: Vec<ExprToken>) -> Result<Expression, AgentError> {
        let has_number = tokens.iter().any(|t| matches!(t, ExprToken::Number(_)));
        let has_op = tokens.iter().any(|t| matches!(t, ExprToken::Op(_)));
        if !has_number || !has_op {
            return Err(AgentError::UnparsableExpression(source.to_string()));
        }

        let expr = Expression { tokens };

        // Division by a literal zero is rejected at build time.
        for pair in expr.tokens.windows(2) {
            if let [ExprToken::Op(BinOp::Div | BinOp::Rem), ExprToken::Number(n)] = pair {
                if *n == 0.0 {
                    return Err(AgentError::DivisionByZero(expr.to_string()));
                }
            }
        }

        // Structural check: the expression must parse end to end. Runs the
        // same parser the evaluator uses, so nothing slips through here
        // that would fail later. A computed zero divisor is an evaluation
        // failure, not a build failure, and stays for the evaluator.
        match expr.eval() {
            Ok(_) | Err(AgentError::Overflow(_)) | Err(AgentError::DivisionByZero(_)) => Ok(expr),
            Err(_) => Err(AgentError::UnparsableExpression(source.to_string())),
        }
    }
}

impl Default for ExpressionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Recursive-descent evaluator over the validated token stream.
struct Parser<'e> {
    expr: &'e Expression,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&ExprToken> {
        self.expr.tokens.get(self.pos)
    }

    fn parse_sum(&mut self) -> Result<f64, AgentError> {
        let mut value = self.parse_term()?;
        while let Some(ExprToken::Op(op @ (BinOp::Add | BinOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_term()?;
            value = match op {
                BinOp::Add => value + rhs,
                BinOp::Sub => value - rhs,
                _ => unreachable!(),
            };
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> Result<f64, AgentError> {
        let mut value = self.parse_factor()?;
        while let Some(ExprToken::Op(op @ (BinOp::Mul | BinOp::Div | BinOp::Rem))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_factor()?;
            value = match op {
                BinOp::Mul => value * rhs,
                BinOp::Div | BinOp::Rem => {
                    if rhs == 0.0 {
                        return Err(AgentError::DivisionByZero(self.expr.to_string()));
                    }
                    if op == BinOp::Div {
                        value / rhs
                    } else {
                        value % rhs
                    }
                }
                _ => unreachable!(),
            };
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> Result<f64, AgentError> {
        match self.peek() {
            Some(ExprToken::Number(n)) => {
                let n = *n;
                self.pos += 1;
                Ok(n)
            }
            Some(ExprToken::Op(BinOp::Sub)) => {
                // Unary minus.
                self.pos += 1;
                Ok(-self.parse_factor()?)
            }
            Some(ExprToken::LParen) => {
                self.pos += 1;
                let value = self.parse_sum()?;
                match self.peek() {
                    Some(ExprToken::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(AgentError::UnparsableExpression(self.expr.to_string())),
                }
            }
            _ => Err(AgentError::UnparsableExpression(self.expr.to_string())),
        }
    }
}
