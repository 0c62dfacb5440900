//! Calculation guardrail: build, evaluate, bound-check, round.
//!
//! Every number the agent reports from the arithmetic path goes through
//! here. The final rounding is half-away-from-zero at a fixed display
//! precision so raw binary floating-point artifacts never reach the user.

use std::collections::HashMap;

use tracing::debug;

use crate::error::AgentError;
use crate::expression::{Expression, ExpressionBuilder};

/// Display precision in decimal places.
pub const DISPLAY_DECIMALS: u32 = 2;

/// Default magnitude bound; results above it fail with `Overflow`.
pub const DEFAULT_MAGNITUDE_BOUND: f64 = 1e15;

/// A solved calculation: the canonical expression is kept so answers can
/// echo what was actually computed.
#[derive(Debug, Clone)]
pub struct Calculation {
    pub expression: Expression,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct CalculationGuardrail {
    builder: ExpressionBuilder,
    magnitude_bound: f64,
}

impl CalculationGuardrail {
    pub fn new() -> Self {
        Self::with_bound(DEFAULT_MAGNITUDE_BOUND)
    }

    pub fn with_bound(magnitude_bound: f64) -> Self {
        Self {
            builder: ExpressionBuilder::new(),
            magnitude_bound,
        }
    }

    /// Solve a free-text calculation query to a display-rounded number.
    pub fn solve(&self, query: &str) -> Result<f64, AgentError> {
        Ok(self.solve_detailed(query, &HashMap::new())?.value)
    }

    /// Like `solve`, with placeholder substitutions and the canonical
    /// expression retained for display.
    pub fn solve_detailed(
        &self,
        query: &str,
        substitutions: &HashMap<String, f64>,
    ) -> Result<Calculation, AgentError> {
        let expression = self.builder.build(query, substitutions)?;
        let value = self.evaluate(&expression)?;
        debug!(expression = %expression, value, "calculation guardrail solved");
        Ok(Calculation { expression, value })
    }

    /// Evaluate an already-built expression, bound-check and round.
    pub fn evaluate(&self, expression: &Expression) -> Result<f64, AgentError> {
        let raw = expression.eval()?;
        if raw.abs() > self.magnitude_bound {
            return Err(AgentError::Overflow(self.magnitude_bound));
        }
        Ok(round_display(raw, DISPLAY_DECIMALS))
    }
}

impl Default for CalculationGuardrail {
    fn default() -> Self {
        Self::new()
    }
}

/// Round half away from zero at `decimals` places. Idempotent: rounding
/// an already-rounded value is a no-op.
pub fn round_display(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let scaled = value * factor;
    let rounded = if scaled >= 0.0 {
        (scaled + 0.5).floor()
    } else {
        (scaled - 0.5).ceil()
    };
    rounded / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solve_natural_language() {
        let guardrail = CalculationGuardrail::new();
        assert_eq!(guardrail.solve("10 plus 5").unwrap(), 15.0);
        assert_eq!(guardrail.solve("150 plus 25 times 4").unwrap(), 250.0);
    }

    #[test]
    fn test_solve_symbolic() {
        let guardrail = CalculationGuardrail::new();
        assert_eq!(guardrail.solve("2 + 2 * (10 / 5)").unwrap(), 6.0);
    }

    #[test]
    fn test_rounding_to_display_precision() {
        let guardrail = CalculationGuardrail::new();
        assert_eq!(guardrail.solve("10 / 3").unwrap(), 3.33);
        assert_eq!(guardrail.solve("2 / 3").unwrap(), 0.67);
    }

    #[test]
    fn test_errors_propagate() {
        let guardrail = CalculationGuardrail::new();
        assert!(matches!(
            guardrail.solve("100 divided by 0"),
            Err(AgentError::DivisionByZero(_))
        ));
        assert!(matches!(
            guardrail.solve("no math here"),
            Err(AgentError::UnparsableExpression(_))
        ));
    }

    #[test]
    fn test_overflow_bound() {
        let guardrail = CalculationGuardrail::with_bound(1e6);
        assert!(matches!(
            guardrail.solve("2000000 * 2000000"),
            Err(AgentError::Overflow(_))
        ));
        assert!(guardrail.solve("1000 * 1000").is_ok());
    }

    #[test]
    fn test_round_half_away_from_zero() {
        // Exactly-representable half points, so the tie-break itself is
        // what is being tested rather than binary rounding noise.
        assert_eq!(round_display(0.125, 2), 0.13);
        assert_eq!(round_display(-0.125, 2), -0.13);
        assert_eq!(round_display(2.875, 2), 2.88);
        assert_eq!(round_display(2.5, 0), 3.0);
        assert_eq!(round_display(-2.5, 0), -3.0);
        assert_eq!(round_display(1.0, 2), 1.0);
    }

    #[test]
    fn test_rounding_idempotent() {
        for v in [3.33, 0.67, -2.35, 15730.0, 0.0, 123.45] {
            assert_eq!(round_display(v, 2), v);
        }
        let once = round_display(10.0 / 3.0, 2);
        assert_eq!(round_display(once, 2), once);
    }
}
