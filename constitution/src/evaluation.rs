//! Evaluation of a constitutional check.

use crate::types::{ConstitutionalCheck, Principle};

/// Result of evaluating a [`ConstitutionalCheck`].
///
/// Displays as the comma-separated list of failing principles with the
/// reviewer's reasoning, e.g. `agency (tells the user what to do)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    failing: Vec<(Principle, String)>,
}

impl CheckOutcome {
    /// Whether every principle passed.
    pub fn passed(&self) -> bool {
        self.failing.is_empty()
    }

    /// Principles that failed, in rendering order.
    pub fn failing(&self) -> impl Iterator<Item = Principle> + '_ {
        self.failing.iter().map(|(p, _)| *p)
    }
}

impl std::fmt::Display for CheckOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.failing.is_empty() {
            return f.write_str("all principles pass");
        }

        let parts: Vec<String> = self
            .failing
            .iter()
            .map(|(p, reasoning)| {
                if reasoning.trim().is_empty() {
                    p.to_string()
                } else {
                    format!("{} ({})", p, reasoning.trim())
                }
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}

impl ConstitutionalCheck {
    /// Evaluate all four verdicts.
    pub fn evaluate(&self) -> CheckOutcome {
        let failing = self
            .verdicts()
            .filter(|(_, v)| !v.passes)
            .map(|(p, v)| (p, v.reasoning.clone()))
            .collect();

        CheckOutcome { failing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrincipleVerdict;

    #[test]
    fn test_passing_outcome() {
        let outcome = ConstitutionalCheck::all_passing("ok").evaluate();
        assert!(outcome.passed());
        assert_eq!(outcome.failing().count(), 0);
        assert_eq!(outcome.to_string(), "all principles pass");
    }

    #[test]
    fn test_failing_outcome_lists_principles_in_order() {
        let mut check = ConstitutionalCheck::all_passing("ok");
        check.growth = PrincipleVerdict::fail("creates dependency");
        check.elevation = PrincipleVerdict::fail("");

        let outcome = check.evaluate();
        assert!(!outcome.passed());
        assert_eq!(
            outcome.failing().collect::<Vec<_>>(),
            vec![Principle::Elevation, Principle::Growth]
        );
        assert_eq!(outcome.to_string(), "elevation, growth (creates dependency)");
    }
}
