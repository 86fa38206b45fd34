//! Core types for constitutional checks.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for consistency with the review dashboard.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// The four principles every prompt update is checked against.
///
/// Order is significant: it is the order verdicts are rendered in audit
/// commits and review summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Principle {
    /// Raises the quality of guidance rather than lowering the bar
    Elevation,
    /// Keeps the assistant honest about its nature and limits
    Transparency,
    /// Leaves decisions with the user
    Agency,
    /// Supports the user's long-term development
    Growth,
}

impl Principle {
    /// Get string representation for messages and commit bodies
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elevation => "elevation",
            Self::Transparency => "transparency",
            Self::Agency => "agency",
            Self::Growth => "growth",
        }
    }

    /// One-line description shown to reviewers
    pub fn description(&self) -> &'static str {
        match self {
            Self::Elevation => "Does the change raise the quality of the guidance?",
            Self::Transparency => "Does the assistant stay honest about what it knows and is?",
            Self::Agency => "Does the user keep ownership of their decisions?",
            Self::Growth => "Does the change support the user's long-term development?",
        }
    }

    /// All principles in rendering order
    pub fn all() -> [Self; 4] {
        [Self::Elevation, Self::Transparency, Self::Agency, Self::Growth]
    }
}

impl std::fmt::Display for Principle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reviewer's verdict on a single principle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct PrincipleVerdict {
    /// Whether the proposal satisfies the principle
    pub passes: bool,
    /// Why the reviewer decided so
    pub reasoning: String,
}

impl PrincipleVerdict {
    /// A passing verdict.
    pub fn pass(reasoning: impl Into<String>) -> Self {
        Self {
            passes: true,
            reasoning: reasoning.into(),
        }
    }

    /// A failing verdict.
    pub fn fail(reasoning: impl Into<String>) -> Self {
        Self {
            passes: false,
            reasoning: reasoning.into(),
        }
    }

    /// Glyph used in audit commit bodies.
    pub fn glyph(&self) -> char {
        if self.passes {
            '✓'
        } else {
            '✗'
        }
    }
}

/// The four constitutional verdicts attached to a proposed update.
///
/// All four fields are required on the wire; a payload missing any of
/// them fails to deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ConstitutionalCheck {
    pub elevation: PrincipleVerdict,
    pub transparency: PrincipleVerdict,
    pub agency: PrincipleVerdict,
    pub growth: PrincipleVerdict,
}

impl ConstitutionalCheck {
    /// A check where every principle passes with the same reasoning.
    pub fn all_passing(reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        Self {
            elevation: PrincipleVerdict::pass(reasoning.clone()),
            transparency: PrincipleVerdict::pass(reasoning.clone()),
            agency: PrincipleVerdict::pass(reasoning.clone()),
            growth: PrincipleVerdict::pass(reasoning),
        }
    }

    /// Get the verdict for one principle.
    pub fn verdict(&self, principle: Principle) -> &PrincipleVerdict {
        match principle {
            Principle::Elevation => &self.elevation,
            Principle::Transparency => &self.transparency,
            Principle::Agency => &self.agency,
            Principle::Growth => &self.growth,
        }
    }

    /// Mutable access to one verdict.
    pub fn verdict_mut(&mut self, principle: Principle) -> &mut PrincipleVerdict {
        match principle {
            Principle::Elevation => &mut self.elevation,
            Principle::Transparency => &mut self.transparency,
            Principle::Agency => &mut self.agency,
            Principle::Growth => &mut self.growth,
        }
    }

    /// Iterate verdicts in rendering order.
    pub fn verdicts(&self) -> impl Iterator<Item = (Principle, &PrincipleVerdict)> {
        Principle::all().into_iter().map(move |p| (p, self.verdict(p)))
    }

    /// Whether every principle passes.
    pub fn all_pass(&self) -> bool {
        self.verdicts().all(|(_, v)| v.passes)
    }

    /// Render verdicts as `✓ elevation ✓ transparency ✗ agency ✓ growth`.
    pub fn glyph_summary(&self) -> String {
        self.verdicts()
            .map(|(p, v)| format!("{} {}", v.glyph(), p))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principle_order() {
        let all = Principle::all();
        assert_eq!(all[0], Principle::Elevation);
        assert_eq!(all[3], Principle::Growth);
        assert!(Principle::Elevation < Principle::Growth);
    }

    #[test]
    fn test_all_pass() {
        let mut check = ConstitutionalCheck::all_passing("fine");
        assert!(check.all_pass());

        *check.verdict_mut(Principle::Agency) = PrincipleVerdict::fail("prescriptive");
        assert!(!check.all_pass());
        assert!(!check.verdict(Principle::Agency).passes);
    }

    #[test]
    fn test_glyph_summary() {
        let mut check = ConstitutionalCheck::all_passing("ok");
        check.transparency = PrincipleVerdict::fail("hides limits");

        assert_eq!(
            check.glyph_summary(),
            "✓ elevation ✗ transparency ✓ agency ✓ growth"
        );
    }

    #[test]
    fn test_missing_sub_check_rejected() {
        let json = r#"{
            "elevation": {"passes": true, "reasoning": "a"},
            "transparency": {"passes": true, "reasoning": "b"},
            "agency": {"passes": true, "reasoning": "c"}
        }"#;

        let parsed: Result<ConstitutionalCheck, _> = serde_json::from_str(json);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_principle_wire_names() {
        let json = serde_json::to_string(&Principle::Transparency).unwrap();
        assert_eq!(json, "\"transparency\"");
    }
}
