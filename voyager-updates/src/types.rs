//! Wire types shared by the validator, applier and review service.
//!
//! Field names follow the camelCase schema produced by the knowledge
//! extractor and consumed by the review dashboard.

use serde::{Deserialize, Serialize};

use constitution::ConstitutionalCheck;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Reviewer-facing priority of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Estimated blast radius of applying a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Extractor confidence in a proposal, always within `0..=100`.
///
/// Out-of-range values are rejected at deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Confidence(u8);

impl Confidence {
    pub const MAX: u8 = 100;

    /// Create a confidence score, returning `None` when above 100.
    pub fn new(value: u8) -> Option<Self> {
        (value <= Self::MAX).then_some(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Confidence {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(Self::new)
            .ok_or_else(|| format!("confidence must be within 0..=100, got {value}"))
    }
}

impl From<Confidence> for u8 {
    fn from(confidence: Confidence) -> Self {
        confidence.0
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// A single suggested edit to one field of a community configuration.
///
/// Immutable once created; approval and rejection are tracked by index on
/// the owning [`ExtractionSession`](crate::session::ExtractionSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ProposedUpdate {
    /// Dot-delimited path from the document root to the target field
    pub section: String,
    /// Text appended to the target field
    pub suggested_addition: String,
    /// Why the extractor proposes this change
    #[serde(default)]
    pub reasoning: String,
    pub priority: Priority,
    pub constitutional_check: ConstitutionalCheck,
    #[cfg_attr(feature = "typescript", ts(type = "number"))]
    pub confidence: Confidence,
    /// Excerpt of the conversation supporting the change
    #[serde(default)]
    pub evidence_from_session: String,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub risk_reasoning: String,
    /// Whether the extractor considers this safe to apply unattended
    #[serde(default)]
    pub auto_apply_recommendation: bool,
}

/// How an apply was triggered. Recorded in the audit commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    /// A reviewer approved this proposal
    Manual,
    /// The batch auto-apply selector picked it
    Automatic,
}

impl ApplyMode {
    pub fn is_automatic(&self) -> bool {
        matches!(self, Self::Automatic)
    }
}

/// Outcome of one apply invocation, as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ApplyResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Identifier of the audit commit recording the change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

impl ApplyResult {
    pub fn applied(commit_id: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            commit_id: Some(commit_id.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            commit_id: None,
        }
    }
}

/// Aggregate outcome of a batch auto-apply run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct AppliedSummary {
    /// True only when no eligible proposal failed
    pub success: bool,
    /// Number of proposals applied in this run
    pub applied: usize,
    /// Number of proposals that met the auto-apply bar
    pub eligible: usize,
    /// One message per failed proposal, prefixed with its index
    pub errors: Vec<String>,
}
