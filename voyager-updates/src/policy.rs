//! Tunables for the applier and the unattended auto-apply path.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Confidence, ProposedUpdate};

/// Lowest confidence the batch selector will apply unattended.
pub const DEFAULT_AUTO_APPLY_MIN_CONFIDENCE: u8 = 90;

/// Evidence excerpt length in audit commit messages.
pub const DEFAULT_EVIDENCE_EXCERPT_CHARS: usize = 200;

/// Engine-side policy, mirrored by the `[policy]` table of `voyager.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default = "default_min_confidence")]
    pub auto_apply_min_confidence: u8,
    #[serde(default = "default_excerpt_chars")]
    pub evidence_excerpt_chars: usize,
}

fn default_min_confidence() -> u8 {
    DEFAULT_AUTO_APPLY_MIN_CONFIDENCE
}

fn default_excerpt_chars() -> usize {
    DEFAULT_EVIDENCE_EXCERPT_CHARS
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            auto_apply_min_confidence: default_min_confidence(),
            evidence_excerpt_chars: default_excerpt_chars(),
        }
    }
}

/// Eligibility rule for unattended application.
///
/// Strictly stronger than manual validation: confidence at or above the
/// floor, the extractor recommends auto-apply, and every constitutional
/// check passes.
#[derive(Debug, Clone, Copy)]
pub struct AutoApplyPolicy {
    min_confidence: u8,
}

impl AutoApplyPolicy {
    /// Floors above 100 are clamped. Floors below the default are honored
    /// but logged, since they let weaker proposals through unattended.
    pub fn new(min_confidence: u8) -> Self {
        let policy = Self {
            min_confidence: min_confidence.min(Confidence::MAX),
        };
        if policy.is_relaxed() {
            warn!(
                min_confidence = policy.min_confidence,
                default = DEFAULT_AUTO_APPLY_MIN_CONFIDENCE,
                "Auto-apply floor is below the default"
            );
        }
        policy
    }

    pub fn min_confidence(&self) -> u8 {
        self.min_confidence
    }

    /// Whether the floor is below [`DEFAULT_AUTO_APPLY_MIN_CONFIDENCE`].
    pub fn is_relaxed(&self) -> bool {
        self.min_confidence < DEFAULT_AUTO_APPLY_MIN_CONFIDENCE
    }

    pub fn is_eligible(&self, update: &ProposedUpdate) -> bool {
        update.confidence.value() >= self.min_confidence
            && update.auto_apply_recommendation
            && update.constitutional_check.all_pass()
    }
}

impl Default for AutoApplyPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_AUTO_APPLY_MIN_CONFIDENCE)
    }
}

impl From<&PolicyConfig> for AutoApplyPolicy {
    fn from(config: &PolicyConfig) -> Self {
        Self::new(config.auto_apply_min_confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::proposal;
    use constitution::{Principle, PrincipleVerdict};

    #[test]
    fn test_threshold_is_inclusive() {
        let policy = AutoApplyPolicy::default();
        assert!(policy.is_eligible(&proposal("a", "x", 90)));
        assert!(!policy.is_eligible(&proposal("a", "x", 89)));
        assert!(!policy.is_eligible(&proposal("a", "x", 85)));
    }

    #[test]
    fn test_requires_recommendation() {
        let mut update = proposal("a", "x", 99);
        update.auto_apply_recommendation = false;
        assert!(!AutoApplyPolicy::default().is_eligible(&update));
    }

    #[test]
    fn test_requires_all_checks() {
        let mut update = proposal("a", "x", 99);
        *update.constitutional_check.verdict_mut(Principle::Growth) =
            PrincipleVerdict::fail("Creates dependency");
        assert!(!AutoApplyPolicy::default().is_eligible(&update));
    }

    #[test]
    fn test_policy_config_defaults() {
        let config: PolicyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PolicyConfig::default());
        assert_eq!(AutoApplyPolicy::from(&config).min_confidence(), 90);
        assert_eq!(AutoApplyPolicy::new(250).min_confidence(), 100);
    }

    #[test]
    fn test_relaxed_floor_is_flagged_but_honored() {
        assert!(!AutoApplyPolicy::default().is_relaxed());
        assert!(!AutoApplyPolicy::new(95).is_relaxed());

        let relaxed = AutoApplyPolicy::new(80);
        assert!(relaxed.is_relaxed());
        assert!(relaxed.is_eligible(&proposal("a", "x", 85)));
        assert!(!relaxed.is_eligible(&proposal("a", "x", 79)));
    }
}
