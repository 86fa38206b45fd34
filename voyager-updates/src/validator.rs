//! Pre-apply acceptance rules for a proposed update.
//!
//! A proposal is eligible for human-approved apply when all four
//! constitutional checks pass and the community has a configuration
//! document. There is no confidence floor here; confidence only gates the
//! unattended path (see [`crate::policy`]).

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::ApplyError;
use crate::store::ConfigStore;
use crate::types::ProposedUpdate;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Result of validating one proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidationOutcome {
    pub fn accepted() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            error: Some(error.into()),
        }
    }

    pub fn into_result(self) -> Result<(), ApplyError> {
        if self.valid {
            Ok(())
        } else {
            Err(ApplyError::ValidationFailed(self.error.unwrap_or_default()))
        }
    }
}

/// Checks proposals against the acceptance rules. Read-only.
#[derive(Clone)]
pub struct UpdateValidator {
    store: Arc<dyn ConfigStore>,
}

impl UpdateValidator {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    pub fn validate(&self, community_id: &str, update: &ProposedUpdate) -> ValidationOutcome {
        let checks = update.constitutional_check.evaluate();
        if !checks.passed() {
            debug!(
                community = %community_id,
                section = %update.section,
                failing = %checks,
                "Proposal failed constitutional checks"
            );
            return ValidationOutcome::rejected(format!("constitutional checks failed: {checks}"));
        }

        if !self.store.exists(community_id) {
            return ValidationOutcome::rejected(format!(
                "config file not found for community '{community_id}'"
            ));
        }

        ValidationOutcome::accepted()
    }
}
