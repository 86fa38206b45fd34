//! Failure taxonomy for validating and applying prompt updates.

use crate::document::ValueKind;
use crate::store::StoreError;

/// Why an apply attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    /// No configuration document for the community
    #[error("config file not found for community '{0}'")]
    ConfigNotFound(String),

    /// Document exists but is not valid JSON
    #[error("config for community '{community_id}' is not valid JSON: {reason}")]
    MalformedConfig { community_id: String, reason: String },

    /// Target path cannot be resolved
    #[error("field path '{section}' not found: '{missing}' does not exist{}", hint(.suggestion))]
    FieldPathNotFound {
        section: String,
        /// First unresolvable prefix of `section`
        missing: String,
        /// Shallowest path elsewhere in the document ending in the same key
        suggestion: Option<String>,
    },

    /// Target exists but is neither text nor a sequence
    #[error("cannot append to '{section}': unsupported field type {found}")]
    UnsupportedFieldType { section: String, found: ValueKind },

    /// Serialized document failed to re-parse to the same tree
    #[error("serialization invariant violated: {0}")]
    SerializationInvariantViolation(String),

    #[error("storage write failed: {0}")]
    StorageWriteFailed(String),

    #[error("audit commit failed: {0}")]
    AuditCommitFailed(String),

    /// Rejected before reaching the applier
    #[error("validation failed: {0}")]
    ValidationFailed(String),
}

fn hint(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(path) => format!(" (did you mean '{path}'?)"),
        None => String::new(),
    }
}

impl ApplyError {
    /// Whether this failure happens after the checkpoint and so triggers
    /// rollback.
    pub fn requires_rollback(&self) -> bool {
        matches!(
            self,
            Self::FieldPathNotFound { .. }
                | Self::UnsupportedFieldType { .. }
                | Self::SerializationInvariantViolation(_)
                | Self::StorageWriteFailed(_)
                | Self::AuditCommitFailed(_)
        )
    }
}

/// A failed attempt, with the rollback outcome when one was needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyFailure {
    pub error: ApplyError,
    /// Set when restoring the checkpoint also failed
    pub rollback_error: Option<String>,
}

impl ApplyFailure {
    pub fn new(error: ApplyError) -> Self {
        Self {
            error,
            rollback_error: None,
        }
    }

    pub fn with_rollback_error(mut self, error: &StoreError) -> Self {
        self.rollback_error = Some(error.to_string());
        self
    }
}

impl std::fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(rollback) = &self.rollback_error {
            write!(f, "; rollback failed: {rollback}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ApplyFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<ApplyError> for ApplyFailure {
    fn from(error: ApplyError) -> Self {
        Self::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_not_found_message_includes_hint() {
        let err = ApplyError::FieldPathNotFound {
            section: "jobSearchCoaching".to_string(),
            missing: "jobSearchCoaching".to_string(),
            suggestion: Some("domainExpertise.jobSearchCoaching".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("did you mean 'domainExpertise.jobSearchCoaching'"));

        let err = ApplyError::FieldPathNotFound {
            section: "a.b".to_string(),
            missing: "a".to_string(),
            suggestion: None,
        };
        assert!(!err.to_string().contains("did you mean"));
    }

    #[test]
    fn test_rollback_error_is_appended() {
        let failure = ApplyFailure::new(ApplyError::StorageWriteFailed("disk full".to_string()))
            .with_rollback_error(&StoreError::Io("permission denied".to_string()));

        let msg = failure.to_string();
        assert!(msg.starts_with("storage write failed: disk full"));
        assert!(msg.ends_with("rollback failed: IO error: permission denied"));
    }

    #[test]
    fn test_requires_rollback() {
        assert!(!ApplyError::ConfigNotFound("x".into()).requires_rollback());
        assert!(!ApplyError::ValidationFailed("x".into()).requires_rollback());
        assert!(ApplyError::AuditCommitFailed("x".into()).requires_rollback());
    }
}
