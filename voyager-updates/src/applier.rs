//! All-or-nothing application of one proposal to one community document.
//!
//! ```text
//!   load ─► preflight ─► checkpoint ─► resolve ─► append ─► verify ─► write ─► commit
//!                             │            └──────────┴─────────┴────────┴────────┤
//!                             │                                         failure   ▼
//!                             └───────────────────────────────────────────► revert
//! ```
//!
//! Every step is reported to the injected [`AuditSink`]. A failure after the
//! checkpoint restores the exact pre-attempt bytes; a failed restore is
//! reported alongside the original error, never instead of it.

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::audit::{AuditEntry, AuditEvent, AuditSink};
use crate::document::{content_hash, CommunityDocument, FieldPath};
use crate::error::{ApplyError, ApplyFailure};
use crate::policy::PolicyConfig;
use crate::store::{Checkpoint, ConfigStore, StoreError};
use crate::types::{ApplyMode, ApplyResult, ProposedUpdate};

/// A successfully applied proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedUpdate {
    /// Audit commit recording the change
    pub commit_id: String,
    pub before_hash: String,
    pub after_hash: String,
}

/// Applies proposals to documents held by a [`ConfigStore`].
///
/// Synchronous. Each attempt holds the store's document lock from load to
/// commit or revert, so applies against one community never interleave,
/// even across processes.
#[derive(Clone)]
pub struct UpdateApplier {
    store: Arc<dyn ConfigStore>,
    audit: Arc<dyn AuditSink>,
    policy: PolicyConfig,
}

impl UpdateApplier {
    pub fn new(store: Arc<dyn ConfigStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            policy: PolicyConfig::default(),
        }
    }

    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Apply `update` and report the outcome in wire form.
    pub fn apply(&self, community_id: &str, update: &ProposedUpdate, mode: ApplyMode) -> ApplyResult {
        match self.try_apply(community_id, update, mode) {
            Ok(applied) => ApplyResult::applied(applied.commit_id),
            Err(failure) => ApplyResult::failed(failure.to_string()),
        }
    }

    /// Apply `update`, returning the typed outcome.
    pub fn try_apply(
        &self,
        community_id: &str,
        update: &ProposedUpdate,
        mode: ApplyMode,
    ) -> Result<AppliedUpdate, ApplyFailure> {
        let _lock = self.store.lock(community_id).map_err(|e| load_error(community_id, e))?;
        let original = self.store.load(community_id).map_err(|e| load_error(community_id, e))?;
        let document =
            CommunityDocument::parse(&original).map_err(|e| ApplyError::MalformedConfig {
                community_id: community_id.to_string(),
                reason: e.to_string(),
            })?;
        self.store
            .ensure_writable(community_id)
            .map_err(|e| load_error(community_id, e))?;

        let before_hash = content_hash(&original);
        let mut checkpoint = self.checkpoint(community_id, update, &original, &before_hash);

        match self.mutate_and_commit(community_id, update, mode, document, &mut checkpoint) {
            Ok((commit_id, after_hash)) => {
                info!(
                    community = %community_id,
                    section = %update.section,
                    commit = %commit_id,
                    auto = mode.is_automatic(),
                    "Applied prompt update"
                );
                self.record(
                    AuditEntry::new(
                        community_id,
                        &update.section,
                        AuditEvent::Applied {
                            commit_id: commit_id.clone(),
                            mode,
                        },
                    )
                    .with_hashes(Some(before_hash.clone()), Some(after_hash.clone())),
                );

                Ok(AppliedUpdate {
                    commit_id,
                    before_hash,
                    after_hash,
                })
            }
            Err(err) => Err(self.roll_back(community_id, update, &checkpoint, &before_hash, err)),
        }
    }

    fn checkpoint(
        &self,
        community_id: &str,
        update: &ProposedUpdate,
        original: &[u8],
        before_hash: &str,
    ) -> Checkpoint {
        match self.store.checkpoint(community_id, &update.section) {
            Ok(checkpoint) => {
                self.record(
                    AuditEntry::new(
                        community_id,
                        &update.section,
                        AuditEvent::Checkpointed {
                            revision: checkpoint.revision.clone(),
                        },
                    )
                    .with_hashes(Some(before_hash.to_string()), None),
                );
                checkpoint
            }
            Err(e) => {
                warn!(
                    community = %community_id,
                    error = %e,
                    "Checkpoint failed, continuing with in-memory snapshot"
                );
                self.record(AuditEntry::new(
                    community_id,
                    &update.section,
                    AuditEvent::CheckpointSkipped {
                        reason: e.to_string(),
                    },
                ));
                Checkpoint::detached(community_id, original.to_vec())
            }
        }
    }

    /// Steps that run after the checkpoint. Any error here is rolled back.
    fn mutate_and_commit(
        &self,
        community_id: &str,
        update: &ProposedUpdate,
        mode: ApplyMode,
        mut document: CommunityDocument,
        checkpoint: &mut Checkpoint,
    ) -> Result<(String, String), ApplyError> {
        let section = update.section.as_str();
        let path = FieldPath::parse(section).ok_or_else(|| ApplyError::FieldPathNotFound {
            section: section.to_string(),
            missing: section.to_string(),
            suggestion: None,
        })?;

        let field = document
            .field_mut(&path)
            .map_err(|unresolved| ApplyError::FieldPathNotFound {
                section: section.to_string(),
                missing: unresolved.missing,
                suggestion: unresolved.suggestion,
            })?;

        field
            .append(&update.suggested_addition)
            .map_err(|found| ApplyError::UnsupportedFieldType {
                section: section.to_string(),
                found,
            })?;

        let bytes = document
            .serialize_verified()
            .map_err(ApplyError::SerializationInvariantViolation)?;

        checkpoint.record_attempt(&bytes);
        self.store
            .write(community_id, &bytes)
            .map_err(|e| ApplyError::StorageWriteFailed(e.to_string()))?;

        let message = commit_message(community_id, update, mode, self.policy.evidence_excerpt_chars);
        let commit_id = self
            .store
            .commit(community_id, &message)
            .map_err(|e| ApplyError::AuditCommitFailed(e.to_string()))?;

        Ok((commit_id, content_hash(&bytes)))
    }

    fn roll_back(
        &self,
        community_id: &str,
        update: &ProposedUpdate,
        checkpoint: &Checkpoint,
        before_hash: &str,
        err: ApplyError,
    ) -> ApplyFailure {
        warn!(
            community = %community_id,
            section = %update.section,
            error = %err,
            "Prompt update failed, rolling back"
        );
        self.record(AuditEntry::new(
            community_id,
            &update.section,
            AuditEvent::Failed {
                error: err.to_string(),
            },
        ));

        let failure = ApplyFailure::new(err);
        match self.store.revert(checkpoint) {
            Ok(()) => {
                self.record(
                    AuditEntry::new(community_id, &update.section, AuditEvent::RolledBack)
                        .with_hashes(Some(before_hash.to_string()), Some(before_hash.to_string())),
                );
                failure
            }
            Err(rollback) => {
                error!(
                    community = %community_id,
                    error = %rollback,
                    "Rollback failed"
                );
                let after_hash = self.store.load(community_id).ok().map(|b| content_hash(&b));
                self.record(
                    AuditEntry::new(
                        community_id,
                        &update.section,
                        AuditEvent::RollbackFailed {
                            error: rollback.to_string(),
                        },
                    )
                    .with_hashes(Some(before_hash.to_string()), after_hash),
                );
                failure.with_rollback_error(&rollback)
            }
        }
    }

    fn record(&self, entry: AuditEntry) {
        self.audit.append(entry);
    }
}

fn load_error(community_id: &str, e: StoreError) -> ApplyError {
    match e {
        StoreError::NotFound(_) | StoreError::InvalidCommunityId(_) => {
            ApplyError::ConfigNotFound(community_id.to_string())
        }
        other => ApplyError::StorageWriteFailed(other.to_string()),
    }
}

/// Human-readable audit commit message for an applied proposal.
pub fn commit_message(
    community_id: &str,
    update: &ProposedUpdate,
    mode: ApplyMode,
    excerpt_chars: usize,
) -> String {
    format!(
        "Apply prompt update to {section}\n\
         \n\
         Community: {community_id}\n\
         Section: {section}\n\
         Confidence: {confidence}\n\
         Priority: {priority}\n\
         Risk: {risk}\n\
         Constitutional checks: {checks}\n\
         Evidence: {evidence}\n\
         Auto-applied: {auto}\n",
        section = update.section,
        confidence = update.confidence,
        priority = update.priority.as_str(),
        risk = update.risk_level.as_str(),
        checks = update.constitutional_check.glyph_summary(),
        evidence = excerpt(&update.evidence_from_session, excerpt_chars),
        auto = if mode.is_automatic() { "yes" } else { "no" },
    )
}

/// Single-line excerpt of at most `max_chars` characters, ending in `...`
/// when shortened.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }

    let keep = max_chars.saturating_sub(3);
    let mut out: String = flat.chars().take(keep).collect();
    out.push_str("...");
    out
}
