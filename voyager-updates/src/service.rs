//! ReviewService - main entry point for reviewing and applying proposals.
//!
//! Ties the session repository, validator, applier and auto-apply policy
//! together. Manual approval and batch auto-apply share one code path and
//! differ only in the [`ApplyMode`] recorded in the audit commit.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::applier::UpdateApplier;
use crate::error::ApplyError;
use crate::extraction::{ExtractionError, ExtractionPayload};
use crate::policy::AutoApplyPolicy;
use crate::repository::{RepositoryError, SessionRepository};
use crate::session::{ExtractionSession, SessionError, SessionSource};
use crate::types::{AppliedSummary, ApplyMode, ApplyResult, ProposedUpdate};
use crate::validator::{UpdateValidator, ValidationOutcome};

/// Error types for the review service.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("session error: {0}")]
    Session(#[from] SessionError),

    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Blocking apply task panicked or was cancelled
    #[error("apply task failed: {0}")]
    TaskFailed(String),

    /// The update is committed but the session still lists it as pending
    #[error("update applied as {commit_id} but session state was not saved: {source}")]
    NotRecorded {
        commit_id: String,
        source: RepositoryError,
    },
}

/// A pending proposal, as listed for reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProposal {
    pub session_id: String,
    pub community_id: String,
    pub index: usize,
    pub proposal: ProposedUpdate,
    /// Whether the batch selector would apply this unattended
    pub auto_apply_eligible: bool,
}

/// Review workflow over extraction sessions.
pub struct ReviewService {
    applier: UpdateApplier,
    validator: UpdateValidator,
    policy: AutoApplyPolicy,
    sessions: Arc<dyn SessionRepository>,
    /// One lock per community, held for validate + apply + transition.
    /// In-process only; the store's document lock covers other processes.
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ReviewService {
    pub fn new(applier: UpdateApplier, sessions: Arc<dyn SessionRepository>) -> Self {
        let validator = UpdateValidator::new(Arc::clone(applier.store()));
        Self {
            applier,
            validator,
            policy: AutoApplyPolicy::default(),
            sessions,
            locks: DashMap::new(),
        }
    }

    pub fn with_policy(mut self, policy: AutoApplyPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> &AutoApplyPolicy {
        &self.policy
    }

    /// Parse extractor output and store it as a new session.
    pub async fn ingest(
        &self,
        source: SessionSource,
        raw_output: &str,
    ) -> Result<ExtractionSession, ReviewError> {
        let payload = ExtractionPayload::parse(raw_output)?;
        if !payload.skipped.is_empty() {
            warn!(
                community = %source.community_id,
                skipped = payload.skipped.len(),
                "Some extraction entries were dropped"
            );
        }

        let session = ExtractionSession::from_payload(source, payload);
        self.sessions.save(&session).await?;

        info!(
            session = %session.id,
            community = %session.community_id,
            proposals = session.proposals().len(),
            "Ingested extraction session"
        );
        Ok(session)
    }

    pub async fn session(&self, session_id: &str) -> Result<ExtractionSession, ReviewError> {
        Ok(self.sessions.get(session_id).await?)
    }

    /// Every undecided proposal across all sessions.
    pub async fn pending(&self) -> Result<Vec<PendingProposal>, ReviewError> {
        let sessions = self.sessions.list().await?;

        let pending = sessions
            .iter()
            .filter(|s| !s.is_processed())
            .flat_map(|s| {
                s.pending_indices().into_iter().filter_map(move |index| {
                    let proposal = s.proposals().get(index)?.clone();
                    Some(PendingProposal {
                        session_id: s.id.clone(),
                        community_id: s.community_id.clone(),
                        index,
                        auto_apply_eligible: self.policy.is_eligible(&proposal),
                        proposal,
                    })
                })
            })
            .collect();

        Ok(pending)
    }

    /// Check a proposal without applying it.
    pub async fn validate(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<ValidationOutcome, ReviewError> {
        let session = self.sessions.get(session_id).await?;
        let proposal = session.proposal(index)?;
        Ok(self.validator.validate(&session.community_id, proposal))
    }

    /// Apply a proposal on a reviewer's behalf.
    ///
    /// Validation and apply failures are reported in the returned
    /// [`ApplyResult`] and leave the proposal pending.
    pub async fn approve(&self, session_id: &str, index: usize) -> Result<ApplyResult, ReviewError> {
        self.approve_with_mode(session_id, index, ApplyMode::Manual).await
    }

    /// Mark a proposal rejected without touching the configuration.
    pub async fn reject(
        &self,
        session_id: &str,
        index: usize,
    ) -> Result<ExtractionSession, ReviewError> {
        let community_id = self.sessions.get(session_id).await?.community_id;
        let lock = self.lock_for(&community_id);
        let _guard = lock.lock().await;

        let mut session = self.sessions.get(session_id).await?;
        session.mark_rejected(index)?;
        self.sessions.save(&session).await?;

        info!(session = %session_id, index, "Rejected proposal");
        Ok(session)
    }

    /// Apply every pending proposal that meets the auto-apply policy, in
    /// order, continuing past failures.
    pub async fn auto_apply(&self, session_id: &str) -> Result<AppliedSummary, ReviewError> {
        let session = self.sessions.get(session_id).await?;

        let eligible: Vec<usize> = session
            .pending_indices()
            .into_iter()
            .filter(|&i| {
                session
                    .proposals()
                    .get(i)
                    .is_some_and(|p| self.policy.is_eligible(p))
            })
            .collect();

        let mut summary = AppliedSummary {
            eligible: eligible.len(),
            ..AppliedSummary::default()
        };

        for index in eligible {
            match self.approve_with_mode(session_id, index, ApplyMode::Automatic).await {
                Ok(result) if result.success => summary.applied += 1,
                Ok(result) => summary.errors.push(format!(
                    "proposal {index}: {}",
                    result.error.unwrap_or_default()
                )),
                Err(e @ ReviewError::NotRecorded { .. }) => {
                    summary.applied += 1;
                    summary.errors.push(format!("proposal {index}: {e}"));
                }
                Err(e) => summary.errors.push(format!("proposal {index}: {e}")),
            }
        }

        summary.success = summary.errors.is_empty();
        info!(
            session = %session_id,
            applied = summary.applied,
            eligible = summary.eligible,
            failed = summary.errors.len(),
            "Auto-apply finished"
        );
        Ok(summary)
    }

    async fn approve_with_mode(
        &self,
        session_id: &str,
        index: usize,
        mode: ApplyMode,
    ) -> Result<ApplyResult, ReviewError> {
        let community_id = self.sessions.get(session_id).await?.community_id;
        let lock = self.lock_for(&community_id);
        let _guard = lock.lock().await;

        // Re-read under the lock so a concurrent decision is seen
        let mut session = self.sessions.get(session_id).await?;
        session.ensure_pending(index)?;
        let proposal = session.proposal(index)?.clone();

        if let Err(e) = self.validator.validate(&community_id, &proposal).into_result() {
            debug!(session = %session_id, index, error = %e, "Proposal failed validation");
            return Ok(ApplyResult::failed(validation_message(e)));
        }

        let applier = self.applier.clone();
        let community = community_id.clone();
        let result = tokio::task::spawn_blocking(move || applier.apply(&community, &proposal, mode))
            .await
            .map_err(|e| ReviewError::TaskFailed(e.to_string()))?;

        if result.success {
            session.mark_applied(index)?;
            if let Err(e) = self.sessions.save(&session).await {
                let commit_id = result.commit_id.unwrap_or_default();
                error!(
                    session = %session_id,
                    index,
                    commit = %commit_id,
                    error = %e,
                    "Update applied but session state was not saved"
                );
                return Err(ReviewError::NotRecorded { commit_id, source: e });
            }
        }

        Ok(result)
    }

    fn lock_for(&self, community_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(community_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn validation_message(error: ApplyError) -> String {
    match error {
        ApplyError::ValidationFailed(reason) => reason,
        other => other.to_string(),
    }
}
