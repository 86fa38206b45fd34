//! Extraction sessions and their per-proposal review state.
//!
//! Each proposal index moves from `pending` to exactly one terminal state:
//!
//! ```text
//!   pending ──approve + apply ok──► applied
//!      └─────────reject───────────► rejected
//! ```
//!
//! `processed` is derived: it is recomputed after every transition and is
//! true once every index is decided.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::extraction::{ExtractionPayload, FineTuningExample, Insight, RetrievalEntry};
use crate::types::ProposedUpdate;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Error types for session transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("proposal index {index} out of range (session has {len} proposals)")]
    IndexOutOfRange { index: usize, len: usize },

    /// Applied and rejected are terminal
    #[error("proposal {index} already {status}")]
    AlreadyDecided { index: usize, status: ProposalStatus },
}

/// Review state of one proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    Pending,
    Applied,
    Rejected,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Applied => "applied",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an extraction session came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSource {
    pub conversation_id: String,
    pub expert_id: String,
    pub community_id: String,
}

/// One completed extraction run over a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSession {
    /// Session identifier (UUID v4)
    pub id: String,
    /// Conversation the proposals were extracted from
    pub conversation_id: String,
    /// Expert whose conversation was analyzed
    pub expert_id: String,
    /// Community whose configuration the proposals target
    pub community_id: String,
    pub created_at: DateTime<Utc>,
    /// Extracted topic label
    pub topic: String,
    proposals: Vec<ProposedUpdate>,
    applied: BTreeSet<usize>,
    rejected: BTreeSet<usize>,
    processed: bool,
    #[serde(default)]
    pub insights: Vec<Insight>,
    #[serde(default)]
    pub retrieval_entries: Vec<RetrievalEntry>,
    #[serde(default)]
    pub fine_tuning_examples: Vec<FineTuningExample>,
}

impl ExtractionSession {
    /// Create a session with every proposal pending.
    pub fn new(source: SessionSource, topic: impl Into<String>, proposals: Vec<ProposedUpdate>) -> Self {
        let processed = proposals.is_empty();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: source.conversation_id,
            expert_id: source.expert_id,
            community_id: source.community_id,
            created_at: Utc::now(),
            topic: topic.into(),
            proposals,
            applied: BTreeSet::new(),
            rejected: BTreeSet::new(),
            processed,
            insights: Vec::new(),
            retrieval_entries: Vec::new(),
            fine_tuning_examples: Vec::new(),
        }
    }

    /// Create a session from parsed extractor output.
    pub fn from_payload(source: SessionSource, payload: ExtractionPayload) -> Self {
        let mut session = Self::new(source, payload.topic, payload.prompt_updates);
        session.insights = payload.insights;
        session.retrieval_entries = payload.rag_entries;
        session.fine_tuning_examples = payload.fine_tuning_examples;
        session
    }

    pub fn proposals(&self) -> &[ProposedUpdate] {
        &self.proposals
    }

    pub fn proposal(&self, index: usize) -> Result<&ProposedUpdate, SessionError> {
        self.proposals.get(index).ok_or(SessionError::IndexOutOfRange {
            index,
            len: self.proposals.len(),
        })
    }

    pub fn applied(&self) -> &BTreeSet<usize> {
        &self.applied
    }

    pub fn rejected(&self) -> &BTreeSet<usize> {
        &self.rejected
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn status(&self, index: usize) -> Result<ProposalStatus, SessionError> {
        self.proposal(index)?;
        Ok(if self.applied.contains(&index) {
            ProposalStatus::Applied
        } else if self.rejected.contains(&index) {
            ProposalStatus::Rejected
        } else {
            ProposalStatus::Pending
        })
    }

    /// Undecided indices in order.
    pub fn pending_indices(&self) -> Vec<usize> {
        (0..self.proposals.len())
            .filter(|i| !self.applied.contains(i) && !self.rejected.contains(i))
            .collect()
    }

    /// Fail unless `index` exists and is still pending.
    pub fn ensure_pending(&self, index: usize) -> Result<(), SessionError> {
        match self.status(index)? {
            ProposalStatus::Pending => Ok(()),
            status => Err(SessionError::AlreadyDecided { index, status }),
        }
    }

    pub fn mark_applied(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_pending(index)?;
        self.applied.insert(index);
        self.recompute_processed();
        Ok(())
    }

    pub fn mark_rejected(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_pending(index)?;
        self.rejected.insert(index);
        self.recompute_processed();
        Ok(())
    }

    fn recompute_processed(&mut self) {
        self.processed = self.applied.len() + self.rejected.len() == self.proposals.len();
    }
}
