//! Voyager Updates - Prompt-Update Engine
//!
//! Applies AI-proposed edits to community prompt configurations with:
//! - Constitutional validation before anything touches disk
//! - Append-only mutation of one text or list field per proposal
//! - Checkpoint, audit commit and byte-exact rollback through a [`ConfigStore`]
//! - A stricter confidence gate for unattended auto-apply
//! - Per-community serialization of apply attempts
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             ReviewService               │
//! │  (ingest / approve / reject / auto)     │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────────┐ ┌───────────────────┐
//! │Validator │ │UpdateApplier │ │ SessionRepository │
//! └──────────┘ └──────┬───────┘ └───────────────────┘
//!                     │
//!           ┌─────────┴─────────┐
//!           ▼                   ▼
//!     ┌─────────────┐     ┌───────────┐
//!     │ ConfigStore │     │ AuditSink │
//!     │ (git/backup)│     │           │
//!     └─────────────┘     └───────────┘
//! ```

pub mod applier;
pub mod audit;
pub mod document;
pub mod error;
pub mod extraction;
pub mod policy;
pub mod repository;
pub mod service;
pub mod session;
pub mod store;
pub mod types;
pub mod validator;

// Re-export main types for convenience
pub use applier::{commit_message, AppliedUpdate, UpdateApplier};
pub use audit::{
    AuditEntry, AuditEvent, AuditSink, AuditStats, FanoutAuditSink, JsonlAuditSink, MemoryAuditSink,
    TracingAuditSink,
};
pub use document::{CommunityDocument, ConfigField, FieldPath, ValueKind};
pub use error::{ApplyError, ApplyFailure};
pub use extraction::{ExtractionError, ExtractionPayload};
pub use policy::{AutoApplyPolicy, PolicyConfig};
pub use repository::{
    InMemorySessionRepository, JsonSessionRepository, RepositoryError, SessionRepository,
};
pub use service::{PendingProposal, ReviewError, ReviewService};
pub use session::{ExtractionSession, ProposalStatus, SessionError, SessionSource};
pub use store::{
    BackupConfigStore, Checkpoint, ConfigStore, DocumentLock, GitConfigStore, HistoryRecord,
    StoreError,
};
pub use types::*;
pub use validator::{UpdateValidator, ValidationOutcome};
