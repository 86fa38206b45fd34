//! Durable storage for community configuration documents.
//!
//! A [`ConfigStore`] owns the on-disk documents and the history that explains
//! how they changed. The applier only talks to this trait, so the history
//! mechanism (git commits, copy-on-write backups) is swappable:
//!
//! ```text
//!   checkpoint()  ──►  write()  ──►  commit()
//!        │                              │
//!        └──────── revert() ◄── failure ┘
//! ```
//!
//! Documents live at `<config_dir>/<community_id>.json`.

pub mod backup;
pub mod git;
pub mod lock;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use backup::BackupConfigStore;
pub use git::GitConfigStore;
pub use lock::DocumentLock;

use crate::document::content_hash;

/// Error types for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// No document for this community
    #[error("config file not found for community '{0}'")]
    NotFound(String),

    /// Community id cannot name a document
    #[error("invalid community id '{0}'")]
    InvalidCommunityId(String),

    /// Document or its directory cannot be written
    #[error("config storage is read-only: {0}")]
    ReadOnly(String),

    #[error("IO error: {0}")]
    Io(String),

    /// Version-control failure
    #[error("version control error: {0}")]
    Vcs(String),

    /// The document is identical to the last recorded revision
    #[error("nothing to commit")]
    NothingToCommit,

    /// History moved past the checkpoint while an apply was in flight
    #[error("history diverged: expected head {expected}, found {actual}")]
    Diverged { expected: String, actual: String },

    /// The document holds bytes this attempt did not write; left untouched
    #[error("document changed by another writer: expected content {expected}, found {actual}")]
    ContentDiverged { expected: String, actual: String },
}

impl From<git2::Error> for StoreError {
    fn from(e: git2::Error) -> Self {
        StoreError::Vcs(e.message().to_string())
    }
}

/// Pre-mutation state captured before an apply attempt.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub community_id: String,
    /// Exact document bytes before mutation
    pub snapshot: Vec<u8>,
    /// Revision the store recorded for this checkpoint, if it could record one
    pub revision: Option<String>,
    /// Revision the store was at before the checkpoint
    pub base_revision: Option<String>,
    /// Content hash of the bytes this attempt handed to `write`
    pub attempted: Option<String>,
    pub taken_at: DateTime<Utc>,
}

impl Checkpoint {
    /// A checkpoint holding only the snapshot, with no recorded revision.
    pub fn detached(community_id: impl Into<String>, snapshot: Vec<u8>) -> Self {
        Self {
            community_id: community_id.into(),
            snapshot,
            revision: None,
            base_revision: None,
            attempted: None,
            taken_at: Utc::now(),
        }
    }

    /// Note the bytes about to be written, so a revert can tell them apart
    /// from another writer's.
    pub fn record_attempt(&mut self, bytes: &[u8]) {
        self.attempted = Some(content_hash(bytes));
    }
}

/// One entry in a document's change history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    /// Commit or record identifier
    pub id: String,
    /// First line of the message
    pub summary: String,
    /// Full message
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl HistoryRecord {
    pub fn new(id: impl Into<String>, message: impl Into<String>, recorded_at: DateTime<Utc>) -> Self {
        let message = message.into();
        Self {
            id: id.into(),
            summary: message.lines().next().unwrap_or_default().to_string(),
            message,
            recorded_at,
        }
    }
}

/// Storage and history for community configuration documents.
///
/// Implementations are synchronous; callers serialize access per community.
pub trait ConfigStore: Send + Sync {
    /// Canonical path of a community's document.
    fn location(&self, community_id: &str) -> Result<PathBuf, StoreError>;

    /// Capture the current document and, best-effort, record a revision
    /// labelled with the section about to change.
    fn checkpoint(&self, community_id: &str, label: &str) -> Result<Checkpoint, StoreError>;

    /// Record the current document as a new revision, returning its id.
    fn commit(&self, community_id: &str, description: &str) -> Result<String, StoreError>;

    /// Restore the document to the checkpoint and discard the checkpoint's
    /// revision. The document bytes are restored even when an error is
    /// returned for the history, unless they are neither the snapshot nor
    /// the attempted bytes, in which case nothing is touched and
    /// [`StoreError::ContentDiverged`] is returned.
    fn revert(&self, checkpoint: &Checkpoint) -> Result<(), StoreError>;

    /// Most recent revisions touching a community's document, newest first.
    fn history(&self, community_id: &str, limit: usize) -> Result<Vec<HistoryRecord>, StoreError>;

    /// Exclusive lock on a community's document, shared with other processes
    /// through `<community>.json.lock`. Blocks until acquired.
    fn lock(&self, community_id: &str) -> Result<DocumentLock, StoreError> {
        let path = self.location(community_id)?;
        if !path.is_file() {
            return Err(StoreError::NotFound(community_id.to_string()));
        }
        DocumentLock::acquire(&lock::lock_path(&path))
    }

    fn exists(&self, community_id: &str) -> bool {
        self.location(community_id).map(|p| p.is_file()).unwrap_or(false)
    }

    fn load(&self, community_id: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.location(community_id)?;
        read_document(community_id, &path)
    }

    /// Fail before any mutation when the document cannot be replaced.
    fn ensure_writable(&self, community_id: &str) -> Result<(), StoreError> {
        let path = self.location(community_id)?;
        let file_meta = fs::metadata(&path).map_err(|_| StoreError::NotFound(community_id.to_string()))?;
        if file_meta.permissions().readonly() {
            return Err(StoreError::ReadOnly(path.display().to_string()));
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let dir_meta = fs::metadata(dir).map_err(|e| StoreError::Io(e.to_string()))?;
        if dir_meta.permissions().readonly() {
            return Err(StoreError::ReadOnly(dir.display().to_string()));
        }

        Ok(())
    }

    /// Replace the document atomically.
    fn write(&self, community_id: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.location(community_id)?;
        atomic_write(&path, bytes)
    }
}

/// Community ids are a single path component of ASCII letters, digits,
/// `-` and `_`.
pub fn validate_community_id(community_id: &str) -> Result<(), StoreError> {
    let valid = !community_id.is_empty()
        && community_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidCommunityId(community_id.to_string()))
    }
}

/// `<config_dir>/<community_id>.json`
pub fn document_path(config_dir: &Path, community_id: &str) -> Result<PathBuf, StoreError> {
    validate_community_id(community_id)?;
    Ok(config_dir.join(format!("{community_id}.json")))
}

pub(crate) fn read_document(community_id: &str, path: &Path) -> Result<Vec<u8>, StoreError> {
    fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => StoreError::NotFound(community_id.to_string()),
        _ => StoreError::Io(format!("cannot read {}: {e}", path.display())),
    })
}

/// Put the checkpoint's snapshot back, refusing when the document holds
/// bytes some other writer produced.
pub(crate) fn restore_snapshot(path: &Path, checkpoint: &Checkpoint) -> Result<(), StoreError> {
    match fs::read(path) {
        Ok(current) if current == checkpoint.snapshot => return Ok(()),
        Ok(current) => {
            let actual = content_hash(&current);
            if checkpoint.attempted.as_deref() != Some(actual.as_str()) {
                return Err(StoreError::ContentDiverged {
                    expected: checkpoint
                        .attempted
                        .clone()
                        .unwrap_or_else(|| content_hash(&checkpoint.snapshot)),
                    actual,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(StoreError::Io(format!("cannot read {}: {e}", path.display()))),
    }

    atomic_write(path, &checkpoint.snapshot)
}

/// Write bytes to a file atomically via `NamedTempFile` + fsync + persist.
///
/// The temp file lives in the target's directory so the final rename never
/// crosses filesystems; readers see either the old or the new document.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));

    let mut named_temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        StoreError::Io(format!("cannot create temp file in {}: {e}", dir.display()))
    })?;

    named_temp
        .as_file_mut()
        .write_all(bytes)
        .map_err(|e| StoreError::Io(format!("cannot write temp file: {e}")))?;
    named_temp
        .as_file()
        .sync_all()
        .map_err(|e| StoreError::Io(format!("cannot sync temp file: {e}")))?;

    named_temp
        .persist(path)
        .map_err(|e| StoreError::Io(format!("cannot persist temp file -> {}: {e}", path.display())))?;

    Ok(())
}
