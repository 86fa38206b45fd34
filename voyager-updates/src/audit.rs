//! Audit trail for prompt-update attempts.
//!
//! The applier reports every step of every attempt to an injected
//! [`AuditSink`]. Sinks are independent of the store's commit history: they
//! also capture failed and rolled-back attempts, which leave no commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

use crate::types::ApplyMode;

/// Maximum entries in the memory sink before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// What happened at one step of an apply attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AuditEvent {
    /// Pre-mutation state captured
    Checkpointed { revision: Option<String> },
    /// Checkpoint could not be taken; the applier fell back to its own copy
    CheckpointSkipped { reason: String },
    /// Update written and committed
    Applied { commit_id: String, mode: ApplyMode },
    /// Attempt failed after the checkpoint
    Failed { error: String },
    /// Document restored to the checkpoint
    RolledBack,
    /// Restoring the checkpoint failed
    RollbackFailed { error: String },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checkpointed { .. } => "checkpointed",
            Self::CheckpointSkipped { .. } => "checkpoint_skipped",
            Self::Applied { .. } => "applied",
            Self::Failed { .. } => "failed",
            Self::RolledBack => "rolled_back",
            Self::RollbackFailed { .. } => "rollback_failed",
        }
    }
}

/// An entry in the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Unique entry ID
    pub entry_id: String,
    pub community_id: String,
    /// Target field path of the proposal
    pub section: String,
    #[serde(flatten)]
    pub event: AuditEvent,
    /// Content hash of the document before the attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before_hash: Option<String>,
    /// Content hash of the document after this step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_hash: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(community_id: &str, section: &str, event: AuditEvent) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().to_string(),
            community_id: community_id.to_string(),
            section: section.to_string(),
            event,
            before_hash: None,
            after_hash: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_hashes(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.before_hash = before;
        self.after_hash = after;
        self
    }
}

/// Destination for audit entries.
///
/// Appending must not fail the apply attempt; sinks log their own errors.
pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry);
}

/// Bounded in-memory audit trail, newest first.
pub struct MemoryAuditSink {
    entries: RwLock<VecDeque<AuditEntry>>,
    max_entries: usize,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries,
        }
    }

    /// Get recent entries.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.iter().take(limit).cloned().collect()
    }

    /// Get entries for a community.
    pub fn for_community(&self, community_id: &str, limit: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| e.community_id == community_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> AuditStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());

        let mut stats = AuditStats {
            total_entries: entries.len(),
            ..AuditStats::default()
        };
        for entry in entries.iter() {
            match entry.event {
                AuditEvent::Applied { mode, .. } => {
                    stats.applied += 1;
                    if mode.is_automatic() {
                        stats.auto_applied += 1;
                    }
                }
                AuditEvent::Failed { .. } => stats.failed += 1,
                AuditEvent::RolledBack => stats.rolled_back += 1,
                AuditEvent::RollbackFailed { .. } => stats.rollback_failures += 1,
                AuditEvent::Checkpointed { .. } | AuditEvent::CheckpointSkipped { .. } => {}
            }
        }
        stats
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(|e| e.into_inner()).clear();
    }

    pub fn count(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.push_front(entry);

        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }
}

/// Statistics from the memory sink.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditStats {
    pub total_entries: usize,
    pub applied: usize,
    /// Applied entries triggered by the batch selector
    pub auto_applied: usize,
    pub failed: usize,
    pub rolled_back: usize,
    pub rollback_failures: usize,
}

/// Mirrors audit entries into `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn append(&self, entry: AuditEntry) {
        match &entry.event {
            AuditEvent::Failed { error } | AuditEvent::RollbackFailed { error } => warn!(
                community = %entry.community_id,
                section = %entry.section,
                event = entry.event.name(),
                error = %error,
                "audit"
            ),
            event => info!(
                community = %entry.community_id,
                section = %entry.section,
                event = event.name(),
                before = entry.before_hash.as_deref().unwrap_or("-"),
                after = entry.after_hash.as_deref().unwrap_or("-"),
                "audit"
            ),
        }
    }
}

/// Forwards every entry to each wrapped sink, in order.
#[derive(Default, Clone)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for FanoutAuditSink {
    fn append(&self, entry: AuditEntry) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.append(entry.clone());
            }
            last.append(entry);
        }
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<fs::File>,
}

impl JsonlAuditSink {
    /// Open (creating) the log file and its parent directory.
    pub fn open(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = fs::OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the newest `limit` entries from a log file, newest first.
    pub fn read_recent(path: &Path, limit: usize) -> std::io::Result<Vec<AuditEntry>> {
        let file = match fs::File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt audit line"),
            }
        }

        entries.reverse();
        entries.truncate(limit);
        Ok(entries)
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, entry: AuditEntry) {
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to encode audit entry");
                return;
            }
        };

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(file, "{line}") {
            warn!(path = %self.path.display(), error = %e, "Failed to append audit entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn applied(community: &str) -> AuditEntry {
        AuditEntry::new(
            community,
            "domainExpertise.mission",
            AuditEvent::Applied {
                commit_id: "abc".to_string(),
                mode: ApplyMode::Manual,
            },
        )
    }

    #[test]
    fn test_memory_sink_newest_first_and_bounded() {
        let sink = MemoryAuditSink::with_max_entries(3);
        for i in 0..5 {
            sink.append(applied(&format!("c{i}")));
        }

        assert_eq!(sink.count(), 3);
        let recent = sink.recent(10);
        assert_eq!(recent[0].community_id, "c4");
        assert_eq!(recent[2].community_id, "c2");
    }

    #[test]
    fn test_memory_sink_stats() {
        let sink = MemoryAuditSink::new();
        sink.append(applied("careersy"));
        sink.append(AuditEntry::new(
            "careersy",
            "x",
            AuditEvent::Applied {
                commit_id: "def".to_string(),
                mode: ApplyMode::Automatic,
            },
        ));
        sink.append(AuditEntry::new(
            "careersy",
            "x",
            AuditEvent::Failed {
                error: "boom".to_string(),
            },
        ));
        sink.append(AuditEntry::new("careersy", "x", AuditEvent::RolledBack));

        let stats = sink.stats();
        assert_eq!(stats.total_entries, 4);
        assert_eq!(stats.applied, 2);
        assert_eq!(stats.auto_applied, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.rolled_back, 1);

        assert_eq!(sink.for_community("careersy", 2).len(), 2);
        assert!(sink.for_community("other", 10).is_empty());
    }

    #[test]
    fn test_entry_wire_format() {
        let entry = applied("careersy").with_hashes(Some("aa".into()), Some("bb".into()));
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["event"], "applied");
        assert_eq!(value["commitId"], "abc");
        assert!(value.get("commit_id").is_none());
        assert_eq!(value["communityId"], "careersy");
        assert_eq!(value["beforeHash"], "aa");

        let skipped = AuditEntry::new(
            "careersy",
            "modes",
            AuditEvent::RollbackFailed {
                error: "boom".to_string(),
            },
        );
        let value = serde_json::to_value(&skipped).unwrap();
        assert_eq!(value["event"], "rollback_failed");
        assert_eq!(value["error"], "boom");
        assert_eq!(value["recordedAt"], serde_json::to_value(skipped.recorded_at).unwrap());
    }

    #[test]
    fn test_fanout_reaches_every_sink() {
        let first = Arc::new(MemoryAuditSink::new());
        let second = Arc::new(MemoryAuditSink::new());
        let fanout = FanoutAuditSink::new()
            .with(first.clone())
            .with(Arc::new(TracingAuditSink))
            .with(second.clone());

        fanout.append(applied("careersy"));
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        FanoutAuditSink::new().append(applied("nobody"));
    }

    #[test]
    fn test_jsonl_sink_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit/updates.jsonl");

        let sink = JsonlAuditSink::open(&path).unwrap();
        sink.append(applied("first"));
        sink.append(AuditEntry::new("second", "x", AuditEvent::RolledBack));

        let entries = JsonlAuditSink::read_recent(&path, 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].community_id, "second");
        assert_eq!(entries[0].event, AuditEvent::RolledBack);

        assert_eq!(JsonlAuditSink::read_recent(&path, 1).unwrap().len(), 1);
        assert!(JsonlAuditSink::read_recent(&dir.path().join("missing"), 5)
            .unwrap()
            .is_empty());
    }
}
