//! Copy-on-write configuration store for deployments without git.
//!
//! Every checkpoint copies the current document into `.versions/`, and every
//! commit appends a line to the community's change log:
//!
//! ```text
//!   <config_dir>/
//!     ├── careersy.json
//!     └── .versions/
//!         ├── careersy.20261018T120000.000000Z.json   # checkpoint snapshot
//!         ├── careersy.20261018T120500.000000Z.json
//!         └── careersy.log.jsonl                      # commit records
//! ```

use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{
    atomic_write, document_path, read_document, restore_snapshot, Checkpoint, ConfigStore,
    HistoryRecord, StoreError,
};

const VERSIONS_DIR: &str = ".versions";

/// Configuration store keeping snapshot copies and a JSONL change log.
pub struct BackupConfigStore {
    config_dir: PathBuf,
    versions_dir: PathBuf,
    /// Snapshots retained per community
    keep_versions: usize,
}

impl BackupConfigStore {
    pub fn new(config_dir: impl Into<PathBuf>, keep_versions: usize) -> Self {
        let config_dir = config_dir.into();
        let versions_dir = config_dir.join(VERSIONS_DIR);

        Self {
            config_dir,
            versions_dir,
            keep_versions: keep_versions.max(1),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn log_path(&self, community_id: &str) -> PathBuf {
        self.versions_dir.join(format!("{community_id}.log.jsonl"))
    }

    /// Snapshot files for a community, newest first.
    pub fn list_backups(&self, community_id: &str) -> Result<Vec<PathBuf>, StoreError> {
        if !self.versions_dir.exists() {
            return Ok(Vec::new());
        }

        let prefix = format!("{community_id}.");
        let mut backups: Vec<PathBuf> = fs::read_dir(&self.versions_dir)
            .map_err(|e| StoreError::Io(e.to_string()))?
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                let name = path.file_name()?.to_str()?;
                (name.starts_with(&prefix) && name.ends_with(".json")).then_some(path)
            })
            .collect();

        // Timestamped names sort chronologically
        backups.sort();
        backups.reverse();
        Ok(backups)
    }

    fn cleanup_old_versions(&self, community_id: &str) -> Result<(), StoreError> {
        let backups = self.list_backups(community_id)?;

        if backups.len() > self.keep_versions {
            debug!(
                community = %community_id,
                keep = self.keep_versions,
                "Pruning old snapshots"
            );
            for old in backups.iter().skip(self.keep_versions) {
                if let Err(e) = fs::remove_file(old) {
                    warn!(path = %old.display(), error = %e, "Failed to remove old snapshot");
                }
            }
        }

        Ok(())
    }
}

impl ConfigStore for BackupConfigStore {
    fn location(&self, community_id: &str) -> Result<PathBuf, StoreError> {
        document_path(&self.config_dir, community_id)
    }

    fn checkpoint(&self, community_id: &str, label: &str) -> Result<Checkpoint, StoreError> {
        let path = self.location(community_id)?;
        let snapshot = read_document(community_id, &path)?;
        let base_revision = self
            .list_backups(community_id)?
            .first()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        let taken_at = Utc::now();
        let name = format!(
            "{community_id}.{}.json",
            taken_at.format("%Y%m%dT%H%M%S%.6fZ")
        );

        let revision = match fs::create_dir_all(&self.versions_dir)
            .map_err(|e| StoreError::Io(e.to_string()))
            .and_then(|_| atomic_write(&self.versions_dir.join(&name), &snapshot))
        {
            Ok(()) => {
                debug!(community = %community_id, snapshot = %name, label = %label, "Saved snapshot");
                Some(name)
            }
            Err(e) => {
                warn!(community = %community_id, error = %e, "Snapshot copy failed");
                None
            }
        };

        Ok(Checkpoint {
            community_id: community_id.to_string(),
            snapshot,
            revision,
            base_revision,
            attempted: None,
            taken_at,
        })
    }

    fn commit(&self, community_id: &str, description: &str) -> Result<String, StoreError> {
        ensure_dir(&self.versions_dir)?;
        let record = HistoryRecord::new(uuid::Uuid::new_v4().to_string(), description, Utc::now());
        let line = serde_json::to_string(&record).map_err(|e| StoreError::Io(e.to_string()))?;

        let mut log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path(community_id))
            .map_err(|e| StoreError::Io(format!("cannot open change log: {e}")))?;
        writeln!(log, "{line}").map_err(|e| StoreError::Io(e.to_string()))?;
        log.sync_all().map_err(|e| StoreError::Io(e.to_string()))?;

        info!(community = %community_id, record = %record.id, "Recorded change");
        self.cleanup_old_versions(community_id)?;
        Ok(record.id)
    }

    fn revert(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let path = self.location(&checkpoint.community_id)?;
        restore_snapshot(&path, checkpoint)?;

        if let Some(name) = &checkpoint.revision {
            let snapshot_path = self.versions_dir.join(name);
            if snapshot_path.exists() {
                fs::remove_file(&snapshot_path).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }

        Ok(())
    }

    fn history(&self, community_id: &str, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let log_path = self.log_path(community_id);
        let file = match fs::File::open(&log_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::Io(e.to_string())),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| StoreError::Io(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(path = %log_path.display(), error = %e, "Skipping corrupt log line"),
            }
        }

        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

fn ensure_dir(dir: &Path) -> Result<(), StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::Io(format!("cannot create {}: {e}", dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(keep: usize) -> (TempDir, BackupConfigStore) {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("careersy.json"), b"{\"a\": 1}").unwrap();
        let store = BackupConfigStore::new(dir.path(), keep);
        (dir, store)
    }

    #[test]
    fn test_checkpoint_copies_snapshot() {
        let (_dir, store) = setup(5);

        let cp = store.checkpoint("careersy", "a").unwrap();
        let name = cp.revision.clone().unwrap();
        assert!(name.starts_with("careersy."));

        let backups = store.list_backups("careersy").unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0]).unwrap(), b"{\"a\": 1}");
    }

    #[test]
    fn test_revert_restores_and_drops_snapshot() {
        let (dir, store) = setup(5);

        let mut cp = store.checkpoint("careersy", "a").unwrap();
        cp.record_attempt(b"{\"a\": 2}");
        store.write("careersy", b"{\"a\": 2}").unwrap();
        store.revert(&cp).unwrap();

        assert_eq!(fs::read(dir.path().join("careersy.json")).unwrap(), b"{\"a\": 1}");
        assert!(store.list_backups("careersy").unwrap().is_empty());
    }

    #[test]
    fn test_revert_refuses_foreign_bytes() {
        let (dir, store) = setup(5);

        let cp = store.checkpoint("careersy", "a").unwrap();
        fs::write(dir.path().join("careersy.json"), b"{\"a\": 3}").unwrap();

        let err = store.revert(&cp).unwrap_err();
        assert!(matches!(err, StoreError::ContentDiverged { .. }));
        assert_eq!(fs::read(dir.path().join("careersy.json")).unwrap(), b"{\"a\": 3}");
        // Snapshot kept so the operator can still recover it
        assert_eq!(store.list_backups("careersy").unwrap().len(), 1);
    }

    #[test]
    fn test_commit_appends_history_newest_first() {
        let (_dir, store) = setup(5);

        let first = store.commit("careersy", "Apply prompt update to a").unwrap();
        let second = store.commit("careersy", "Apply prompt update to b\n\nbody").unwrap();

        let history = store.history("careersy", 10).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second);
        assert_eq!(history[0].summary, "Apply prompt update to b");
        assert_eq!(history[1].id, first);

        assert_eq!(store.history("careersy", 1).unwrap().len(), 1);
        assert!(store.history("other", 10).unwrap().is_empty());
    }

    #[test]
    fn test_prunes_to_keep_versions() {
        let (_dir, store) = setup(2);

        for _ in 0..4 {
            store.checkpoint("careersy", "a").unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        store.commit("careersy", "done").unwrap();

        assert_eq!(store.list_backups("careersy").unwrap().len(), 2);
    }

    #[test]
    fn test_backups_scoped_to_community() {
        let (dir, store) = setup(5);
        fs::write(dir.path().join("careersy-2.json"), b"{}").unwrap();

        store.checkpoint("careersy", "a").unwrap();
        store.checkpoint("careersy-2", "a").unwrap();
        store.commit("careersy", "x").unwrap();

        assert_eq!(store.list_backups("careersy").unwrap().len(), 1);
        assert_eq!(store.list_backups("careersy-2").unwrap().len(), 1);
    }
}
