//! Git-backed configuration store.
//!
//! Checkpoints and applied updates become commits in the working tree that
//! contains the configuration directory. Each commit stages only the
//! community's document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{Commit, ErrorCode, Oid, Repository, ResetType, Signature, Sort};
use tracing::{debug, info, warn};

use super::{
    document_path, read_document, restore_snapshot, Checkpoint, ConfigStore, HistoryRecord,
    StoreError,
};

const CHECKPOINT_PREFIX: &str = "Checkpoint before prompt update";

/// Configuration store that records history as git commits.
pub struct GitConfigStore {
    /// Directory holding `<community>.json` documents
    config_dir: PathBuf,
    /// Working tree root of the repository containing `config_dir`
    workdir: PathBuf,
}

impl GitConfigStore {
    /// Open the store, discovering the repository that contains `config_dir`.
    pub fn open(config_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let config_dir = std::fs::canonicalize(config_dir.as_ref()).map_err(|e| {
            StoreError::Io(format!(
                "cannot resolve config dir {}: {e}",
                config_dir.as_ref().display()
            ))
        })?;

        let repo = Repository::discover(&config_dir)?;
        let workdir = repo
            .workdir()
            .ok_or_else(|| StoreError::Vcs("repository has no working tree".to_string()))?;
        let workdir = std::fs::canonicalize(workdir).map_err(|e| StoreError::Io(e.to_string()))?;

        info!(
            config_dir = %config_dir.display(),
            workdir = %workdir.display(),
            "Opened git config store"
        );

        Ok(Self { config_dir, workdir })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    fn repo(&self) -> Result<Repository, StoreError> {
        Ok(Repository::open(&self.workdir)?)
    }

    /// Path of a document relative to the working tree, as git indexes it.
    fn relative(&self, path: &Path) -> Result<PathBuf, StoreError> {
        path.strip_prefix(&self.workdir)
            .map(Path::to_path_buf)
            .map_err(|_| {
                StoreError::Vcs(format!(
                    "{} is outside the working tree {}",
                    path.display(),
                    self.workdir.display()
                ))
            })
    }
}

impl ConfigStore for GitConfigStore {
    fn location(&self, community_id: &str) -> Result<PathBuf, StoreError> {
        document_path(&self.config_dir, community_id)
    }

    fn checkpoint(&self, community_id: &str, label: &str) -> Result<Checkpoint, StoreError> {
        let path = self.location(community_id)?;
        let snapshot = read_document(community_id, &path)?;

        let repo = self.repo()?;
        let rel = self.relative(&path)?;
        let base_revision = head_oid(&repo).map(|oid| oid.to_string());

        let message = format!("{CHECKPOINT_PREFIX}: {label}");
        let revision = match commit_path(&repo, &rel, &message) {
            Ok(oid) => {
                debug!(community = %community_id, commit = %oid, "Recorded checkpoint commit");
                Some(oid.to_string())
            }
            Err(e) => {
                debug!(
                    community = %community_id,
                    error = %e.message(),
                    "Checkpoint commit skipped"
                );
                None
            }
        };

        Ok(Checkpoint {
            community_id: community_id.to_string(),
            snapshot,
            revision,
            base_revision,
            attempted: None,
            taken_at: Utc::now(),
        })
    }

    fn commit(&self, community_id: &str, description: &str) -> Result<String, StoreError> {
        let path = self.location(community_id)?;
        let repo = self.repo()?;
        let rel = self.relative(&path)?;

        match commit_path(&repo, &rel, description) {
            Ok(oid) => Ok(oid.to_string()),
            Err(e) if e.message() == "nothing to commit" => Err(StoreError::NothingToCommit),
            Err(e) => Err(e.into()),
        }
    }

    fn revert(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        let path = self.location(&checkpoint.community_id)?;

        // Bytes first: the document must be restored even if history cannot be.
        restore_snapshot(&path, checkpoint)?;

        let repo = self.repo()?;
        let rel = self.relative(&path)?;

        if let Some(revision) = &checkpoint.revision {
            let head = head_oid(&repo).map(|oid| oid.to_string());
            if head.as_deref() != Some(revision.as_str()) {
                warn!(
                    community = %checkpoint.community_id,
                    expected = %revision,
                    "HEAD moved past checkpoint, leaving history untouched"
                );
                return Err(StoreError::Diverged {
                    expected: revision.clone(),
                    actual: head.unwrap_or_else(|| "<unborn>".to_string()),
                });
            }

            match &checkpoint.base_revision {
                Some(base) => {
                    let oid = Oid::from_str(base)?;
                    let target = repo.find_object(oid, None)?;
                    repo.reset(&target, ResetType::Soft, None)?;
                }
                None => unborn_head(&repo)?,
            }
            debug!(community = %checkpoint.community_id, "Discarded checkpoint commit");
        }

        reset_index_entry(&repo, &rel)?;
        Ok(())
    }

    fn history(&self, community_id: &str, limit: usize) -> Result<Vec<HistoryRecord>, StoreError> {
        let path = self.location(community_id)?;
        let repo = self.repo()?;
        let rel = self.relative(&path)?;

        let mut walk = repo.revwalk()?;
        if walk.push_head().is_err() {
            return Ok(Vec::new());
        }
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;

        let blob_at = |commit: &Commit| -> Option<Oid> {
            commit.tree().ok()?.get_path(&rel).ok().map(|entry| entry.id())
        };

        let mut records = Vec::new();
        for oid in walk {
            if records.len() >= limit {
                break;
            }

            let commit = repo.find_commit(oid?)?;
            let current = blob_at(&commit);
            let previous = commit.parent(0).ok().and_then(|p| blob_at(&p));
            if current == previous {
                continue;
            }

            let recorded_at =
                DateTime::from_timestamp(commit.time().seconds(), 0).unwrap_or_default();
            records.push(HistoryRecord::new(
                commit.id().to_string(),
                commit.message().unwrap_or_default(),
                recorded_at,
            ));
        }

        Ok(records)
    }
}

fn head_oid(repo: &Repository) -> Option<Oid> {
    repo.head().ok().and_then(|h| h.target())
}

/// Stage one path and commit it on HEAD.
///
/// Errors with "nothing to commit" when the resulting tree equals the
/// parent's. Uses the repository's configured signature, falling back to
/// `Voyager <voyager@local>`.
fn commit_path(repo: &Repository, rel: &Path, message: &str) -> Result<Oid, git2::Error> {
    let mut index = repo.index()?;
    index.add_path(rel)?;
    index.write()?;

    let tree_id = index.write_tree()?;
    let tree = repo.find_tree(tree_id)?;

    let signature = repo
        .signature()
        .or_else(|_| Signature::now("Voyager", "voyager@local"))?;

    let parent_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
    if parent_commit
        .as_ref()
        .is_some_and(|parent| parent.tree_id() == tree_id)
    {
        return Err(git2::Error::from_str("nothing to commit"));
    }

    let parents: Vec<&Commit> = parent_commit.iter().collect();
    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
}

/// Remove the branch HEAD points at, returning the repository to an unborn
/// state. Used when the checkpoint was the first commit.
fn unborn_head(repo: &Repository) -> Result<(), StoreError> {
    let head = repo.find_reference("HEAD")?;
    let branch = head
        .symbolic_target()
        .ok_or_else(|| StoreError::Vcs("HEAD is detached".to_string()))?
        .to_string();

    repo.find_reference(&branch)?.delete()?;
    Ok(())
}

/// Reset one index entry to HEAD, or drop it when HEAD does not exist or
/// does not contain the path.
fn reset_index_entry(repo: &Repository, rel: &Path) -> Result<(), StoreError> {
    match repo.head().ok().and_then(|h| h.peel(git2::ObjectType::Commit).ok()) {
        Some(head) => {
            repo.reset_default(Some(&head), [rel])?;
        }
        None => {
            let mut index = repo.index()?;
            match index.remove_path(rel) {
                Ok(()) => {}
                Err(e) if e.code() == ErrorCode::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            index.write()?;
        }
    }
    Ok(())
}
