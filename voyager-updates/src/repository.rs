//! Persistence for extraction sessions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::session::ExtractionSession;
use crate::store::atomic_write;

/// Error types for session persistence.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("session not found: {0}")]
    NotFound(String),

    #[error("invalid session id '{0}'")]
    InvalidId(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt session record {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

/// Storage for [`ExtractionSession`]s.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<ExtractionSession, RepositoryError>;

    /// Insert or replace a session.
    async fn save(&self, session: &ExtractionSession) -> Result<(), RepositoryError>;

    /// All sessions, oldest first.
    async fn list(&self) -> Result<Vec<ExtractionSession>, RepositoryError>;
}

/// Session repository held in memory.
#[derive(Default, Clone)]
pub struct InMemorySessionRepository {
    sessions: Arc<RwLock<HashMap<String, ExtractionSession>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn get(&self, id: &str) -> Result<ExtractionSession, RepositoryError> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn save(&self, session: &ExtractionSession) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExtractionSession>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<ExtractionSession> = sessions.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all)
    }
}

/// Session repository writing one `<id>.json` file per session.
#[derive(Debug, Clone)]
pub struct JsonSessionRepository {
    dir: PathBuf,
}

impl JsonSessionRepository {
    /// Create the repository, creating `dir` if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RepositoryError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RepositoryError::Io(format!("cannot create {}: {e}", dir.display())))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, RepositoryError> {
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(RepositoryError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl SessionRepository for JsonSessionRepository {
    async fn get(&self, id: &str) -> Result<ExtractionSession, RepositoryError> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RepositoryError::NotFound(id.to_string()))
            }
            Err(e) => return Err(RepositoryError::Io(e.to_string())),
        };

        serde_json::from_slice(&bytes).map_err(|e| RepositoryError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, session: &ExtractionSession) -> Result<(), RepositoryError> {
        let path = self.path_for(&session.id)?;
        let mut bytes =
            serde_json::to_vec_pretty(session).map_err(|e| RepositoryError::Io(e.to_string()))?;
        bytes.push(b'\n');

        tokio::task::spawn_blocking(move || atomic_write(&path, &bytes))
            .await
            .map_err(|e| RepositoryError::Io(e.to_string()))?
            .map_err(|e| RepositoryError::Io(e.to_string()))?;

        debug!(session = %session.id, "Saved session");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<ExtractionSession>, RepositoryError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| RepositoryError::Io(e.to_string()))?;

        let mut sessions = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::Io(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| RepositoryError::Io(e.to_string()))?;
            match serde_json::from_slice::<ExtractionSession>(&bytes) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping corrupt session file"),
            }
        }

        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionSource;
    use crate::types::fixtures::proposal;

    fn session() -> ExtractionSession {
        ExtractionSession::new(
            SessionSource {
                conversation_id: "conv".to_string(),
                expert_id: "expert".to_string(),
                community_id: "careersy".to_string(),
            },
            "topic",
            vec![proposal("a", "x", 95), proposal("b", "y", 60)],
        )
    }

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let repo = InMemorySessionRepository::new();
        let mut s = session();
        repo.save(&s).await.unwrap();

        s.mark_applied(0).unwrap();
        repo.save(&s).await.unwrap();

        let loaded = repo.get(&s.id).await.unwrap();
        assert!(loaded.applied().contains(&0));
        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(matches!(
            repo.get("missing").await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn test_json_repository_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let repo = tokio_test::block_on(JsonSessionRepository::open(dir.path())).unwrap();

        for id in ["../etc/passwd", "a/b", "a.json", ""] {
            assert!(matches!(
                tokio_test::block_on(repo.get(id)),
                Err(RepositoryError::InvalidId(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_json_repository_persists() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSessionRepository::open(dir.path().join("sessions")).await.unwrap();

        let mut s = session();
        s.mark_rejected(1).unwrap();
        repo.save(&s).await.unwrap();

        let reopened = JsonSessionRepository::open(dir.path().join("sessions")).await.unwrap();
        let loaded = reopened.get(&s.id).await.unwrap();
        assert_eq!(loaded, s);
        assert_eq!(reopened.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_json_repository_skips_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonSessionRepository::open(dir.path()).await.unwrap();
        repo.save(&session()).await.unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();

        assert_eq!(repo.list().await.unwrap().len(), 1);
        assert!(matches!(
            repo.get("broken").await,
            Err(RepositoryError::Corrupt { .. })
        ));
    }
}
