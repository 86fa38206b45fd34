//! Operator configuration (`voyager.toml`)

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use voyager_updates::PolicyConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Which history mechanism backs the configuration documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Commits in the git working tree containing `config_dir`
    Git,
    /// Snapshot copies under `<config_dir>/.versions`
    Backup,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `<community>.json` documents
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Snapshots kept per community by the backup backend
    #[serde(default = "default_keep_versions")]
    pub keep_versions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            backend: default_backend(),
            keep_versions: default_keep_versions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Directory of `<session-id>.json` records
    #[serde(default = "default_sessions_dir")]
    pub dir: PathBuf,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            dir: default_sessions_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSONL audit log
    #[serde(default = "default_audit_log")]
    pub log_path: PathBuf,

    /// Entries kept in memory for the end-of-command summary
    #[serde(default = "default_max_memory_entries")]
    pub max_memory_entries: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: default_audit_log(),
            max_memory_entries: default_max_memory_entries(),
        }
    }
}

// Defaults
fn default_config_dir() -> PathBuf { PathBuf::from("config/communities") }
fn default_backend() -> StoreBackend { StoreBackend::Git }
fn default_keep_versions() -> usize { 10 }
fn default_sessions_dir() -> PathBuf { PathBuf::from("data/sessions") }
fn default_audit_log() -> PathBuf { PathBuf::from("data/audit.jsonl") }
fn default_max_memory_entries() -> usize { 1_000 }

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Relocate session records and the audit log under `data_dir`.
    pub fn set_data_dir(&mut self, data_dir: &Path) {
        self.sessions.dir = data_dir.join("sessions");
        self.audit.log_path = data_dir.join("audit.jsonl");
    }
}
