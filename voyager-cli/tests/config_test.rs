//! Config loading and defaults integration tests

use std::path::PathBuf;

use tempfile::TempDir;
use voyager_cli::{Config, StoreBackend};

#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load(&dir.path().join("voyager.toml")).unwrap();

    assert_eq!(config.store.config_dir, PathBuf::from("config/communities"));
    assert_eq!(config.store.backend, StoreBackend::Git);
    assert_eq!(config.sessions.dir, PathBuf::from("data/sessions"));
    assert_eq!(config.audit.log_path, PathBuf::from("data/audit.jsonl"));
    assert_eq!(config.policy.auto_apply_min_confidence, 90);
}

#[test]
fn test_config_with_all_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("voyager.toml");
    std::fs::write(
        &path,
        r#"
[store]
config_dir = "/srv/prompts"
backend = "backup"
keep_versions = 3

[sessions]
dir = "/var/lib/voyager/sessions"

[audit]
log_path = "/var/log/voyager/audit.jsonl"
max_memory_entries = 50

[policy]
auto_apply_min_confidence = 95
evidence_excerpt_chars = 80
"#,
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.store.config_dir, PathBuf::from("/srv/prompts"));
    assert_eq!(config.store.backend, StoreBackend::Backup);
    assert_eq!(config.store.keep_versions, 3);
    assert_eq!(config.sessions.dir, PathBuf::from("/var/lib/voyager/sessions"));
    assert_eq!(config.audit.log_path, PathBuf::from("/var/log/voyager/audit.jsonl"));
    assert_eq!(config.audit.max_memory_entries, 50);
    assert_eq!(config.policy.auto_apply_min_confidence, 95);
    assert_eq!(config.policy.evidence_excerpt_chars, 80);
}

#[test]
fn test_partial_sections_fill_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("voyager.toml");
    std::fs::write(&path, "[policy]\nauto_apply_min_confidence = 80\n").unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.policy.auto_apply_min_confidence, 80);
    assert_eq!(config.policy.evidence_excerpt_chars, 200);
    assert_eq!(config.store.keep_versions, 10);
}

#[test]
fn test_unknown_backend_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("voyager.toml");
    std::fs::write(&path, "[store]\nbackend = \"svn\"\n").unwrap();

    assert!(Config::load(&path).is_err());
}
