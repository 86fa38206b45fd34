//! Voyager CLI - operator commands for reviewing and applying prompt updates
//!
//! Every command prints a human-readable report on success. Failures are
//! returned as errors so the process exits non-zero.

use anyhow::{anyhow, bail, Context};
use clap::Subcommand;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use constitution::CheckOutcome;
use voyager_updates::{
    AppliedSummary, ApplyMode, AuditEntry, AuditEvent, AuditStats, BackupConfigStore, ConfigStore,
    ExtractionSession, FanoutAuditSink, GitConfigStore, HistoryRecord, JsonSessionRepository,
    JsonlAuditSink, MemoryAuditSink, PendingProposal, ProposedUpdate, ReviewService,
    SessionSource, TracingAuditSink, UpdateApplier, UpdateValidator, ValidationOutcome,
};

use crate::config::{Config, StoreBackend};

/// Voyager CLI commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check a proposal file against the acceptance rules
    Validate {
        /// Target community
        #[arg(short, long)]
        community: String,
        /// Path to a ProposedUpdate JSON file
        #[arg(short, long)]
        proposal: PathBuf,
    },

    /// Validate and apply a proposal file directly
    Apply {
        /// Target community
        #[arg(short, long)]
        community: String,
        /// Path to a ProposedUpdate JSON file
        #[arg(short, long)]
        proposal: PathBuf,
    },

    /// Store knowledge-extractor output as a new review session
    Ingest {
        /// Target community
        #[arg(short, long)]
        community: String,
        /// Source conversation
        #[arg(long)]
        conversation: String,
        /// Expert whose conversation was analyzed
        #[arg(long)]
        expert: String,
        /// File containing the raw extractor output
        #[arg(short, long)]
        payload: PathBuf,
    },

    /// List undecided proposals
    Pending,

    /// Approve and apply one proposal
    Approve {
        /// Session ID
        #[arg(short, long)]
        session: String,
        /// Proposal index within the session
        #[arg(short, long)]
        index: usize,
    },

    /// Reject one proposal
    Reject {
        /// Session ID
        #[arg(short, long)]
        session: String,
        /// Proposal index within the session
        #[arg(short, long)]
        index: usize,
    },

    /// Apply every proposal in a session that meets the auto-apply bar
    AutoApply {
        /// Session ID
        #[arg(short, long)]
        session: String,
    },

    /// Show recent changes to a community's configuration
    History {
        /// Target community
        #[arg(short, long)]
        community: String,
        /// Number of records to show
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show recent audit entries
    Audit {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

/// Wired-up engine for one command invocation.
pub struct App {
    config: Config,
    store: Arc<dyn ConfigStore>,
    applier: UpdateApplier,
    validator: UpdateValidator,
    service: ReviewService,
    /// Entries recorded during this invocation
    memory: Arc<MemoryAuditSink>,
}

impl App {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn ConfigStore> = match config.store.backend {
            StoreBackend::Git => Arc::new(
                GitConfigStore::open(&config.store.config_dir)
                    .with_context(|| format!("opening {}", config.store.config_dir.display()))?,
            ),
            StoreBackend::Backup => Arc::new(BackupConfigStore::new(
                config.store.config_dir.clone(),
                config.store.keep_versions,
            )),
        };

        let memory = Arc::new(MemoryAuditSink::with_max_entries(config.audit.max_memory_entries));
        let jsonl = JsonlAuditSink::open(&config.audit.log_path)
            .with_context(|| format!("opening audit log {}", config.audit.log_path.display()))?;
        let audit = FanoutAuditSink::new()
            .with(Arc::new(TracingAuditSink))
            .with(Arc::new(jsonl))
            .with(memory.clone());

        let applier = UpdateApplier::new(Arc::clone(&store), Arc::new(audit))
            .with_policy(config.policy.clone());
        let validator = UpdateValidator::new(Arc::clone(&store));
        let sessions = JsonSessionRepository::open(&config.sessions.dir).await?;
        let service = ReviewService::new(applier.clone(), Arc::new(sessions))
            .with_policy((&config.policy).into());

        info!(
            config_dir = %config.store.config_dir.display(),
            backend = ?config.store.backend,
            "Engine ready"
        );

        Ok(Self {
            config,
            store,
            applier,
            validator,
            service,
            memory,
        })
    }

    /// Counts of what this invocation recorded.
    pub fn audit_stats(&self) -> AuditStats {
        self.memory.stats()
    }
}

/// Execute a CLI command
pub async fn execute_command(app: &App, command: Commands) -> anyhow::Result<String> {
    match command {
        Commands::Validate {
            community,
            proposal,
        } => {
            let update = read_proposal(&proposal)?;
            let outcome = app.validator.validate(&community, &update);
            if !outcome.valid {
                bail!(format_validation(&outcome));
            }
            Ok(format_validation(&outcome))
        }

        Commands::Apply {
            community,
            proposal,
        } => {
            let update = read_proposal(&proposal)?;
            let outcome = app.validator.validate(&community, &update);
            if !outcome.valid {
                bail!(format_validation(&outcome));
            }

            let applier = app.applier.clone();
            let result = tokio::task::spawn_blocking(move || {
                applier.apply(&community, &update, ApplyMode::Manual)
            })
            .await?;

            match (result.success, result.commit_id) {
                (true, Some(commit)) => Ok(format!("Applied, commit {commit}")),
                _ => Err(anyhow!(result.error.unwrap_or_else(|| "apply failed".to_string()))),
            }
        }

        Commands::Ingest {
            community,
            conversation,
            expert,
            payload,
        } => {
            let raw = std::fs::read_to_string(&payload)
                .with_context(|| format!("reading {}", payload.display()))?;
            let source = SessionSource {
                conversation_id: conversation,
                expert_id: expert,
                community_id: community,
            };
            let session = app.service.ingest(source, &raw).await?;
            Ok(format_session(&session))
        }

        Commands::Pending => {
            let pending = app.service.pending().await?;
            Ok(format_pending(&pending))
        }

        Commands::Approve { session, index } => {
            let result = app.service.approve(&session, index).await?;
            if !result.success {
                bail!(result.error.unwrap_or_else(|| "apply failed".to_string()));
            }
            Ok(format!(
                "Applied proposal {index}, commit {}",
                result.commit_id.unwrap_or_default()
            ))
        }

        Commands::Reject { session, index } => {
            let session = app.service.reject(&session, index).await?;
            Ok(format!(
                "Rejected proposal {index}\n\n{}",
                format_session(&session)
            ))
        }

        Commands::AutoApply { session } => {
            let summary = app.service.auto_apply(&session).await?;
            let report = format_summary(&summary);
            if !summary.success {
                bail!(report);
            }
            Ok(report)
        }

        Commands::History { community, limit } => {
            let history = app.store.history(&community, limit)?;
            Ok(format_history(&history))
        }

        Commands::Audit { limit } => {
            let entries = JsonlAuditSink::read_recent(&app.config.audit.log_path, limit)?;
            Ok(format_audit(&entries))
        }
    }
}

fn read_proposal(path: &Path) -> anyhow::Result<ProposedUpdate> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing proposal {}", path.display()))
}

/// Format a validation outcome for display
fn format_validation(outcome: &ValidationOutcome) -> String {
    match &outcome.error {
        None => "Valid: all constitutional checks pass".to_string(),
        Some(error) => format!("Invalid: {error}"),
    }
}

/// Format a session for display
fn format_session(session: &ExtractionSession) -> String {
    let mut output = String::new();
    output.push_str(&format!("Session:     {}\n", session.id));
    output.push_str(&format!("Community:   {}\n", session.community_id));
    output.push_str(&format!("Topic:       {}\n", session.topic));
    output.push_str(&format!("Created:     {}\n", session.created_at.format("%Y-%m-%d %H:%M:%S")));
    output.push_str(&format!("Proposals:   {}\n", session.proposals().len()));
    output.push_str(&format!("Applied:     {:?}\n", session.applied()));
    output.push_str(&format!("Rejected:    {:?}\n", session.rejected()));
    output.push_str(&format!("Processed:   {}\n", session.is_processed()));
    output
}

/// Format pending proposals for display
fn format_pending(pending: &[PendingProposal]) -> String {
    if pending.is_empty() {
        return "No pending proposals".to_string();
    }

    let mut output = String::new();
    output.push_str("Pending Proposals\n");
    output.push_str("=================\n\n");

    for item in pending {
        let p = &item.proposal;
        output.push_str(&format!(
            "[{}#{}] {} -> {}\n",
            short_id(&item.session_id),
            item.index,
            item.community_id,
            p.section
        ));
        output.push_str(&format!(
            "    confidence {}  priority {}  risk {}  auto {}\n",
            p.confidence,
            p.priority.as_str(),
            p.risk_level.as_str(),
            if item.auto_apply_eligible { "yes" } else { "no" }
        ));
        output.push_str(&format!("    checks: {}\n", format_checks(&p.constitutional_check.evaluate())));
        output.push_str(&format!("    + {}\n", p.suggested_addition));
    }

    output
}

fn format_checks(outcome: &CheckOutcome) -> String {
    if outcome.passed() {
        "all pass".to_string()
    } else {
        format!("failing {outcome}")
    }
}

/// Format an auto-apply summary for display
fn format_summary(summary: &AppliedSummary) -> String {
    let mut output = format!(
        "Auto-apply: {} of {} eligible applied\n",
        summary.applied, summary.eligible
    );
    for error in &summary.errors {
        output.push_str(&format!("  ✗ {error}\n"));
    }
    output
}

/// Format change history for display
fn format_history(history: &[HistoryRecord]) -> String {
    if history.is_empty() {
        return "No recorded changes".to_string();
    }

    history
        .iter()
        .map(|r| {
            format!(
                "{}  {}  {}",
                short_id(&r.id),
                r.recorded_at.format("%Y-%m-%d %H:%M"),
                r.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format audit entries for display
fn format_audit(entries: &[AuditEntry]) -> String {
    if entries.is_empty() {
        return "No audit entries".to_string();
    }

    let mut output = String::new();
    for entry in entries {
        let detail = match &entry.event {
            AuditEvent::Checkpointed { revision } => revision
                .as_deref()
                .map(short_id)
                .unwrap_or("(no revision)")
                .to_string(),
            AuditEvent::CheckpointSkipped { reason } => reason.clone(),
            AuditEvent::Applied { commit_id, mode } => {
                format!("{} ({mode:?})", short_id(commit_id))
            }
            AuditEvent::Failed { error } | AuditEvent::RollbackFailed { error } => error.clone(),
            AuditEvent::RolledBack => String::new(),
        };
        output.push_str(&format!(
            "{}  {:<12} {:<18} {}  {}\n",
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.community_id,
            entry.event.name(),
            entry.section,
            detail
        ));
    }
    output
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// One-line summary of audit activity, empty when nothing was recorded
pub fn format_audit_stats(stats: &AuditStats) -> String {
    if stats.total_entries == 0 {
        return String::new();
    }
    format!(
        "audit: {} applied ({} auto), {} failed, {} rolled back, {} rollback failures",
        stats.applied, stats.auto_applied, stats.failed, stats.rolled_back, stats.rollback_failures
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }

    #[test]
    fn test_format_summary_lists_failures() {
        let summary = AppliedSummary {
            success: false,
            applied: 1,
            eligible: 2,
            errors: vec!["proposal 1: field path 'x' not found".to_string()],
        };
        let report = format_summary(&summary);
        assert!(report.starts_with("Auto-apply: 1 of 2 eligible applied"));
        assert!(report.contains("proposal 1: field path 'x' not found"));
    }

    #[test]
    fn test_format_audit_stats_quiet_when_empty() {
        assert!(format_audit_stats(&AuditStats::default()).is_empty());

        let stats = AuditStats {
            total_entries: 3,
            applied: 1,
            auto_applied: 1,
            ..AuditStats::default()
        };
        assert_eq!(
            format_audit_stats(&stats),
            "audit: 1 applied (1 auto), 0 failed, 0 rolled back, 0 rollback failures"
        );
    }
}
