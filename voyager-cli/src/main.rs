//! voyager: operator command line for the Voyager prompt-update engine
//!
//! Reviews knowledge-extractor proposals and applies accepted ones to
//! community prompt configurations, with checkpointed history and a
//! JSONL audit trail.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use voyager_cli::cli::{execute_command, format_audit_stats, App, Commands};
use voyager_cli::Config;

#[derive(Parser)]
#[command(name = "voyager")]
#[command(about = "Review and apply AI-proposed prompt updates")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "voyager.toml")]
    config: PathBuf,

    /// Directory of community configuration documents (overrides config file)
    #[arg(long, env = "VOYAGER_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Data directory for sessions and the audit log (overrides config file)
    #[arg(short, long, env = "VOYAGER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "voyager=info,voyager_cli=info,voyager_updates=info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Config file: {}", cli.config.display());
    let mut config = Config::load(&cli.config)?;

    // Apply CLI overrides
    if let Some(config_dir) = cli.config_dir {
        config.store.config_dir = config_dir;
    }
    if let Some(data_dir) = cli.data_dir {
        config.set_data_dir(&data_dir);
    }

    let app = App::build(config).await?;

    match execute_command(&app, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            let stats = format_audit_stats(&app.audit_stats());
            if !stats.is_empty() {
                eprintln!("{}", stats);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}
