//! Tenure CLI
//!
//! Operator tooling around the write authority:
//! - validate a configuration file
//! - generate and strictly apply unified diffs offline
//! - replay a scripted session through an in-process authority
//! - inspect and verify a SQLite audit log

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tenure_service::AuthorityConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod replay;

/// Tenure CLI application
#[derive(Parser)]
#[command(name = "tenure")]
#[command(about = "Tenure - proficiency-gated write authority", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TENURE_CONFIG")]
    config: Option<String>,

    /// Log level (overrides the configured level)
    #[arg(long, env = "TENURE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "TENURE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, validate and print the effective configuration
    CheckConfig,

    /// Print the unified diff from OLD to NEW
    Diff {
        old: PathBuf,
        new: PathBuf,

        /// Label used in the ---/+++ headers
        #[arg(long)]
        label: Option<String>,

        /// Print change statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Strictly apply DIFF to BASE
    Apply {
        base: PathBuf,
        diff: PathBuf,

        /// Write the result here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run a JSON-lines session of submit/edit steps
    Replay {
        session: PathBuf,
    },

    /// Show aggregate progress and recent records, and verify the chain
    Audit {
        /// SQLite URL; defaults to the configured audit database
        #[arg(long, env = "TENURE_AUDIT_DATABASE_URL")]
        database_url: Option<String>,

        /// Number of recent records to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AuthorityConfig::load(cli.config.as_deref()).context("loading configuration")?;

    // Initialize tracing
    let level = cli.log_level.clone().unwrap_or_else(|| config.logging.level.clone());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());
    if cli.json || config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    match cli.command {
        Commands::CheckConfig => commands::check_config(&config),
        Commands::Diff { old, new, label, stats } => commands::diff(&old, &new, label.as_deref(), stats),
        Commands::Apply { base, diff, output } => commands::apply(&base, &diff, output.as_deref()),
        Commands::Replay { session } => replay::run(config, &session).await,
        Commands::Audit { database_url, limit } => {
            let url = database_url
                .or_else(|| config.audit.database_url.clone())
                .context("no audit database configured; pass --database-url")?;
            commands::audit(&url, limit).await
        }
    }
}
