//! rollover: rolling machine image rollouts across autoscaling groups.
//!
//! # Usage
//!
//! ```text
//! rollover plan --event '{"type":"all"}'
//! rollover refresh --next --timeout 15m
//! rollover queue list
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rollover_core::config::LogConfig;
use rollover_core::{BuildInfo, RolloverConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "rollover",
    about = "Rolling AMI rollouts for autoscaling groups",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "rollover.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan a rollout for a build notification and queue its refresh tasks.
    Plan {
        /// Notification JSON, e.g. '{"type":"web"}'. "all" selects every group.
        #[arg(long)]
        event: String,
    },
    /// Apply one refresh task: new launch template version, then instance refresh.
    Refresh {
        /// Task JSON: '{"arn":"...","ami":"..."}'.
        #[arg(long, required_unless_present = "next", conflicts_with = "next")]
        task: Option<String>,
        /// Take the next task from the queue instead.
        #[arg(long)]
        next: bool,
        /// Invocation budget ("15m", "90s"). Defaults to refresh.invocation_timeout.
        #[arg(long)]
        timeout: Option<String>,
    },
    /// Inspect the task queue.
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
    /// Print the effective configuration.
    Config,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List tasks waiting for delivery, oldest first.
    List,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = RolloverConfig::load(Some(&cli.config))
        .with_context(|| format!("unable to load {}", cli.config.display()))?;
    config.apply_env(|key| std::env::var(key).ok());

    init_tracing(&config.log);

    let build = BuildInfo::current();
    info!(
        version = build.version,
        build = build.build,
        rev = build.revision,
        "rollover starting"
    );

    match cli.command {
        Command::Plan { event } => commands::plan::run(&config, &event).await,
        Command::Refresh { task, timeout, .. } => {
            commands::refresh::run(&config, task.as_deref(), timeout.as_deref()).await
        }
        Command::Queue { action } => match action {
            QueueAction::List => commands::queue::list(&config),
        },
        Command::Config => commands::show_config(&config),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
