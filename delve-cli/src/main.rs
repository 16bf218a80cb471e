//! Delve CLI: steerable, multi-cycle web research from the terminal.
//!
//! Runs one research session per invocation. While research runs, typed
//! commands steer it; afterwards follow-up questions are answered from the
//! collected evidence.

mod commands;
mod console;
mod session;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Delve: iterative web research driven by an LLM
#[derive(Parser, Debug)]
#[command(name = "delve", version, about, long_about = None)]
struct Cli {
    /// Research question (prompted for if omitted)
    query: Option<String>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Workspace directory (holds `.delve/config.toml`)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Stop after this many planning rounds
    #[arg(long, value_name = "N")]
    rounds: Option<usize>,

    /// Print the summary and exit without follow-up questions
    #[arg(long)]
    no_chat: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List search providers and whether each can be used
    Providers,
}

#[derive(clap::Subcommand, Debug)]
pub(crate) enum ConfigAction {
    /// Write a default configuration to `.delve/config.toml`
    Init,
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Provider credentials may live in a .env file
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Console output carries progress, so stderr logging starts at warn
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)));

    let log_dir = directories::ProjectDirs::from("dev", "delve", "delve")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from(".delve").join("logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "delve.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("delve=debug,delve_core=debug,delve_tools=debug,warn"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    if let Some(command) = cli.command {
        return commands::handle_command(command, &workspace, cli.config.as_deref()).await;
    }

    let mut config = delve_core::config::load_config(Some(&workspace), cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    if let Some(rounds) = cli.rounds {
        config.research.max_planning_rounds = Some(rounds);
    }
    for warning in config.validate() {
        tracing::warn!(%warning, "Configuration warning");
        if !cli.quiet {
            console::print_warning(&warning);
        }
    }

    session::run(config, cli.query, !cli.no_chat).await
}
