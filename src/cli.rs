// CLI module - command-line argument parsing and handlers
//
// Subcommands:
// - ask: stream an AI insight answer to stdout
// - sessions: enrich a visit list with session journeys and print JSON
// - config --show/--path/--reset: configuration management

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use statify::api::models::{ProjectId, Visit};
use statify::api::ApiClient;
use statify::config::{Config, VERSION};
use statify::insights::InsightController;
use statify::sessions::SessionPageCache;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Statify - streaming insights and session journeys from the command line
#[derive(Parser)]
#[command(name = "statify")]
#[command(version = VERSION)]
#[command(about = "Client for the Statify analytics backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask the AI insight endpoint a question
    Ask {
        /// The question to ask
        question: String,

        /// User id the question is asked on behalf of
        #[arg(long)]
        user: String,
    },

    /// Enrich visits with their session journeys
    Sessions {
        /// Project (tracked site) id
        #[arg(long)]
        project: String,

        /// JSON file holding an array of visits
        #[arg(long)]
        visits: PathBuf,

        /// Rows in the first page (default: configured page_size)
        #[arg(long)]
        limit: Option<usize>,

        /// Grow the table to this many rows after the first page
        #[arg(long)]
        more: Option<usize>,
    },

    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Reset config file to defaults
        #[arg(long)]
        reset: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// ask
// ─────────────────────────────────────────────────────────────────────────────

/// Stream one answer. Status transitions go to stderr, the cleaned answer to
/// stdout. Ctrl-C cancels the stream.
pub async fn run_ask(config: &Config, question: &str, user: &str) -> Result<()> {
    let client = Arc::new(ApiClient::new(config)?);
    let controller = InsightController::new(client, config.insight_settings());
    let mut view = controller.subscribe();

    let Some(message_id) = controller.ask(question, user)? else {
        bail!("Question is empty");
    };

    let mut last_status = String::new();
    loop {
        tokio::select! {
            changed = view.changed() => {
                if changed.is_err() {
                    bail!("Insight controller stopped");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                controller.cancel();
            }
        }

        let snapshot = view.borrow_and_update().clone();
        if snapshot.status != last_status {
            eprintln!("[{}]", snapshot.status);
            last_status = snapshot.status.clone();
        }

        let Some(message) = snapshot.message(message_id) else {
            continue;
        };
        if message.is_streaming {
            continue;
        }

        if !message.text.is_empty() {
            println!("{}", message.text);
        }
        if message.error {
            bail!("{}", snapshot.status);
        }
        if snapshot.status == "Cancelled" {
            bail!("Cancelled");
        }
        return Ok(());
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// sessions
// ─────────────────────────────────────────────────────────────────────────────

fn load_visits(path: &Path) -> Result<Vec<Visit>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read visits file {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse visits file {}", path.display()))
}

/// Enrich a visit list page by page and print the cache as JSON
pub async fn run_sessions(
    config: &Config,
    project: &str,
    visits: &Path,
    limit: Option<usize>,
    more: Option<usize>,
) -> Result<()> {
    let visits = load_visits(visits)?;
    let project = ProjectId::new(project);
    let client = Arc::new(ApiClient::new(config)?);
    let cache = SessionPageCache::new(
        client,
        config.sessions.page_size,
        config.sessions.max_concurrency,
    );

    let first = cache.fetch_first(&project, &visits, limit).await;
    eprintln!(
        "Loaded {} of {} visits (more: {})",
        first.loaded,
        visits.len(),
        first.has_more
    );

    if let Some(more) = more {
        let next = cache.fetch_more(&project, &visits, more).await;
        eprintln!("Appended {} (more: {})", next.loaded, next.has_more);
    }

    let json = serde_json::to_string_pretty(&cache.snapshot())?;
    println!("{}", json);
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// config
// ─────────────────────────────────────────────────────────────────────────────

pub fn run_config(show: bool, reset: bool, path: bool) -> Result<()> {
    if path {
        let path = Config::config_path().context("Could not determine config path")?;
        println!("{}", path.display());
    } else if show {
        let mut config = Config::from_env()?;
        if config.token.is_some() {
            config.token = Some("<redacted>".to_string());
        }
        println!("# Effective configuration (env > file > defaults)");
        println!();
        print!("{}", config.to_toml());
    } else if reset {
        Config::default()
            .save()
            .context("Failed to write config file")?;
        if let Some(path) = Config::config_path() {
            println!("Config reset to defaults: {}", path.display());
        }
    } else {
        println!("Usage: statify config [--show|--reset|--path]");
        println!();
        println!("Options:");
        println!("  --show    Display effective configuration");
        println!("  --reset   Reset config file to defaults");
        println!("  --path    Show config file path");
    }
    Ok(())
}
