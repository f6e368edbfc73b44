// statify - command-line client for the Statify analytics backend

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use statify::config::Config;
use statify::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config commands must work even when the config file is broken
    let command = match cli.command {
        Commands::Config { show, reset, path } => return cli::run_config(show, reset, path),
        command => command,
    };

    // Ensure config template exists (helps users discover options)
    Config::ensure_config_exists();
    let config = Config::from_env()?;

    // Keep the guard alive so buffered file logs are flushed on exit
    let _file_guard = logging::init(&config.logging)?;

    tracing::debug!("Backend: {}", config.api_url);

    match command {
        Commands::Ask { question, user } => cli::run_ask(&config, &question, &user).await,
        Commands::Sessions {
            project,
            visits,
            limit,
            more,
        } => cli::run_sessions(&config, &project, &visits, limit, more).await,
        Commands::Config { show, reset, path } => cli::run_config(show, reset, path),
    }
}
