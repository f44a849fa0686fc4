//! gamerlink - command-line front end for the gamerlink backend.
//!
//! Logs in, keeps the session on disk between runs, and prints friends,
//! games and profile snapshots as JSON.

mod commands;

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gamerlink_core::{SessionClient, Settings};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable naming a directory for log files
const LOG_DIR_ENV: &str = "GAMERLINK_LOG_DIR";

/// Log file name inside the log directory
const LOG_FILE: &str = "gamerlink.log";

#[derive(Debug, Parser)]
#[command(name = "gamerlink", version, about = "Friends, games and profile from the gamerlink backend")]
struct Cli {
    /// API root of the gamerlink backend
    #[arg(long, global = true, env = "GAMERLINK_API_ROOT")]
    api_root: Option<String>,

    /// Name of the stored session record
    #[arg(long, global = true, env = "GAMERLINK_STORAGE_KEY")]
    storage_key: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Log in and store the session
    Login {
        #[arg(long, env = "GAMERLINK_EMAIL")]
        email: Option<String>,
    },
    /// End the session
    Logout,
    /// Verify the session and show the current user
    Status,
    /// Show friends and their presence
    Friends {
        /// Ask the backend to rebuild the list first
        #[arg(long)]
        refresh: bool,
    },
    /// Show played games
    Games {
        #[arg(long)]
        refresh: bool,
    },
    /// Show the profile
    Profile {
        #[arg(long)]
        refresh: bool,
    },
    /// Refresh friends, games and profile together
    Sync,
    /// Keep verifying the session and print events until logout or Ctrl-C
    Watch {
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(PathBuf::from(dir), LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn build_client(cli: &Cli, settings: &Settings) -> Result<SessionClient> {
    let api_root = cli
        .api_root
        .clone()
        .or_else(|| settings.api_root.clone())
        .context("No API root configured. Pass --api-root or set GAMERLINK_API_ROOT")?;

    let mut builder = SessionClient::builder().api_root(api_root);
    if let Some(key) = cli.storage_key.clone().or_else(|| settings.storage_key.clone()) {
        builder = builder.storage_key(key);
    }
    if let Some(ref namespace) = settings.namespace {
        builder = builder.namespace(namespace.clone());
    }
    builder.build().context("Failed to create session client")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    let cli = Cli::parse();
    debug!(command = ?cli.command, "gamerlink starting");

    let settings = match Settings::load() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Failed to load settings, using defaults");
            Settings::default()
        }
    };

    let client = build_client(&cli, &settings)?;

    let result = match cli.command {
        Command::Login { email } => commands::login(&client, settings, email).await,
        Command::Logout => commands::logout(&client).await,
        Command::Status => commands::status(&client).await,
        Command::Friends { refresh } => commands::friends(&client, refresh).await,
        Command::Games { refresh } => commands::games(&client, refresh).await,
        Command::Profile { refresh } => commands::profile(&client, refresh).await,
        Command::Sync => commands::sync(&client).await,
        Command::Watch { interval_secs } => commands::watch(&client, interval_secs).await,
    };

    info!("gamerlink done");
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gamerlink",
            "friends",
            "--refresh",
            "--api-root",
            "http://localhost:3000",
        ])
        .unwrap();
        assert_eq!(cli.api_root.as_deref(), Some("http://localhost:3000"));
        assert!(matches!(cli.command, Command::Friends { refresh: true }));
    }

    #[test]
    fn test_watch_interval_default() {
        let cli = Cli::try_parse_from(["gamerlink", "watch"]).unwrap();
        assert!(matches!(cli.command, Command::Watch { interval_secs: 300 }));
    }

    #[test]
    fn test_build_client_requires_api_root() {
        let cli = Cli {
            api_root: None,
            storage_key: None,
            command: Command::Status,
        };
        assert!(build_client(&cli, &Settings::default()).is_err());
    }
}
