//! Shelfwire binary entrypoint kept minimal. The full runtime lives in `app`.

mod app;
mod args;
mod channel;
mod config;
mod error;
mod event;
mod net;
mod search;
mod util;

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use clap::Parser;

struct ShelfwireTimer;

impl tracing_subscriber::fmt::time::FormatTime for ShelfwireTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[tokio::main]
async fn main() {
    let cli = args::Args::parse();
    let config_dir = cli
        .config_dir
        .as_ref()
        .map_or_else(config::config_dir, PathBuf::from);
    let log_path = cli.log_file.as_ref().map_or_else(
        || config::logs_dir(&config_dir).join("shelfwire.log"),
        PathBuf::from,
    );

    // Initialize tracing logger writing to ~/.config/shelfwire/logs/shelfwire.log
    // unless --log-file points somewhere else
    {
        let default_level = args::determine_log_level(&cli);
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .with_timer(ShelfwireTimer)
                    .init();
                let _ = LOG_GUARD.set(guard);
                tracing::info!(path = %log_path.display(), "logging initialized");
            }
            Err(e) => {
                // Fallback: init stderr logger to avoid blocking startup
                let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_target(false)
                    .with_ansi(true)
                    .with_timer(ShelfwireTimer)
                    .init();
                tracing::warn!(error = %e, "failed to open log file; using stderr");
            }
        }
    }

    tracing::info!(search_mode = cli.search.is_some(), "Shelfwire starting");
    if let Err(err) = app::run(cli, config_dir).await {
        tracing::error!(error = ?err, "Application error");
    }
    tracing::info!("Shelfwire exited");
}
