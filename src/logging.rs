//! Logging configuration.
//!
//! All tools log to stderr through `tracing-subscriber`, leaving stdout free
//! for summaries. When a log directory is configured, a daily rolling file
//! is written alongside.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Environment variable holding a filter directive, e.g. `debug` or
/// `distant_viewing::download=trace`.
pub const LOG_ENV: &str = "DISTANT_VIEWING_LOG";

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Map a `-v` count onto a filter directive, starting from the configured level.
pub fn level_for_verbosity(base: &str, verbose: u8) -> String {
    match verbose {
        0 => base.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Initialize the logging system.
///
/// `DISTANT_VIEWING_LOG` takes precedence over `default_level`.
pub fn init(default_level: &str, log_dir: Option<&Path>) -> Result<()> {
    let env_filter = || {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let file_appender = tracing_appender::rolling::daily(dir, "distant-viewing.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Dropping the guard would stop the background writer
            let _ = GUARD.set(guard);

            Some(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_filter(env_filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to set tracing subscriber")?;

    if let Some(dir) = log_dir {
        tracing::debug!("Logging to file in {:?}", dir);
    }

    Ok(())
}
