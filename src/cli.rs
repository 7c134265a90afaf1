//! Arguments and startup shared by every binary.

use anyhow::Result;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

use crate::config::Config;
use crate::logging;

#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// Path to config file (default: $DISTANT_VIEWING_CONFIG or
    /// $XDG_CONFIG_HOME/distant-viewing/config.toml)
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(long, short = 'v', global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CommonArgs {
    /// Load configuration and initialize logging.
    pub fn bootstrap(&self) -> Result<Config> {
        let config = match &self.config {
            Some(path) => Config::load_from(path)?,
            None => Config::load()?,
        };

        let level = logging::level_for_verbosity(&config.logging.level, self.verbose);
        logging::init(&level, config.logging.directory.as_deref())?;

        Ok(config)
    }
}

/// Progress bar used by the batch tools.
pub fn progress_bar(total: u64, message: &'static str) -> Result<ProgressBar> {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{msg:12} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta})",
        )?
        .progress_chars("##-"),
    );
    bar.set_message(message);
    Ok(bar)
}
