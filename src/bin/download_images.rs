//! Batch download images from the Finnish National Gallery dataset.
//!
//! ## Usage
//!
//! ```bash
//! download-images --metadata data/objects.json --output images/all_images \
//!     --resolution 500 --max 5000
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use distant_viewing::cli::{progress_bar, CommonArgs};
use distant_viewing::download::{self, DownloadOptions, HttpFetcher, Resolution};

#[derive(Debug, Parser)]
#[command(
    name = "download-images",
    version,
    about = "Batch download Finnish National Gallery images"
)]
struct Args {
    /// Path to objects.json metadata file
    #[arg(long, short = 'm', value_name = "PATH")]
    metadata: PathBuf,

    /// Output directory for images (default: images)
    #[arg(long, short = 'o', value_name = "DIR")]
    output: Option<PathBuf>,

    /// Image resolution (default: 500)
    #[arg(long, short = 'r', value_enum)]
    resolution: Option<Resolution>,

    /// Maximum number of images to download; 0 means all (default: all)
    #[arg(long, short = 'n', value_name = "N")]
    max: Option<usize>,

    /// Delay between downloads in seconds (default: 0.1)
    #[arg(long, short = 'd', value_name = "SECS")]
    delay: Option<f64>,

    /// Parallel downloads; 1 keeps requests sequential (default: 1)
    #[arg(long, short = 'w', value_name = "N")]
    workers: Option<usize>,

    /// Per-request timeout in seconds (default: 30)
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.bootstrap()?;
    let settings = config.download;

    if !args.metadata.exists() {
        bail!("Metadata file not found: {}", args.metadata.display());
    }

    let output_dir = args.output.unwrap_or(settings.output_dir);
    let resolution = args.resolution.unwrap_or(settings.resolution);
    let delay = match args.delay {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
        Some(secs) => bail!("Invalid delay: {}", secs),
        None => Duration::from_millis(settings.delay_ms),
    };
    let options = DownloadOptions {
        delay,
        workers: args.workers.unwrap_or(settings.workers).max(1),
    };
    let timeout = Duration::from_secs(args.timeout.unwrap_or(settings.timeout_secs));

    info!("Loading metadata from {}...", args.metadata.display());
    let objects = download::load_catalog(&args.metadata)?;
    info!("Loaded {} objects", objects.len());

    std::fs::create_dir_all(&output_dir)?;

    let plan = download::plan_downloads(&objects, &output_dir, resolution, args.max);
    info!(
        candidates = plan.candidates,
        existing = plan.existing,
        missing_url = plan.missing_url,
        duplicate = plan.duplicate,
        "Images to download: {}",
        plan.tasks.len()
    );

    if plan.tasks.is_empty() {
        println!("No new images to download!");
        return Ok(());
    }

    let progress = progress_bar(plan.tasks.len() as u64, "Downloading")?;
    let fetcher = HttpFetcher::new(timeout);
    let summary = download::run_downloads(&plan.tasks, &fetcher, &options, &progress)?;
    progress.finish_and_clear();

    println!();
    println!("Download complete!");
    println!("  Downloaded: {}", summary.downloaded);
    println!("  Failed: {}", summary.failed);
    println!("  Skipped (already present): {}", plan.existing);
    if plan.duplicate > 0 {
        println!("  Skipped (duplicate file name): {}", plan.duplicate);
    }
    println!("  Output directory: {}", output_dir.display());

    Ok(())
}
