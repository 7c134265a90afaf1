//! Pre-calculate CLIP embeddings for workshop datasets.
//!
//! Processes every image in a directory and saves the embeddings to an
//! `.npz` archive that students load during the workshop without a GPU.
//! A JSON index with the same stem is written next to it.
//!
//! ## Usage
//!
//! ```bash
//! precalculate-embeddings \
//!     --images-dir data/images/Uppsala_University \
//!     --output data/embeddings/uppsala_university_clip_embeddings.npz \
//!     --model ViT-B/32 --batch-size 64
//! ```

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use distant_viewing::cli::{progress_bar, CommonArgs};
use distant_viewing::clip::{ClipModel, ClipOptions, ClipVariant, Device};
use distant_viewing::embeddings::{self, failure_report};

#[derive(Debug, Parser)]
#[command(
    name = "precalculate-embeddings",
    version,
    about = "Pre-calculate CLIP embeddings for images"
)]
struct Args {
    /// Directory containing images
    #[arg(long = "images-dir", short = 'i', alias = "images_dir", value_name = "DIR")]
    images_dir: PathBuf,

    /// Output file path
    #[arg(long, short = 'o', default_value = "embeddings.npz", value_name = "FILE")]
    output: PathBuf,

    /// CLIP model to use (default: ViT-B/32)
    #[arg(long, short = 'm', value_enum)]
    model: Option<ClipVariant>,

    /// Batch size for processing (default: 32)
    #[arg(long = "batch-size", short = 'b', alias = "batch_size", value_name = "N")]
    batch_size: Option<usize>,

    /// Device to use (default: auto)
    #[arg(long, short = 'd', value_enum)]
    device: Option<Device>,

    /// ONNX export of the visual encoder, required for models without a
    /// bundled download
    #[arg(long, value_name = "FILE")]
    model_path: Option<PathBuf>,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.common.bootstrap()?;
    let settings = config.embeddings;

    if !args.images_dir.is_dir() {
        bail!("Images directory does not exist: {}", args.images_dir.display());
    }

    let batch_size = args.batch_size.unwrap_or(settings.batch_size);
    let options = ClipOptions {
        variant: args.model.unwrap_or(settings.model),
        device: args.device.unwrap_or(settings.device),
        model_path: args.model_path.or(settings.model_path),
        models_dir: settings.models_dir,
        input_name: settings.input_name,
        output_name: settings.output_name,
        intra_threads: settings.intra_threads,
    };

    info!("Scanning for images in: {}", args.images_dir.display());
    let image_files = embeddings::discover_images(&args.images_dir, &settings.image_extensions)?;
    info!("Found {} images", image_files.len());

    if image_files.is_empty() {
        warn!("No images found! Check the directory path.");
        return Ok(());
    }

    let mut model = ClipModel::load(&options)?;

    info!("Processing images in batches of {}...", batch_size);
    let progress = progress_bar(image_files.len() as u64, "Processing")?;
    let run = embeddings::calculate_embeddings(
        &mut model,
        &args.images_dir,
        &image_files,
        batch_size,
        &progress,
    )?;
    progress.finish_and_clear();

    if !run.failures.is_empty() {
        println!("Failed to process {} images:", run.failures.len());
        for line in failure_report(&run.failures, 10) {
            println!("{line}");
        }
    }

    let archive = run.into_archive()?;

    println!();
    println!("Successfully processed {} images", archive.len());
    println!(
        "Embeddings shape: ({}, {})",
        archive.len(),
        archive.embedding_dim()
    );

    let index_file = archive.write(&args.output)?;

    let size_mb = std::fs::metadata(&args.output)?.len() as f64 / (1024.0 * 1024.0);
    println!();
    println!("Saved embeddings to: {}", args.output.display());
    println!("File size: {:.1} MB", size_mb);
    println!("Saved index to: {}", index_file.display());

    Ok(())
}
