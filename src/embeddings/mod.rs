//! Precomputation of image embeddings for a whole collection.
//!
//! Images are decoded and preprocessed in parallel within each batch, then
//! encoded together. An image that can't be decoded is recorded and skipped;
//! the rest of its batch still goes through.

pub mod archive;
pub mod discovery;
pub mod npy;

use anyhow::{bail, Context, Result};
use indicatif::ProgressBar;
use ndarray::{concatenate, Array2, Array3, Axis};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::clip::{preprocess, ImageEncoder};

pub use archive::{index_path, EmbeddingArchive, EmbeddingIndex};
pub use discovery::discover_images;

/// An image that produced no embedding.
#[derive(Debug, Clone)]
pub struct ImageFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of one embedding run; row `i` belongs to `filenames[i]`.
#[derive(Debug)]
pub struct EmbeddingRun {
    pub model_name: String,
    pub embeddings: Option<Array2<f32>>,
    pub filenames: Vec<String>,
    pub failures: Vec<ImageFailure>,
}

impl EmbeddingRun {
    /// Package the successful rows, failing if there are none.
    pub fn into_archive(self) -> Result<EmbeddingArchive> {
        match self.embeddings {
            Some(embeddings) if !self.filenames.is_empty() => {
                EmbeddingArchive::new(self.model_name, embeddings, self.filenames)
            }
            _ => bail!(
                "No images could be embedded ({} failed)",
                self.failures.len()
            ),
        }
    }
}

/// Scale every row to unit L2 norm. All-zero rows stay as they are.
pub fn l2_normalize_rows(embeddings: &mut Array2<f32>) {
    for mut row in embeddings.rows_mut() {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|x| x / norm);
        }
    }
}

fn relative_name(images_dir: &Path, path: &Path) -> String {
    path.strip_prefix(images_dir)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

/// Embed `files` (all under `images_dir`) in batches of `batch_size`.
pub fn calculate_embeddings<E: ImageEncoder + ?Sized>(
    encoder: &mut E,
    images_dir: &Path,
    files: &[PathBuf],
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<EmbeddingRun> {
    if batch_size == 0 {
        bail!("Batch size must be at least 1");
    }

    let size = encoder.input_size();
    let mut chunks: Vec<Array2<f32>> = Vec::new();
    let mut filenames = Vec::new();
    let mut failures = Vec::new();

    for batch_files in files.chunks(batch_size) {
        let prepared: Vec<(&PathBuf, Result<Array3<f32>>)> = batch_files
            .par_iter()
            .map(|path| (path, preprocess::load_image(path, size)))
            .collect();

        let mut batch_images = Vec::with_capacity(prepared.len());
        let mut batch_paths = Vec::with_capacity(prepared.len());
        for (path, result) in prepared {
            match result {
                Ok(tensor) => {
                    batch_images.push(tensor);
                    batch_paths.push(path);
                }
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Skipping image: {:#}", e);
                    failures.push(ImageFailure {
                        path: path.clone(),
                        error: format!("{:#}", e),
                    });
                }
            }
        }

        if !batch_images.is_empty() {
            let encoded = encoder.encode(&batch_images).and_then(|rows| {
                if rows.nrows() != batch_images.len() {
                    bail!(
                        "Encoder returned {} rows for {} images",
                        rows.nrows(),
                        batch_images.len()
                    );
                }
                Ok(rows)
            });

            match encoded {
                Ok(mut rows) => {
                    l2_normalize_rows(&mut rows);
                    chunks.push(rows);
                    filenames.extend(batch_paths.iter().map(|p| relative_name(images_dir, p)));
                }
                Err(e) => {
                    progress.suspend(|| {
                        tracing::warn!(
                            images = batch_paths.len(),
                            "Batch inference failed: {:#}",
                            e
                        )
                    });
                    failures.extend(batch_paths.iter().map(|p| ImageFailure {
                        path: (*p).clone(),
                        error: format!("inference failed: {:#}", e),
                    }));
                }
            }
        }

        progress.inc(batch_files.len() as u64);
    }

    let embeddings = if chunks.is_empty() {
        None
    } else {
        let views: Vec<_> = chunks.iter().map(|c| c.view()).collect();
        Some(concatenate(Axis(0), &views).context("Batches disagree on embedding size")?)
    };

    Ok(EmbeddingRun {
        model_name: encoder.model_name().to_string(),
        embeddings,
        filenames,
        failures,
    })
}

/// Up to `limit` failure lines, then a count of the rest.
pub fn failure_report(failures: &[ImageFailure], limit: usize) -> Vec<String> {
    let mut lines: Vec<String> = failures
        .iter()
        .take(limit)
        .map(|f| format!("  - {}: {}", f.path.display(), f.error))
        .collect();

    if failures.len() > limit {
        lines.push(format!("  ... and {} more", failures.len() - limit));
    }
    lines
}
