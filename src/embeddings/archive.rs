//! Embedding archive: a NumPy `.npz` plus a JSON index next to it.
//!
//! Entries match what `np.savez_compressed` produces for the same data, so
//! students can keep using `np.load(path, allow_pickle=False)`:
//! `embeddings` (float32, N×D), `filenames` (str, N), `model_name` (str
//! scalar) and `embedding_dim` (int64 scalar).

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use ndarray::{arr0, Array0, Array2};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use super::npy;

const EMBEDDINGS_ENTRY: &str = "embeddings.npy";
const FILENAMES_ENTRY: &str = "filenames.npy";
const MODEL_NAME_ENTRY: &str = "model_name.npy";
const EMBEDDING_DIM_ENTRY: &str = "embedding_dim.npy";

/// Embedding rows with the file each row belongs to.
#[derive(Debug, Clone)]
pub struct EmbeddingArchive {
    pub model_name: String,
    pub embeddings: Array2<f32>,
    pub filenames: Vec<String>,
}

/// Contents of the companion `.json` index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingIndex {
    pub model_name: String,
    pub embedding_dim: usize,
    pub num_images: usize,
    pub filenames: Vec<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// `embeddings.npz` → `embeddings.json`
pub fn index_path(archive_path: &Path) -> PathBuf {
    archive_path.with_extension("json")
}

impl EmbeddingArchive {
    pub fn new(
        model_name: String,
        embeddings: Array2<f32>,
        filenames: Vec<String>,
    ) -> Result<Self> {
        if embeddings.nrows() != filenames.len() {
            bail!(
                "{} embedding rows for {} filenames",
                embeddings.nrows(),
                filenames.len()
            );
        }

        Ok(Self {
            model_name,
            embeddings,
            filenames,
        })
    }

    pub fn embedding_dim(&self) -> usize {
        self.embeddings.ncols()
    }

    pub fn len(&self) -> usize {
        self.filenames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
    }

    pub fn index(&self) -> EmbeddingIndex {
        EmbeddingIndex {
            model_name: self.model_name.clone(),
            embedding_dim: self.embedding_dim(),
            num_images: self.len(),
            filenames: self.filenames.clone(),
            created_at: Some(Utc::now()),
        }
    }

    /// Write the `.npz` archive and its JSON index. Returns the index path.
    pub fn write(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        self.write_npz(path)
            .with_context(|| format!("Failed to write archive {}", path.display()))?;

        let index_path = index_path(path);
        let json = serde_json::to_string_pretty(&self.index())?;
        std::fs::write(&index_path, json)
            .with_context(|| format!("Failed to write index {}", index_path.display()))?;

        Ok(index_path)
    }

    fn write_npz(&self, path: &Path) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(EMBEDDINGS_ENTRY, options)?;
        self.embeddings.write_npy(&mut zip)?;

        zip.start_file(FILENAMES_ENTRY, options)?;
        npy::write_str_array(&mut zip, &self.filenames)?;

        zip.start_file(MODEL_NAME_ENTRY, options)?;
        npy::write_str_scalar(&mut zip, &self.model_name)?;

        zip.start_file(EMBEDDING_DIM_ENTRY, options)?;
        arr0(self.embedding_dim() as i64).write_npy(&mut zip)?;

        zip.finish()?;
        Ok(())
    }

    /// Read an archive written by [`EmbeddingArchive::write`] or by
    /// `np.savez_compressed` with the same entries.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open archive {}", path.display()))?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;

        let embeddings = Array2::<f32>::read_npy(zip.by_name(EMBEDDINGS_ENTRY)?)
            .context("Failed to read embeddings")?;
        let filenames = npy::read_str_array(zip.by_name(FILENAMES_ENTRY)?)
            .context("Failed to read filenames")?;
        let model_name = npy::read_str_array(zip.by_name(MODEL_NAME_ENTRY)?)
            .context("Failed to read model name")?
            .into_iter()
            .next()
            .unwrap_or_default();
        let embedding_dim = Array0::<i64>::read_npy(zip.by_name(EMBEDDING_DIM_ENTRY)?)
            .context("Failed to read embedding dimension")?
            .into_scalar();

        if embedding_dim as usize != embeddings.ncols() {
            bail!(
                "embedding_dim {} does not match {} columns",
                embedding_dim,
                embeddings.ncols()
            );
        }

        Self::new(model_name, embeddings, filenames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    fn sample() -> EmbeddingArchive {
        EmbeddingArchive::new(
            "ViT-B/32".to_string(),
            array![[0.6, 0.8, 0.0], [0.0, 0.0, 1.0]],
            vec!["Albert_Edelfelt_1.jpg".to_string(), "sub/Unknown_2.jpg".to_string()],
        )
        .unwrap()
    }

    #[test]
    fn test_rows_must_match_filenames() {
        let result = EmbeddingArchive::new(
            "ViT-B/32".to_string(),
            Array2::zeros((3, 4)),
            vec!["a.jpg".to_string()],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_write_creates_archive_and_index() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("collection_clip_embeddings.npz");

        let index_file = sample().write(&path).unwrap();
        assert_eq!(index_file, dir.path().join("out").join("collection_clip_embeddings.json"));

        let index: EmbeddingIndex =
            serde_json::from_str(&std::fs::read_to_string(&index_file).unwrap()).unwrap();
        assert_eq!(index.model_name, "ViT-B/32");
        assert_eq!(index.embedding_dim, 3);
        assert_eq!(index.num_images, 2);
        assert_eq!(index.filenames, vec!["Albert_Edelfelt_1.jpg", "sub/Unknown_2.jpg"]);
        assert!(index.created_at.is_some());

        let loaded = EmbeddingArchive::load(&path).unwrap();
        assert_eq!(loaded.embeddings, sample().embeddings);
        assert_eq!(loaded.filenames, index.filenames);
        assert_eq!(loaded.model_name, "ViT-B/32");
    }

    #[test]
    fn test_archive_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("e.npz");
        sample().write(&path).unwrap();

        let zip = ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut names: Vec<&str> = zip.file_names().collect();
        names.sort();
        assert_eq!(
            names,
            vec!["embedding_dim.npy", "embeddings.npy", "filenames.npy", "model_name.npy"]
        );
    }
}
