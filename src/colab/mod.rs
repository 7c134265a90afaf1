//! Conversion of local workshop notebooks into Google Colab notebooks.
//!
//! Each converted notebook:
//! - starts with a Google Drive mount cell, then a `pip install` cell
//! - has local `PROJECT_ROOT` setups rewritten to the shared Drive folder
//! - has `../misc/assets/img/` images inlined as data URIs
//! - has every code cell output cleared

pub mod assets;
pub mod notebook;
pub mod paths;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ColabConfig;
use notebook::CellKind;

pub const MOUNT_CELL_ID: &str = "colab-mount-drive";
pub const INSTALL_CELL_ID: &str = "colab-install-deps";

/// Resolved settings for one conversion run.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub project_folder: String,
    pub drive_mount: String,
    pub notebooks_dir: PathBuf,
    pub output_dir: PathBuf,
    pub assets_dir: PathBuf,
    pub install_packages: Vec<String>,
}

impl ConvertOptions {
    pub fn from_config(config: &ColabConfig) -> Self {
        let output_dir = config
            .output_dir
            .clone()
            .unwrap_or_else(|| config.notebooks_dir.join("colab"));

        Self {
            project_folder: config.project_folder.clone(),
            drive_mount: config.drive_mount.clone(),
            notebooks_dir: config.notebooks_dir.clone(),
            output_dir,
            assets_dir: config.assets_dir.clone(),
            install_packages: config.install_packages.clone(),
        }
    }

    /// `MyDrive` root inside the mounted drive.
    pub fn drive_base(&self) -> String {
        format!("{}/MyDrive", self.drive_mount.trim_end_matches('/'))
    }

    /// Value assigned to `PROJECT_ROOT` in converted notebooks.
    pub fn project_root(&self) -> String {
        format!("{}/{}", self.drive_base(), self.project_folder)
    }

    fn mount_cell_source(&self) -> String {
        format!(
            "# Mount Google Drive\n\
             # If already mounted this will show \"Drive is already mounted\" — that's fine.\n\
             from google.colab import drive\n\
             drive.mount('{}')",
            self.drive_mount
        )
    }

    fn install_cell_source(&self) -> String {
        format!(
            "# Install packages that are not pre-installed in Colab\n\
             # (torch, torchvision, numpy, Pillow, requests are already available)\n\
             !pip install -q {}",
            self.install_packages.join(" ")
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub converted: usize,
    pub failed: usize,
}

/// Convert one notebook file.
pub fn convert_notebook(input: &Path, output: &Path, options: &ConvertOptions) -> Result<()> {
    let mut nb = notebook::read_notebook(input)?;
    convert_document(&mut nb, options)?;
    notebook::write_notebook(&nb, output)
}

/// Apply the Colab rewrite to an in-memory notebook.
pub fn convert_document(nb: &mut Value, options: &ConvertOptions) -> Result<()> {
    let project_root = options.project_root();

    let cells = match nb.get_mut("cells") {
        Some(Value::Array(cells)) => std::mem::take(cells),
        Some(_) => bail!("\"cells\" is not an array"),
        None => Vec::new(),
    };

    let mut converted = Vec::with_capacity(cells.len() + 2);
    converted.push(notebook::make_code_cell(MOUNT_CELL_ID, &options.mount_cell_source()));
    converted.push(notebook::make_code_cell(INSTALL_CELL_ID, &options.install_cell_source()));

    for mut cell in cells {
        match notebook::cell_kind(&cell) {
            CellKind::Code => {
                let src = notebook::source_as_str(&cell);
                let new_src = paths::replace_project_root(&src, &project_root);
                if new_src != src {
                    notebook::set_source(&mut cell, &new_src);
                }
                notebook::clear_outputs(&mut cell);
            }
            CellKind::Markdown => {
                let src = notebook::source_as_str(&cell);
                let new_src = assets::embed_images(&src, &options.assets_dir)?;
                if new_src != src {
                    notebook::set_source(&mut cell, &new_src);
                }
            }
            CellKind::Other => {}
        }
        converted.push(cell);
    }

    match nb.as_object_mut() {
        Some(obj) => {
            obj.insert("cells".to_string(), Value::Array(converted));
        }
        None => bail!("notebook root is not a JSON object"),
    }

    Ok(())
}

/// Notebooks directly inside `dir`, sorted by name.
pub fn find_notebooks(dir: &Path) -> Vec<PathBuf> {
    let mut notebooks: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "ipynb"))
        .collect();

    notebooks.sort();
    notebooks
}

/// Convert every notebook in the configured directory.
///
/// A notebook that fails to convert is logged and counted; the others still
/// go through.
pub fn convert_directory(options: &ConvertOptions) -> Result<ConvertSummary> {
    if !options.notebooks_dir.is_dir() {
        bail!(
            "Notebooks directory not found: {}",
            options.notebooks_dir.display()
        );
    }

    let notebooks = find_notebooks(&options.notebooks_dir);
    let mut summary = ConvertSummary::default();

    if notebooks.is_empty() {
        tracing::warn!("No notebooks found in {}", options.notebooks_dir.display());
        return Ok(summary);
    }

    tracing::info!(
        count = notebooks.len(),
        output = %options.output_dir.display(),
        drive_path = %options.project_root(),
        "Converting notebooks"
    );

    for nb_path in &notebooks {
        let Some(name) = nb_path.file_name() else {
            continue;
        };
        let out_path = options.output_dir.join(name);

        match convert_notebook(nb_path, &out_path, options)
            .with_context(|| format!("{}", nb_path.display()))
        {
            Ok(()) => {
                tracing::info!("converted {}", name.to_string_lossy());
                summary.converted += 1;
            }
            Err(e) => {
                tracing::error!("failed {}: {:#}", name.to_string_lossy(), e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn options(root: &Path) -> ConvertOptions {
        ConvertOptions {
            project_folder: "Distant_viewing".to_string(),
            drive_mount: "/content/drive".to_string(),
            notebooks_dir: root.join("notebooks"),
            output_dir: root.join("notebooks").join("colab"),
            assets_dir: root.join("misc").join("assets").join("img"),
            install_packages: vec!["ftfy".to_string()],
        }
    }

    fn sample_notebook() -> Value {
        json!({
            "cells": [
                {
                    "cell_type": "markdown",
                    "id": "intro",
                    "metadata": {},
                    "source": ["# Distant viewing\n", "Plain text"]
                },
                {
                    "cell_type": "code",
                    "id": "paths",
                    "metadata": {},
                    "execution_count": 3,
                    "outputs": [{"output_type": "stream", "name": "stdout", "text": ["hi\n"]}],
                    "source": ["CURRENT_DIR = Path.cwd()\n", "PROJECT_ROOT = CURRENT_DIR.parent"]
                },
                {
                    "cell_type": "code",
                    "id": "plot",
                    "metadata": {"tags": ["keep"]},
                    "execution_count": 4,
                    "outputs": [{"output_type": "execute_result", "data": {}}],
                    "source": ["print('ok')"]
                }
            ],
            "metadata": {"kernelspec": {"name": "python3"}},
            "nbformat": 4,
            "nbformat_minor": 5
        })
    }

    #[test]
    fn test_mount_and_install_cells_first() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path());
        let mut nb = sample_notebook();

        convert_document(&mut nb, &opts).unwrap();
        let cells = nb["cells"].as_array().unwrap();

        assert_eq!(cells.len(), 5);
        assert_eq!(cells[0]["id"], MOUNT_CELL_ID);
        assert_eq!(cells[1]["id"], INSTALL_CELL_ID);
        assert_eq!(
            notebook::source_as_str(&cells[0]).lines().last(),
            Some("drive.mount('/content/drive')")
        );
        assert_eq!(
            notebook::source_as_str(&cells[1]).lines().last(),
            Some("!pip install -q ftfy")
        );
        assert_eq!(cells[2]["id"], "intro");
    }

    #[test]
    fn test_code_outputs_cleared() {
        let dir = tempdir().unwrap();
        let mut nb = sample_notebook();

        convert_document(&mut nb, &options(dir.path())).unwrap();

        for cell in nb["cells"].as_array().unwrap() {
            if cell["cell_type"] == "code" {
                assert_eq!(cell["outputs"], json!([]));
                assert!(cell["execution_count"].is_null());
            }
        }
        assert_eq!(nb["cells"][4]["metadata"], json!({"tags": ["keep"]}));
        assert_eq!(nb["nbformat_minor"], 5);
    }

    #[test]
    fn test_paths_rewritten_and_unchanged_sources_kept() {
        let dir = tempdir().unwrap();
        let mut nb = sample_notebook();

        convert_document(&mut nb, &options(dir.path())).unwrap();

        assert_eq!(
            nb["cells"][3]["source"],
            json!(["PROJECT_ROOT = Path(\"/content/drive/MyDrive/Distant_viewing\")"])
        );
        assert_eq!(nb["cells"][2]["source"], json!(["# Distant viewing\n", "Plain text"]));
        assert_eq!(nb["cells"][4]["source"], json!(["print('ok')"]));
    }

    #[test]
    fn test_convert_directory_continues_after_failure() {
        let dir = tempdir().unwrap();
        let opts = options(dir.path());
        std::fs::create_dir_all(&opts.notebooks_dir).unwrap();

        std::fs::write(
            opts.notebooks_dir.join("01_data.ipynb"),
            serde_json::to_string(&sample_notebook()).unwrap(),
        )
        .unwrap();
        std::fs::write(opts.notebooks_dir.join("02_broken.ipynb"), "{not json").unwrap();
        std::fs::write(opts.notebooks_dir.join("notes.txt"), "ignored").unwrap();

        let summary = convert_directory(&opts).unwrap();
        assert_eq!(summary, ConvertSummary { converted: 1, failed: 1 });

        let written = std::fs::read_to_string(opts.output_dir.join("01_data.ipynb")).unwrap();
        assert!(written.ends_with("}\n"));
        let reparsed: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(reparsed["cells"][0]["id"], MOUNT_CELL_ID);
        assert!(!opts.output_dir.join("02_broken.ipynb").exists());
    }

    #[test]
    fn test_missing_notebooks_dir_is_fatal() {
        let dir = tempdir().unwrap();
        assert!(convert_directory(&options(dir.path())).is_err());
    }

    #[test]
    fn test_project_root() {
        let dir = tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.project_folder = "Course".to_string();
        assert_eq!(opts.project_root(), "/content/drive/MyDrive/Course");
    }
}
