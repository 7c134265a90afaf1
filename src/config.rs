use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::clip::{ClipVariant, Device};
use crate::download::Resolution;

/// Environment variable that points at an alternative config file.
pub const CONFIG_ENV: &str = "DISTANT_VIEWING_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub colab: ColabConfig,

    #[serde(default)]
    pub download: DownloadConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `DISTANT_VIEWING_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write a daily rolling log file into this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColabConfig {
    /// Name of the shared folder under `MyDrive/`.
    #[serde(default = "default_project_folder")]
    pub project_folder: String,

    #[serde(default = "default_drive_mount")]
    pub drive_mount: String,

    #[serde(default = "default_notebooks_dir")]
    pub notebooks_dir: PathBuf,

    /// Defaults to `<notebooks_dir>/colab`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Packages installed by the injected `pip install` cell.
    #[serde(default = "default_install_packages")]
    pub install_packages: Vec<String>,
}

fn default_project_folder() -> String {
    "Distant_viewing".to_string()
}

fn default_drive_mount() -> String {
    "/content/drive".to_string()
}

fn default_notebooks_dir() -> PathBuf {
    PathBuf::from("notebooks")
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("misc").join("assets").join("img")
}

fn default_install_packages() -> Vec<String> {
    vec![
        "git+https://github.com/openai/CLIP.git".to_string(),
        "ftfy".to_string(),
    ]
}

impl Default for ColabConfig {
    fn default() -> Self {
        Self {
            project_folder: default_project_folder(),
            drive_mount: default_drive_mount(),
            notebooks_dir: default_notebooks_dir(),
            output_dir: None,
            assets_dir: default_assets_dir(),
            install_packages: default_install_packages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    #[serde(default = "default_download_output")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub resolution: Resolution,

    /// Pause after each request, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_download_output() -> PathBuf {
    PathBuf::from("images")
}

fn default_delay_ms() -> u64 {
    100
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_workers() -> usize {
    1
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_download_output(),
            resolution: Resolution::default(),
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub model: ClipVariant,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default)]
    pub device: Device,

    /// Local ONNX export of the visual encoder. Required for variants
    /// without a bundled download.
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Cache for downloaded model files.
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    #[serde(default = "default_input_name")]
    pub input_name: String,

    #[serde(default = "default_output_name")]
    pub output_name: String,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_batch_size() -> usize {
    32
}

fn default_models_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("distant-viewing")
        .join("models")
}

fn default_input_name() -> String {
    "pixel_values".to_string()
}

fn default_output_name() -> String {
    "image_embeds".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_image_extensions() -> Vec<String> {
    vec![
        "jpg".to_string(),
        "jpeg".to_string(),
        "png".to_string(),
        "webp".to_string(),
    ]
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: ClipVariant::default(),
            batch_size: default_batch_size(),
            device: Device::default(),
            model_path: None,
            models_dir: default_models_dir(),
            input_name: default_input_name(),
            output_name: default_output_name(),
            intra_threads: default_intra_threads(),
            image_extensions: default_image_extensions(),
        }
    }
}

impl Config {
    /// Load from `$DISTANT_VIEWING_CONFIG` if set, otherwise from the default
    /// location, falling back to defaults when no file exists there.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load_from(Path::new(&path));
        }

        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("Config file not found: {}", path.display());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;

        Ok(config)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("distant-viewing")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [colab]
            project_folder = "Workshop_2025"

            [download]
            resolution = "1000"
            workers = 4

            [embeddings]
            model = "ViT-L/14"
            device = "cpu"
            "#,
        )
        .unwrap();

        assert_eq!(config.colab.project_folder, "Workshop_2025");
        assert_eq!(config.colab.drive_mount, "/content/drive");
        assert_eq!(config.download.resolution, Resolution::R1000);
        assert_eq!(config.download.workers, 4);
        assert_eq!(config.download.delay_ms, 100);
        assert_eq!(config.embeddings.model, ClipVariant::VitL14);
        assert_eq!(config.embeddings.device, Device::Cpu);
        assert_eq!(config.embeddings.batch_size, 32);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_empty_config_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.embeddings.model, ClipVariant::VitB32);
        assert_eq!(config.download.resolution, Resolution::R500);
        assert_eq!(
            config.colab.install_packages,
            vec!["git+https://github.com/openai/CLIP.git", "ftfy"]
        );
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load_from(&dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[embeddings]\nbatch_size = 8\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.embeddings.batch_size, 8);
    }
}
