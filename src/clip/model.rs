//! CLIP visual encoder using ONNX Runtime

use anyhow::{anyhow, bail, Context, Result};
use clap::ValueEnum;
use ndarray::{Array2, Array3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::download::{Fetcher, HttpFetcher};

/// Pretrained CLIP checkpoints the workshop knows about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum ClipVariant {
    #[serde(rename = "RN50")]
    #[value(name = "RN50")]
    Rn50,
    #[serde(rename = "RN101")]
    #[value(name = "RN101")]
    Rn101,
    #[serde(rename = "RN50x4")]
    #[value(name = "RN50x4")]
    Rn50x4,
    #[serde(rename = "RN50x16")]
    #[value(name = "RN50x16")]
    Rn50x16,
    #[default]
    #[serde(rename = "ViT-B/32")]
    #[value(name = "ViT-B/32")]
    VitB32,
    #[serde(rename = "ViT-B/16")]
    #[value(name = "ViT-B/16")]
    VitB16,
    #[serde(rename = "ViT-L/14")]
    #[value(name = "ViT-L/14")]
    VitL14,
}

impl ClipVariant {
    pub fn name(&self) -> &'static str {
        match self {
            ClipVariant::Rn50 => "RN50",
            ClipVariant::Rn101 => "RN101",
            ClipVariant::Rn50x4 => "RN50x4",
            ClipVariant::Rn50x16 => "RN50x16",
            ClipVariant::VitB32 => "ViT-B/32",
            ClipVariant::VitB16 => "ViT-B/16",
            ClipVariant::VitL14 => "ViT-L/14",
        }
    }

    /// Square input resolution of the visual encoder.
    pub fn input_size(&self) -> u32 {
        match self {
            ClipVariant::Rn50x4 => 288,
            ClipVariant::Rn50x16 => 384,
            _ => 224,
        }
    }

    /// Published ONNX export of the visual encoder, if there is one we trust.
    fn download(&self) -> Option<(&'static str, &'static str)> {
        match self {
            // Source: https://huggingface.co/Qdrant/clip-ViT-B-32-vision
            ClipVariant::VitB32 => Some((
                "clip-vit-b32-vision.onnx",
                "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx",
            )),
            _ => None,
        }
    }
}

impl fmt::Display for ClipVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where inference runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CUDA when compiled in and available, otherwise CPU
    #[default]
    Auto,
    Cpu,
    Cuda,
}

/// An image encoder working on preprocessed CHW tensors.
pub trait ImageEncoder {
    /// Identifier stored alongside the embeddings.
    fn model_name(&self) -> &str;

    /// Square input resolution expected by `encode`.
    fn input_size(&self) -> u32;

    /// Encode a batch into an `(N, D)` array, one row per input.
    fn encode(&mut self, batch: &[Array3<f32>]) -> Result<Array2<f32>>;
}

/// Settings for loading a [`ClipModel`].
#[derive(Debug, Clone)]
pub struct ClipOptions {
    pub variant: ClipVariant,
    pub device: Device,
    /// Explicit ONNX file; otherwise the variant's download is used.
    pub model_path: Option<PathBuf>,
    pub models_dir: PathBuf,
    pub input_name: String,
    pub output_name: String,
    pub intra_threads: usize,
}

/// CLIP visual encoder session
pub struct ClipModel {
    session: Session,
    variant: ClipVariant,
    input_name: String,
    output_name: String,
}

impl ClipModel {
    /// Load the visual encoder, downloading it on first use.
    pub fn load(options: &ClipOptions) -> Result<Self> {
        let model_path = match &options.model_path {
            Some(path) => {
                if !path.exists() {
                    bail!("Model file not found: {}", path.display());
                }
                path.clone()
            }
            None => {
                let (filename, url) = options.variant.download().ok_or_else(|| {
                    anyhow!(
                        "No bundled ONNX export for {}; pass --model-path",
                        options.variant
                    )
                })?;
                ensure_model(&options.models_dir, filename, url)?
            }
        };

        tracing::info!(
            model = %options.variant,
            path = ?model_path,
            device = ?options.device,
            "Loading CLIP model"
        );

        let builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?;
        let builder = with_device(builder, options.device)?;
        let session = builder.commit_from_file(&model_path)?;

        Ok(Self {
            session,
            variant: options.variant,
            input_name: options.input_name.clone(),
            output_name: options.output_name.clone(),
        })
    }
}

impl ImageEncoder for ClipModel {
    fn model_name(&self) -> &str {
        self.variant.name()
    }

    fn input_size(&self) -> u32 {
        self.variant.input_size()
    }

    fn encode(&mut self, batch: &[Array3<f32>]) -> Result<Array2<f32>> {
        if batch.is_empty() {
            bail!("Empty batch");
        }

        let size = self.input_size() as usize;
        let mut input_data = Vec::with_capacity(batch.len() * 3 * size * size);
        for image in batch {
            if image.shape() != [3, size, size] {
                bail!("Unexpected input shape {:?}", image.shape());
            }
            input_data.extend(image.iter().copied());
        }

        // NCHW
        let input_tensor = Tensor::from_array((
            [batch.len(), 3, size, size],
            input_data.into_boxed_slice(),
        ))?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])?;

        // Prefer the named projection output, else whatever comes first
        let embedding_output = outputs
            .iter()
            .find(|(name, _)| *name == self.output_name.as_str())
            .or_else(|| outputs.iter().next())
            .ok_or_else(|| anyhow!("No embedding output"))?;

        let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

        if embedding_data.is_empty() || embedding_data.len() % batch.len() != 0 {
            bail!(
                "Output of {} values does not split into {} rows",
                embedding_data.len(),
                batch.len()
            );
        }
        let dim = embedding_data.len() / batch.len();

        Ok(Array2::from_shape_vec((batch.len(), dim), embedding_data.to_vec())?)
    }
}

#[cfg(feature = "cuda")]
fn with_device(
    builder: ort::session::builder::SessionBuilder,
    device: Device,
) -> Result<ort::session::builder::SessionBuilder> {
    use ort::execution_providers::CUDAExecutionProvider;

    Ok(match device {
        Device::Cpu => builder,
        Device::Auto => {
            builder.with_execution_providers([CUDAExecutionProvider::default().build()])?
        }
        Device::Cuda => builder.with_execution_providers([CUDAExecutionProvider::default()
            .build()
            .error_on_failure()])?,
    })
}

#[cfg(not(feature = "cuda"))]
fn with_device(
    builder: ort::session::builder::SessionBuilder,
    device: Device,
) -> Result<ort::session::builder::SessionBuilder> {
    if device == Device::Cuda {
        bail!("CUDA requested but this build lacks the `cuda` feature");
    }
    Ok(builder)
}

/// Connect and per-read limit for model downloads.
const MODEL_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Download a model file into `models_dir` if it isn't cached yet.
fn ensure_model(models_dir: &Path, filename: &str, url: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(models_dir)?;
    let model_path = models_dir.join(filename);

    if !model_path.exists() {
        tracing::info!(model = %filename, "Downloading CLIP model...");
        HttpFetcher::new(MODEL_DOWNLOAD_TIMEOUT)
            .fetch(url, &model_path)
            .context("Failed to download model")?;
        tracing::info!(model = %filename, path = ?model_path, "CLIP model downloaded");
    }

    Ok(model_path)
}
