//! CLIP (Contrastive Language-Image Pre-training) image embeddings
//!
//! The pretrained visual encoder runs through ONNX Runtime; this module only
//! prepares pixels and hands them over.

mod model;
pub mod preprocess;

pub use model::{ClipModel, ClipOptions, ClipVariant, Device, ImageEncoder};
