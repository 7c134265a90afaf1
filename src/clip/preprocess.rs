//! CLIP image preprocessing: shortest-side resize, center crop, normalize.

use anyhow::{anyhow, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::Array3;
use std::path::Path;

/// CLIP normalization constants
pub const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
pub const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Decode an image file and preprocess it for an encoder with the given
/// input resolution.
pub fn load_image(path: &Path, size: u32) -> Result<Array3<f32>> {
    let img = image::open(path).map_err(|e| anyhow!("Failed to load image: {}", e))?;
    Ok(preprocess(&img, size))
}

/// Resize so the shorter side equals `size` (keeping aspect ratio), then
/// crop the central `size`×`size` square.
pub fn resize_and_crop(img: &DynamicImage, size: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = if width <= height {
        let scaled = (size as f64 * height as f64 / width.max(1) as f64) as u32;
        (size, scaled.max(size))
    } else {
        let scaled = (size as f64 * width as f64 / height.max(1) as f64) as u32;
        (scaled.max(size), size)
    };

    let resized = img.resize_exact(new_width, new_height, FilterType::CatmullRom);
    let x = (new_width - size) / 2;
    let y = (new_height - size) / 2;
    resized.crop_imm(x, y, size, size)
}

/// Convert to a normalized CHW tensor.
pub fn preprocess(img: &DynamicImage, size: u32) -> Array3<f32> {
    let rgb = resize_and_crop(img, size).to_rgb8();

    Array3::from_shape_fn((3, size as usize, size as usize), |(c, y, x)| {
        let pixel = rgb.get_pixel(x as u32, y as u32);
        // Normalize: (pixel/255 - mean) / std
        ((pixel[c] as f32 / 255.0) - CLIP_MEAN[c]) / CLIP_STD[c]
    })
}
