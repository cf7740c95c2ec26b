//! Shared image preprocessing
//!
//! Training items and inference requests both go through [`preprocess`], so
//! the model never sees differently prepared pixels at serve time.
//!
//! Steps: convert to RGB, Lanczos3 resize to `size x size` (skipped when the
//! image already has that shape), scale to [0, 1], lay out as CHW.

use std::path::Path;

use burn::prelude::*;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};

use crate::utils::error::{CropCareError, Result};

/// Number of colour channels fed to the model
pub const CHANNELS: usize = 3;

/// Convert to RGB and bring to the target resolution
pub fn prepare_rgb(image: &DynamicImage, size: u32) -> RgbImage {
    let rgb = image.to_rgb8();
    if rgb.dimensions() == (size, size) {
        return rgb;
    }
    image::imageops::resize(&rgb, size, size, FilterType::Lanczos3)
}

/// Flatten an RGB image into CHW floats in [0, 1]
pub fn to_chw(rgb: &RgbImage) -> Vec<f32> {
    let (width, height) = rgb.dimensions();
    let num_pixels = (width * height) as usize;
    let mut data = vec![0.0f32; CHANNELS * num_pixels];

    for (i, pixel) in rgb.pixels().enumerate() {
        data[i] = pixel[0] as f32 / 255.0;
        data[num_pixels + i] = pixel[1] as f32 / 255.0;
        data[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    data
}

/// Full preprocessing of a decoded image
pub fn preprocess(image: &DynamicImage, size: u32) -> Vec<f32> {
    to_chw(&prepare_rgb(image, size))
}

/// Decode an image from disk (format sniffed from content)
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    ImageReader::open(path)
        .map_err(|e| CropCareError::Image(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| CropCareError::Image(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| CropCareError::Image(path.to_path_buf(), e.to_string()))
}

/// Decode an image from memory, e.g. an uploaded file
pub fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// Decode and preprocess a file
pub fn load_preprocessed(path: &Path, size: u32) -> Result<Vec<f32>> {
    Ok(preprocess(&load_image(path)?, size))
}

/// Wrap one preprocessed image in a `[1, 3, size, size]` tensor
pub fn to_batch_tensor<B: Backend>(data: Vec<f32>, size: u32, device: &B::Device) -> Tensor<B, 4> {
    let size = size as usize;
    Tensor::<B, 4>::from_floats(TensorData::new(data, [1, CHANNELS, size, size]), device)
}
