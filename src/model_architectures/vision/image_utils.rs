//! Image preprocessing for the classifier models.
//!
//! Decodes raw request bytes, resizes to the fixed 224x224 input contract
//! shared by every registered model, and normalizes pixel values into the
//! range the target model family was trained on. Pure function of its
//! input: identical bytes and mode always produce the identical tensor.

use candle_core::{Device, Tensor};
use image::RgbImage;

use crate::core::{ServingError, ServingResult};

/// Fixed spatial input size for every registered model.
pub const INPUT_SIZE: u32 = 224;

/// Pixel normalization convention, selected by the registry per model
/// family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreprocessMode {
    /// `pixel / 255` -> [0, 1]. Used by the per-category ConvNets.
    Unit,
    /// `pixel / 127.5 - 1` -> [-1, 1]. Used by the default ViT.
    Symmetric,
}

impl PreprocessMode {
    fn normalize(self, value: u8) -> f32 {
        match self {
            PreprocessMode::Unit => value as f32 / 255.0,
            PreprocessMode::Symmetric => value as f32 / 127.5 - 1.0,
        }
    }
}

/// Decode image bytes, resize to 224x224, normalize, and emit an HWC f32
/// tensor of shape `[224, 224, 3]`.
///
/// Decode failures are prediction errors carrying the decoder's message;
/// no partial result is produced.
pub fn preprocess_image(
    image_bytes: &[u8],
    mode: PreprocessMode,
    device: &Device,
) -> ServingResult<Tensor> {
    let decoded = image::load_from_memory(image_bytes)
        .map_err(|e| ServingError::prediction("image decode", e))?;

    // Plain resize to the exact model input size. The input contract is
    // dimensional, not aspect-preserving, so no crop is involved.
    let rgb = decoded.to_rgb8();
    let resized = image::imageops::resize(
        &rgb,
        INPUT_SIZE,
        INPUT_SIZE,
        image::imageops::FilterType::Triangle,
    );

    image_to_tensor(&resized, mode, device)
}

fn image_to_tensor(img: &RgbImage, mode: PreprocessMode, device: &Device) -> ServingResult<Tensor> {
    let (width, height) = img.dimensions();
    let mut pixels = Vec::with_capacity((height * width * 3) as usize);

    // HWC layout: row-major pixels, channels innermost. Patch extraction
    // downstream depends on this ordering.
    for y in 0..height {
        for x in 0..width {
            let pixel = img.get_pixel(x, y);
            for c in 0..3 {
                pixels.push(mode.normalize(pixel[c]));
            }
        }
    }

    Tensor::from_vec(pixels, (height as usize, width as usize, 3), device)
        .map_err(|e| ServingError::prediction("image tensor conversion", e))
}
