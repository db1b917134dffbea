use image::{imageops, GrayImage, RgbaImage};
use ndarray::prelude::*;
use num_traits::AsPrimitive;

use crate::errors::{MattingError, Result};
use crate::imageops::{AlphaMaskError, PixelLayout, ReplaceAlpha};
use crate::processor::{Resample, TensorFrame};

/// Default ceiling for a single output pixel buffer.
pub const DEFAULT_MAX_ALLOC: u64 = 512 * 1024 * 1024;

/// Writes a segmentation mask into the alpha channel of the original image.
#[derive(Debug, Clone, Copy)]
pub struct MaskCompositor {
    resample: Resample,
    max_alloc: u64,
}

impl MaskCompositor {
    /// `resample` must be the preprocessor's policy so mask edges line up with the source.
    pub const fn new(resample: Resample) -> Self {
        Self {
            resample,
            max_alloc: DEFAULT_MAX_ALLOC,
        }
    }

    pub const fn with_max_alloc(mut self, bytes: u64) -> Self {
        self.max_alloc = bytes;
        self
    }

    pub fn composite(
        &self,
        original: &RgbaImage,
        mask: ArrayViewD<f32>,
        frame: &TensorFrame,
    ) -> Result<RgbaImage> {
        let _span = tracing::debug_span!("composite").entered();
        let (width, height) = original.dimensions();

        let mask = mask_to_luma(mask, frame)?;
        let mask = self.fit_mask(mask, frame, width, height);
        if mask.dimensions() != (width, height) {
            return Err(MattingError::MaskMismatch {
                expected: (width, height),
                actual: mask.dimensions(),
            });
        }

        let mut buffer = PixelLayout::rgba(width, height).allocate(self.max_alloc)?;
        buffer.extend_from_slice(original.as_raw());
        let mut output = RgbaImage::from_raw(width, height, buffer).ok_or_else(|| {
            MattingError::UnsupportedPlatform {
                reason: format!("could not build a {}x{} pixel buffer", width, height),
            }
        })?;

        output.replace_alpha_mut(&mask).map_err(|e| match e {
            AlphaMaskError::DimensionMismatch { expected, actual } => {
                MattingError::MaskMismatch { expected, actual }
            }
            AlphaMaskError::TruncatedBuffer { .. } => MattingError::UnsupportedPlatform {
                reason: e.to_string(),
            },
        })?;

        Ok(output)
    }

    /// Crop the mask to the image content, then scale it to the source resolution.
    fn fit_mask(&self, mask: GrayImage, frame: &TensorFrame, width: u32, height: u32) -> GrayImage {
        let mask = if frame.is_full() {
            mask
        } else {
            let [x, y, w, h] = frame.content;
            imageops::crop_imm(&mask, x, y, w, h).to_image()
        };

        if mask.dimensions() == (width, height) {
            mask
        } else {
            imageops::resize(&mask, width, height, self.resample.filter_type())
        }
    }
}

/// Convert a single-channel probability tensor into an 8-bit mask of the frame's size.
///
/// The tensor must end in `[H, W]` matching the frame with every leading dimension equal
/// to 1; anything else is rejected before a single value is read.
pub fn mask_to_luma(mask: ArrayViewD<f32>, frame: &TensorFrame) -> Result<GrayImage> {
    let expected = [frame.height as usize, frame.width as usize];
    let shape = mask.shape();
    let valid = shape.len() >= 2
        && shape[shape.len() - 2..] == expected
        && shape[..shape.len() - 2].iter().all(|&d| d == 1);
    if !valid {
        return Err(MattingError::inference(
            "mask shape validation",
            format!(
                "expected a single-channel {}x{} mask, got shape {:?}",
                frame.width, frame.height, shape
            ),
        ));
    }

    let values = mask
        .iter()
        .map(|&v| (v * 255.0).clamp(0.0, 255.0).as_())
        .collect::<Vec<u8>>();

    GrayImage::from_raw(frame.width, frame.height, values).ok_or_else(|| {
        MattingError::inference("mask conversion", "mask buffer does not match its shape")
    })
}
