use image::{GrayImage, RgbaImage};
use rayon::prelude::*;
use thiserror::Error;

use super::PixelLayout;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlphaMaskError {
    #[error("mask is {}x{} but image is {}x{}", .actual.0, .actual.1, .expected.0, .expected.1)]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("pixel buffer is shorter than its {width}x{height} layout")]
    TruncatedBuffer { width: u32, height: u32 },
}

pub trait ReplaceAlpha {
    /// Overwrite the alpha channel with `mask`, leaving colour channels untouched.
    fn replace_alpha_mut(&mut self, mask: &GrayImage) -> Result<(), AlphaMaskError>;
}

impl ReplaceAlpha for RgbaImage {
    fn replace_alpha_mut(&mut self, mask: &GrayImage) -> Result<(), AlphaMaskError> {
        let (width, height) = self.dimensions();
        if mask.dimensions() != (width, height) {
            return Err(AlphaMaskError::DimensionMismatch {
                expected: (width, height),
                actual: mask.dimensions(),
            });
        }

        let layout = PixelLayout::rgba(width, height);
        let truncated = AlphaMaskError::TruncatedBuffer { width, height };
        let (Some(pixel_count), Some(byte_len)) = (layout.pixel_count(), layout.byte_len()) else {
            return Err(truncated);
        };

        let alpha = mask.as_raw().get(..pixel_count).ok_or(truncated.clone())?;
        let samples: &mut [u8] = self;
        let samples = samples.get_mut(..byte_len).ok_or(truncated)?;

        samples
            .par_chunks_exact_mut(layout.channels())
            .zip(alpha.par_iter())
            .for_each(|(pixel, &a)| pixel[PixelLayout::ALPHA] = a);

        Ok(())
    }
}
