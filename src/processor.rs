use image::{buffer::ConvertBuffer, imageops, imageops::FilterType, Rgb, RgbImage, RgbaImage};
use ndarray::prelude::*;
use ndarray::Zip;
use nshare::AsNdarray3;
use serde::{Deserialize, Serialize};

use crate::errors::{MattingError, Result};
use crate::imageops::padding;

/// Resampling policy, encoded with the PIL filter codes used by preprocessor configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Resample {
    Nearest,
    Lanczos,
    Bilinear,
    Bicubic,
}

impl Resample {
    pub const fn filter_type(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Lanczos => FilterType::Lanczos3,
            Self::Bilinear => FilterType::Triangle,
            Self::Bicubic => FilterType::CatmullRom,
        }
    }
}

impl TryFrom<u8> for Resample {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Nearest),
            1 => Ok(Self::Lanczos),
            2 => Ok(Self::Bilinear),
            3 => Ok(Self::Bicubic),
            _ => Err(format!("unsupported resample code {}", code)),
        }
    }
}

impl From<Resample> for u8 {
    fn from(resample: Resample) -> Self {
        match resample {
            Resample::Nearest => 0,
            Resample::Lanczos => 1,
            Resample::Bilinear => 2,
            Resample::Bicubic => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

/// Preprocessing parameters, in the shape of a Hugging Face preprocessor config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(rename = "do_normalize")]
    pub normalize: bool,
    #[serde(rename = "do_pad")]
    pub pad: bool,
    #[serde(rename = "do_rescale")]
    pub rescale: bool,
    #[serde(rename = "do_resize")]
    pub resize: bool,
    #[serde(rename = "image_mean")]
    pub mean: [f32; 3],
    #[serde(rename = "image_std")]
    pub std: [f32; 3],
    pub resample: Resample,
    pub rescale_factor: f32,
    pub size: TargetSize,
}

impl ProcessorConfig {
    /// Preprocessing contract of `briaai/RMBG-1.4`.
    pub const fn rmbg() -> Self {
        Self {
            normalize: true,
            pad: false,
            rescale: true,
            resize: true,
            mean: [0.5, 0.5, 0.5],
            std: [1.0, 1.0, 1.0],
            resample: Resample::Bilinear,
            rescale_factor: 0.003_921_568_627_450_98,
            size: TargetSize {
                width: 1024,
                height: 1024,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(MattingError::Configuration { message });

        if self.size.width == 0 || self.size.height == 0 {
            return invalid(format!(
                "target size {}x{} must be non-zero",
                self.size.width, self.size.height
            ));
        }
        if !self.rescale_factor.is_finite() || self.rescale_factor <= 0.0 {
            return invalid(format!(
                "rescale factor {} must be finite and positive",
                self.rescale_factor
            ));
        }
        if self.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return invalid(format!("channel std {:?} must be finite and non-zero", self.std));
        }
        if self.mean.iter().any(|m| !m.is_finite()) {
            return invalid(format!("channel mean {:?} must be finite", self.mean));
        }
        Ok(())
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::rmbg()
    }
}

/// Spatial bookkeeping of a prepared tensor: its size and where the image sits inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorFrame {
    pub width: u32,
    pub height: u32,
    /// Content rectangle `[x, y, w, h]` occupied by the source image.
    pub content: [u32; 4],
}

impl TensorFrame {
    pub const fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            content: [0, 0, width, height],
        }
    }

    pub const fn is_full(&self) -> bool {
        let [x, y, w, h] = self.content;
        x == 0 && y == 0 && w == self.width && h == self.height
    }
}

#[derive(Debug, Clone)]
pub struct PreparedTensor {
    /// NCHW `[1, 3, H, W]`.
    pub tensor: Array4<f32>,
    pub frame: TensorFrame,
}

#[derive(Debug, Clone)]
pub struct Preprocessor {
    config: ProcessorConfig,
}

impl Preprocessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub const fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn prepare(&self, image: &RgbaImage) -> Result<PreparedTensor> {
        let _span = tracing::debug_span!("prepare", width = image.width(), height = image.height())
            .entered();

        if image.width() == 0 || image.height() == 0 {
            return Err(MattingError::empty_image(image.width(), image.height()));
        }

        let rgb: RgbImage = image.convert();
        let (rgb, frame) = self.resize(rgb);

        let pixels = rgb.as_ndarray3();
        let (height, width) = (pixels.shape()[1], pixels.shape()[2]);
        let mut tensor = Array4::<f32>::zeros((1, 3, height, width));

        for channel in 0..3 {
            Zip::from(tensor.slice_mut(s![0, channel, .., ..]))
                .and(pixels.slice(s![channel, .., ..]))
                .for_each(|out, &value| *out = self.normalize(value, channel));
        }

        Ok(PreparedTensor { tensor, frame })
    }

    fn resize(&self, rgb: RgbImage) -> (RgbImage, TensorFrame) {
        let (width, height) = rgb.dimensions();
        if !self.config.resize {
            return (rgb, TensorFrame::full(width, height));
        }

        let TargetSize {
            width: target_width,
            height: target_height,
        } = self.config.size;
        let filter = self.config.resample.filter_type();

        if !self.config.pad {
            let resized = if (width, height) == (target_width, target_height) {
                rgb
            } else {
                imageops::resize(&rgb, target_width, target_height, filter)
            };
            return (resized, TensorFrame::full(target_width, target_height));
        }

        let (fit_width, fit_height) = padding::fit_within(width, height, target_width, target_height);
        let fitted = imageops::resize(&rgb, fit_width, fit_height, filter);
        match padding::pad_center(&fitted, target_width, target_height, Rgb([0, 0, 0])) {
            Some((canvas, (x, y))) => (
                canvas,
                TensorFrame {
                    width: target_width,
                    height: target_height,
                    content: [x, y, fit_width, fit_height],
                },
            ),
            None => (fitted, TensorFrame::full(fit_width, fit_height)),
        }
    }

    fn normalize(&self, value: u8, channel: usize) -> f32 {
        let mut value = f32::from(value);
        if self.config.rescale {
            value *= self.config.rescale_factor;
        }
        if self.config.normalize {
            value = (value - self.config.mean[channel]) / self.config.std[channel];
        }
        value
    }
}
