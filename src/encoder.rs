use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

use crate::errors::{MattingError, Result};
use crate::resource::{ResourceHandle, ResourceStore};

pub const PNG_MIME: &str = "image/png";

/// A processed image, owned by the caller until its handle is revoked.
#[derive(Debug)]
pub struct PipelineResult {
    pub width: u32,
    pub height: u32,
    pub handle: ResourceHandle,
}

impl PipelineResult {
    pub fn url(&self) -> &str {
        self.handle.url()
    }

    pub fn bytes(&self) -> &[u8] {
        self.handle.bytes()
    }

    pub fn revoke(self) {
        self.handle.revoke();
    }
}

/// Serializes composited images to lossless RGBA PNG resources.
#[derive(Debug, Clone, Default)]
pub struct ResultEncoder {
    store: ResourceStore,
}

impl ResultEncoder {
    pub const fn new(store: ResourceStore) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &ResourceStore {
        &self.store
    }

    pub fn encode(&self, image: &RgbaImage) -> Result<PipelineResult> {
        let _span = tracing::debug_span!("encode").entered();
        let (width, height) = image.dimensions();

        let bytes = encode_png(image)?;
        Ok(PipelineResult {
            width,
            height,
            handle: self.store.register(bytes, PNG_MIME),
        })
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, CompressionType::Default, FilterType::Adaptive)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|source| MattingError::Encode { source })?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_encode_preserves_pixels_and_alpha() -> Result<()> {
        let image = RgbaImage::from_fn(31, 17, |x, y| {
            Rgba([x as u8 * 8, y as u8 * 15, (x ^ y) as u8, (x * y % 256) as u8])
        });
        let encoder = ResultEncoder::default();

        let result = encoder.encode(&image)?;
        assert_eq!((result.width, result.height), (31, 17));

        let decoded = image::load_from_memory(result.bytes())
            .map_err(|source| MattingError::Decode { source })?
            .to_rgba8();
        assert_eq!(decoded, image);

        result.revoke();
        assert_eq!(encoder.store().live_count(), 0);
        Ok(())
    }

    #[test]
    fn test_encoded_result_resolves_by_url() -> Result<()> {
        let encoder = ResultEncoder::default();
        let result = encoder.encode(&RgbaImage::new(2, 2))?;

        let (bytes, mime) = encoder.store().resolve(result.url()).unwrap();
        assert_eq!(&*bytes, result.bytes());
        assert_eq!(mime, "image/png");
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));

        result.revoke();
        Ok(())
    }
}
