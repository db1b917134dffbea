use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;

use image::{DynamicImage, ImageDecoder, ImageReader, ImageResult, RgbaImage};

use crate::compositor::MaskCompositor;
use crate::encoder::{PipelineResult, ResultEncoder};
use crate::errors::{MattingError, Result};
use crate::model::ModelSpec;
use crate::registry::ModelRegistry;
use crate::resource::{ResourceHandle, ResourceStore};
use crate::traits::{ModelSource, Segmenter};

/// Pipeline input: raw bytes in any decodable format, or an already decoded image.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Decoded(RgbaImage),
    Bytes(Vec<u8>),
}

impl ImageInput {
    /// Decode to RGBA in display orientation. Empty images are rejected here so they never
    /// reach the model.
    pub fn decode(self) -> Result<RgbaImage> {
        let image = match self {
            Self::Decoded(image) => image,
            Self::Bytes(bytes) => decode_oriented(&bytes)
                .map(|image| image.to_rgba8())
                .map_err(|source| MattingError::Decode { source })?,
        };

        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(MattingError::empty_image(width, height));
        }
        Ok(image)
    }
}

/// Decode `bytes` and apply the EXIF orientation, if any, to the pixels.
fn decode_oriented(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

impl From<RgbaImage> for ImageInput {
    fn from(image: RgbaImage) -> Self {
        Self::Decoded(image)
    }
}

impl From<DynamicImage> for ImageInput {
    fn from(image: DynamicImage) -> Self {
        Self::Decoded(image.to_rgba8())
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for ImageInput {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

/// Background removal: decode → preprocess → segment → composite → encode.
///
/// The registry is the only long-lived state and is shared across invocations; every
/// other stage works on data owned by the current call.
pub struct MattingPipeline<S: ModelSource> {
    registry: Arc<ModelRegistry<S>>,
    compositor: MaskCompositor,
    encoder: ResultEncoder,
}

impl<S: ModelSource> MattingPipeline<S> {
    pub fn new(source: S, spec: ModelSpec) -> Self {
        Self::with_registry(Arc::new(ModelRegistry::new(source, spec)))
    }

    pub fn with_registry(registry: Arc<ModelRegistry<S>>) -> Self {
        let compositor = MaskCompositor::new(registry.spec().processor.resample);
        Self {
            registry,
            compositor,
            encoder: ResultEncoder::default(),
        }
    }

    pub fn with_compositor(mut self, compositor: MaskCompositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_store(mut self, store: ResourceStore) -> Self {
        self.encoder = ResultEncoder::new(store);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry<S>> {
        &self.registry
    }

    pub const fn store(&self) -> &ResourceStore {
        self.encoder.store()
    }

    /// Load the model ahead of the first `process` call.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.registry.ensure_ready().await
    }

    /// Register the untouched input bytes so the caller can show the source image.
    pub fn preview(&self, bytes: Vec<u8>, mime: &'static str) -> ResourceHandle {
        self.store().register(bytes, mime)
    }

    pub async fn process(&self, input: impl Into<ImageInput>) -> Result<PipelineResult> {
        let input = input.into();
        let image = tokio::task::spawn_blocking(move || input.decode())
            .await
            .map_err(|source| MattingError::Runtime {
                operation: "image decoding".to_string(),
                source,
            })??;

        let model = self.registry.acquire().await?;
        let compositor = self.compositor;
        let encoder = self.encoder.clone();

        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let (width, height) = image.dimensions();

            let prepared = model.preprocessor.prepare(&image)?;
            let mask = {
                let _span = tracing::debug_span!("infer").entered();
                model.segmenter.infer(prepared.tensor.view())?
            };
            let composited = compositor.composite(&image, mask.view(), &prepared.frame)?;
            drop(image);
            let result = encoder.encode(&composited)?;

            tracing::info!(
                width,
                height,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "background removed"
            );
            Ok(result)
        })
        .await
        .map_err(|source| MattingError::Runtime {
            operation: "background removal".to_string(),
            source,
        })?
    }
}
