//! Background removal with a pretrained foreground-segmentation model.
//!
//! The [`MattingPipeline`] decodes an image, loads the model once through a shared
//! [`ModelRegistry`], predicts an alpha matte and writes it into the alpha channel of the
//! original pixels. The result is a lossless PNG exposed through a revocable
//! [`ResourceHandle`].

pub mod compositor;
pub mod config;
pub mod encoder;
pub mod errors;
pub mod imageops;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod registry;
pub mod resource;
pub mod traits;

pub mod mocks;

pub use compositor::MaskCompositor;
pub use config::Config;
pub use encoder::{PipelineResult, ResultEncoder};
pub use errors::{MattingError, Result};
pub use model::{ModelOverrides, ModelSpec, ModelType, OrtModelSource, OrtSegmenter, RMBG_MODEL_ID};
pub use pipeline::{ImageInput, MattingPipeline};
pub use processor::{PreparedTensor, Preprocessor, ProcessorConfig, Resample, TensorFrame};
pub use registry::{LoadedModel, ModelRegistry, RegistryStatus};
pub use resource::{ResourceHandle, ResourceStore};
pub use traits::*;
