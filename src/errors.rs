use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Shared, clonable error source used where one failure is observed by many callers.
pub type SharedSource = Arc<dyn std::error::Error + Send + Sync>;

type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the matting pipeline.
///
/// Each variant maps to one failure point of the pipeline so callers can react to
/// the kind of failure (retry a load, show an actionable message for an unsupported
/// platform, reject an input file) without parsing error strings.
#[derive(Error, Debug)]
pub enum MattingError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error("Failed to load model {model_id}")]
    Load {
        model_id: String,
        #[source]
        source: SharedSource,
    },

    #[error("Input is not a decodable image")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    #[error("Unsupported platform: {reason}")]
    UnsupportedPlatform { reason: String },

    #[error("Inference error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: BoxedSource,
    },

    #[error(
        "Mask resolution {}x{} does not match image resolution {}x{}",
        .actual.0, .actual.1, .expected.0, .expected.1
    )]
    MaskMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    #[error("Failed to encode result image")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    #[error("Runtime error: {operation} did not complete")]
    Runtime {
        operation: String,
        #[source]
        source: tokio::task::JoinError,
    },
}

pub type Result<T> = std::result::Result<T, MattingError>;

impl MattingError {
    pub(crate) fn inference(operation: impl Into<String>, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Inference {
            operation: operation.into(),
            source: message.into(),
        }
    }

    /// An image with no pixels; treated as undecodable input.
    pub(crate) fn empty_image(width: u32, height: u32) -> Self {
        Self::Decode {
            source: image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::Generic(format!(
                    "{}x{} image has no pixels",
                    width, height
                )),
            )),
        }
    }

    pub(crate) fn model(operation: impl Into<String>, source: impl Into<BoxedSource>) -> Self {
        Self::Model {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// True when the failure comes from a missing platform capability rather than the input
    /// or the model, so the caller can show an actionable message.
    pub const fn is_unsupported_platform(&self) -> bool {
        matches!(self, Self::UnsupportedPlatform { .. })
    }

    pub const fn is_load(&self) -> bool {
        matches!(self, Self::Load { .. })
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should build `MattingError::FileSystem`
/// directly; this conversion is the fallback.
impl From<std::io::Error> for MattingError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

/// ONNX Runtime errors raised while running a session are inference failures.
/// Load-time failures are wrapped explicitly as `MattingError::Model`.
impl From<ort::Error> for MattingError {
    fn from(err: ort::Error) -> Self {
        Self::Inference {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Convert ndarray shape errors to inference errors.
///
/// Shape errors only occur while moving tensors in and out of the segmenter.
impl From<ndarray::ShapeError> for MattingError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Inference {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
