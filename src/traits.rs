use ndarray::prelude::*;

use crate::errors::Result;
use crate::model::ModelSpec;

/// Opaque foreground-segmentation capability.
///
/// Consumes an NCHW `[1, 3, H, W]` tensor and produces a single-channel probability map
/// whose trailing dimensions are `[H, W]`. Nothing else about the backend is assumed, so
/// any runtime satisfying this contract can be swapped in without touching compositing.
pub trait Segmenter: Send + Sync {
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>>;
}

/// Loads a segmenter for a model spec.
///
/// Called from the blocking pool by `ModelRegistry`; implementations may download weights
/// and build runtime sessions synchronously.
pub trait ModelSource: Send + Sync + 'static {
    type Segmenter: Segmenter + 'static;

    fn load(&self, spec: &ModelSpec) -> Result<Self::Segmenter>;
}

impl<T: Segmenter + ?Sized> Segmenter for Box<T> {
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        (**self).infer(tensor)
    }
}
