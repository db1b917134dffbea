use std::path::{Path, PathBuf};

use hf_hub::{api::sync::ApiBuilder, Repo, RepoType};
use ndarray::prelude::*;
use ort::execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::{MattingError, Result};
use crate::processor::ProcessorConfig;
use crate::traits::{ModelSource, Segmenter};

pub const RMBG_MODEL_ID: &str = "briaai/RMBG-1.4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    Custom,
}

/// Overrides applied when acquiring a model whose repository ships no usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverrides {
    pub model_type: ModelType,
    /// Whether `config.json` must be present next to the weights.
    pub require_config_file: bool,
}

impl ModelOverrides {
    pub const fn custom() -> Self {
        Self {
            model_type: ModelType::Custom,
            require_config_file: false,
        }
    }
}

/// Everything needed to acquire a model and its matching preprocessor.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    pub model_id: String,
    pub revision: String,
    pub weights_file: String,
    pub input_name: String,
    pub output_name: String,
    pub overrides: ModelOverrides,
    pub processor: ProcessorConfig,
}

impl ModelSpec {
    pub fn rmbg() -> Self {
        Self {
            model_id: RMBG_MODEL_ID.to_string(),
            revision: "main".to_string(),
            weights_file: "onnx/model.onnx".to_string(),
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            overrides: ModelOverrides::custom(),
            processor: ProcessorConfig::rmbg(),
        }
    }

    pub fn with_model_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = model_id.into();
        self
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self::rmbg()
    }
}

/// ONNX Runtime session behind the `Segmenter` contract.
pub struct OrtSegmenter {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl Segmenter for OrtSegmenter {
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let input = tensor.as_standard_layout();
        let mut session = self.session.lock();
        let outputs = session.run(
            ort::inputs![self.input_name.as_str() => TensorRef::from_array_view(&input)?],
        )?;
        Ok(outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .to_owned())
    }
}

/// Loads RMBG weights from a local file or the Hugging Face Hub into an `ort` session.
#[derive(Debug, Clone, Default)]
pub struct OrtModelSource {
    model_path: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    device_id: i32,
}

impl OrtModelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a local `.onnx` file instead of downloading from the hub.
    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = Some(path.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub const fn with_device_id(mut self, device_id: i32) -> Self {
        self.device_id = device_id;
        self
    }

    fn resolve_weights(&self, spec: &ModelSpec) -> Result<PathBuf> {
        if let Some(path) = &self.model_path {
            if !path.exists() {
                return Err(MattingError::FileSystem {
                    path: path.clone(),
                    operation: "model file lookup".to_string(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "model file does not exist",
                    ),
                });
            }
            return Ok(path.clone());
        }

        tracing::info!(
            model_id = %spec.model_id,
            revision = %spec.revision,
            "fetching model weights from the hub"
        );

        let mut builder = ApiBuilder::new().with_progress(false);
        if let Some(dir) = &self.cache_dir {
            builder = builder.with_cache_dir(dir.clone());
        }
        let api = builder
            .build()
            .map_err(|e| MattingError::model("hub client initialization", e))?;
        let repo = api.repo(Repo::with_revision(
            spec.model_id.clone(),
            RepoType::Model,
            spec.revision.clone(),
        ));

        if spec.overrides.require_config_file {
            repo.get("config.json")
                .map_err(|e| MattingError::model("config.json download", e))?;
        }

        repo.get(&spec.weights_file)
            .map_err(|e| MattingError::model(format!("{} download", spec.weights_file), e))
    }

    fn build_session(&self, weights: &Path) -> Result<Session> {
        SessionBuilder::new()
            .map_err(|e| MattingError::model("session builder initialization", e))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(self.device_id)
                    .build(),
            ])
            .map_err(|e| MattingError::model("execution provider setup", e))?
            .with_memory_pattern(true)
            .map_err(|e| MattingError::model("memory pattern setup", e))?
            .commit_from_file(weights)
            .map_err(|e| MattingError::model(format!("model load: {}", weights.display()), e))
    }
}

impl ModelSource for OrtModelSource {
    type Segmenter = OrtSegmenter;

    fn load(&self, spec: &ModelSpec) -> Result<OrtSegmenter> {
        let weights = self.resolve_weights(spec)?;
        let session = self.build_session(&weights)?;

        for (name, names) in [
            (&spec.input_name, session.inputs.iter().map(|i| &i.name).collect::<Vec<_>>()),
            (&spec.output_name, session.outputs.iter().map(|o| &o.name).collect::<Vec<_>>()),
        ] {
            if !names.contains(&name) {
                return Err(MattingError::model(
                    "model signature check",
                    format!("tensor `{}` not found, model exposes {:?}", name, names),
                ));
            }
        }

        let segmenter = OrtSegmenter {
            session: Mutex::new(session),
            input_name: spec.input_name.clone(),
            output_name: spec.output_name.clone(),
        };

        // warm-up run so an incompatible runtime fails here rather than on the first image
        let size = spec.processor.size;
        let data = Array4::<f32>::zeros((1, 3, size.height as usize, size.width as usize));
        let mask = segmenter
            .infer(data.view())
            .map_err(|e| MattingError::model("warm-up inference", e))?;
        let spatial = &mask.shape()[mask.ndim().saturating_sub(2)..];
        if spatial != [size.height as usize, size.width as usize] {
            return Err(MattingError::model(
                "warm-up inference",
                format!(
                    "output shape {:?} does not end in {}x{}",
                    mask.shape(),
                    size.height,
                    size.width
                ),
            ));
        }

        tracing::info!(weights = %weights.display(), "model session ready");
        Ok(segmenter)
    }
}
