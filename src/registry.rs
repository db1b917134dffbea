use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::errors::{MattingError, Result, SharedSource};
use crate::model::ModelSpec;
use crate::processor::Preprocessor;
use crate::traits::ModelSource;

/// A loaded segmenter together with the preprocessor that matches its input contract.
pub struct LoadedModel<M> {
    pub segmenter: M,
    pub preprocessor: Preprocessor,
}

/// Observable lifecycle of a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

#[derive(Clone)]
struct LoadFailure {
    model_id: String,
    source: SharedSource,
}

impl From<LoadFailure> for MattingError {
    fn from(failure: LoadFailure) -> Self {
        Self::Load {
            model_id: failure.model_id,
            source: failure.source,
        }
    }
}

type Outcome<M> = std::result::Result<Arc<LoadedModel<M>>, LoadFailure>;

enum LoadState<M> {
    Unloaded,
    Loading(watch::Receiver<Option<Outcome<M>>>),
    Ready(Arc<LoadedModel<M>>),
    Failed(LoadFailure),
}

/// Lazy, single-flight owner of the segmentation model and its preprocessor.
///
/// The first caller starts the load on the blocking pool; every concurrent caller waits on
/// the same flight and observes the same outcome. A successful load is kept for the life of
/// the registry. A failed load is recorded but not sticky: the next call starts a new flight.
pub struct ModelRegistry<S: ModelSource> {
    source: Arc<S>,
    spec: ModelSpec,
    state: Arc<Mutex<LoadState<S::Segmenter>>>,
}

impl<S: ModelSource> ModelRegistry<S> {
    pub fn new(source: S, spec: ModelSpec) -> Self {
        Self {
            source: Arc::new(source),
            spec,
            state: Arc::new(Mutex::new(LoadState::Unloaded)),
        }
    }

    pub const fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    pub fn status(&self) -> RegistryStatus {
        match &*self.state.lock() {
            LoadState::Unloaded => RegistryStatus::Unloaded,
            LoadState::Loading(_) => RegistryStatus::Loading,
            LoadState::Ready(_) => RegistryStatus::Ready,
            LoadState::Failed(_) => RegistryStatus::Failed,
        }
    }

    /// Make sure the model is loaded, loading it if needed.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn ensure_ready(&self) -> Result<()> {
        self.acquire().await.map(|_| ())
    }

    /// Return the loaded model, loading it if needed.
    pub async fn acquire(&self) -> Result<Arc<LoadedModel<S::Segmenter>>> {
        let (mut flight, leader) = {
            let mut state = self.state.lock();
            match &*state {
                LoadState::Ready(loaded) => return Ok(Arc::clone(loaded)),
                LoadState::Loading(flight) => (flight.clone(), None),
                LoadState::Unloaded | LoadState::Failed(_) => {
                    let (tx, rx) = watch::channel(None);
                    *state = LoadState::Loading(rx.clone());
                    (rx, Some(tx))
                }
            }
        };

        if let Some(tx) = leader {
            self.start_flight(tx);
        }

        let published = flight
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone());

        match published {
            Ok(Some(Ok(loaded))) => Ok(loaded),
            Ok(Some(Err(failure))) => Err(failure.into()),
            Ok(None) | Err(_) => {
                // the load task ended without publishing an outcome
                let mut state = self.state.lock();
                if let LoadState::Loading(current) = &*state {
                    if current.same_channel(&flight) {
                        *state = LoadState::Unloaded;
                    }
                }
                Err(MattingError::Load {
                    model_id: self.spec.model_id.clone(),
                    source: Arc::new(std::io::Error::new(
                        std::io::ErrorKind::Interrupted,
                        "model load task terminated before completing",
                    )),
                })
            }
        }
    }

    fn start_flight(&self, tx: watch::Sender<Option<Outcome<S::Segmenter>>>) {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let spec = self.spec.clone();

        tracing::info!(model_id = %spec.model_id, "loading segmentation model");

        tokio::task::spawn_blocking(move || {
            let outcome = load(source.as_ref(), &spec);

            {
                let mut state = state.lock();
                *state = match &outcome {
                    Ok(loaded) => LoadState::Ready(Arc::clone(loaded)),
                    Err(failure) => LoadState::Failed(failure.clone()),
                };
            }

            match &outcome {
                Ok(_) => tracing::info!(model_id = %spec.model_id, "segmentation model ready"),
                Err(failure) => tracing::warn!(
                    model_id = %spec.model_id,
                    error = %failure.source,
                    "segmentation model failed to load"
                ),
            }

            // receivers may all be gone when every caller was dropped
            let _ = tx.send(Some(outcome));
        });
    }
}

fn load<S: ModelSource>(source: &S, spec: &ModelSpec) -> Outcome<S::Segmenter> {
    let loaded = Preprocessor::new(spec.processor.clone()).and_then(|preprocessor| {
        let segmenter = source.load(spec)?;
        Ok(LoadedModel {
            segmenter,
            preprocessor,
        })
    });

    loaded.map(Arc::new).map_err(|e| LoadFailure {
        model_id: spec.model_id.clone(),
        source: Arc::new(e),
    })
}
