use std::{fmt, sync::Arc};

use parking_lot::Mutex;
use thiserror::Error;

use crate::model::SamplingParams;

/// What a completion call hands back, independent of any engine's own
/// output structure.
pub trait BackendOutput: Send {
    fn text(&self) -> &str;

    /// Token count reported by the engine, if it reports one.
    fn token_count(&self) -> Option<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub text: String,
    pub token_count: Option<usize>,
}

impl BackendOutput for Completion {
    fn text(&self) -> &str {
        &self.text
    }

    fn token_count(&self) -> Option<usize> {
        self.token_count
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A loaded inference engine. Calls are blocking and may take seconds.
pub trait InferenceBackend: Send {
    fn complete(
        &mut self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Box<dyn BackendOutput>, BackendError>;
}

/// Shared handle to the single engine instance. Calls are serialized.
#[derive(Clone)]
pub struct BackendHandle {
    engine: Arc<Mutex<Box<dyn InferenceBackend>>>,
}

impl BackendHandle {
    pub fn new<B>(backend: B) -> Self
    where
        B: InferenceBackend + 'static,
    {
        Self {
            engine: Arc::new(Mutex::new(Box::new(backend))),
        }
    }

    pub fn complete(
        &self,
        prompt: &str,
        params: &SamplingParams,
    ) -> Result<Box<dyn BackendOutput>, BackendError> {
        self.engine.lock().complete(prompt, params)
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle").finish_non_exhaustive()
    }
}

/// Byte offset of the first stop sequence found in `text`, if any.
pub fn earliest_stop(text: &str, stop: &[String]) -> Option<usize> {
    stop.iter().filter_map(|s| text.find(s.as_str())).min()
}

/// Model availability, decided once at startup.
#[derive(Debug, Clone, Default)]
pub enum BackendState {
    Loaded(BackendHandle),
    #[default]
    Unloaded,
}

impl BackendState {
    pub fn is_loaded(&self) -> bool {
        matches!(self, BackendState::Loaded(_))
    }
}
