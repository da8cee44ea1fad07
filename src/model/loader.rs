use std::{fs, path::PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    model::{BackendHandle, BackendState},
};

/// Why a model could not be brought up at startup. Never shown to callers.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("model file not found at {}", .0.display())]
    MissingFile(PathBuf),
    #[error("no inference engine is compiled into this build")]
    EngineUnavailable,
    #[error("failed to open model: {0}")]
    Engine(String),
}

/// Opens the configured model file with whichever engine is compiled in.
pub fn load_backend(config: &AppConfig) -> Result<BackendHandle, LoadError> {
    let path = &config.model_file;
    if !path.is_file() {
        return Err(LoadError::MissingFile(path.clone()));
    }
    let size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    info!(
        path = %path.display(),
        size_bytes,
        n_ctx = config.n_ctx,
        n_threads = config.n_threads,
        n_batch = config.n_batch,
        n_gpu_layers = config.n_gpu_layers,
        "opening model"
    );
    open_engine(config)
}

#[cfg(feature = "tch-backend")]
fn open_engine(config: &AppConfig) -> Result<BackendHandle, LoadError> {
    let engine = crate::model::tch_backend::TorchEngine::load(config)?;
    Ok(BackendHandle::new(engine))
}

#[cfg(not(feature = "tch-backend"))]
fn open_engine(_config: &AppConfig) -> Result<BackendHandle, LoadError> {
    Err(LoadError::EngineUnavailable)
}

/// Startup step: decides the process-wide backend state. A failed load
/// degrades to fallback generation instead of aborting.
pub fn bootstrap(config: &AppConfig) -> BackendState {
    match load_backend(config) {
        Ok(handle) => {
            info!(model = %config.model_identifier(), "model loaded successfully");
            BackendState::Loaded(handle)
        }
        Err(err) => {
            warn!(error = %err, "running in mock mode, responses will come from fallback templates");
            BackendState::Unloaded
        }
    }
}
