mod backend;
mod loader;
mod types;

#[cfg(feature = "tch-backend")]
pub mod tch_backend;

pub use backend::{
    BackendError, BackendHandle, BackendOutput, BackendState, Completion, InferenceBackend,
    earliest_stop,
};
pub use loader::{LoadError, bootstrap, load_backend};
pub use types::{
    BatchItemResult, ErrorPlaceholder, GenerationDefaults, GenerationParams, GenerationRequest,
    GenerationResult, SamplingParams,
};
