pub mod batch;
pub mod config;
pub mod error;
pub mod fallback;
pub mod health;
pub mod model;
pub mod red_team;
pub mod server;
pub mod service;

pub use batch::BatchCoordinator;
pub use config::AppConfig;
pub use error::ServiceError;
pub use fallback::FallbackGenerator;
pub use health::HealthReporter;
pub use model::{
    BackendState, BatchItemResult, GenerationRequest, GenerationResult, InferenceBackend,
    bootstrap,
};
pub use server::build_router;
pub use service::{Generate, GenerationService};
