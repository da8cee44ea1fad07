use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRequest, State},
    routing::{get, post},
};
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    batch::BatchCoordinator,
    config::AppConfig,
    error::ServiceError,
    health::{HealthReporter, HealthResponse, ModelsResponse},
    model::{BackendState, BatchItemResult, GenerationRequest, GenerationResult},
    red_team::red_team_params,
    service::{Generate, GenerationService},
};

const SERVICE_NAME: &str = "Generation Facade API";

/// `Json` whose rejections are reported as `{"error": ...}`.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ServiceError))]
pub struct AppJson<T>(pub T);

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub service: Arc<GenerationService>,
    pub batch: Arc<BatchCoordinator<GenerationService>>,
    pub health: Arc<HealthReporter>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, backend: BackendState) -> Self {
        let health = Arc::new(HealthReporter::new(&config, &backend));
        let service = Arc::new(GenerationService::from_config(&config, backend));
        let batch = Arc::new(BatchCoordinator::new(
            service.clone(),
            config.batch_defaults.clone(),
        ));
        Self {
            config,
            service,
            batch,
            health,
        }
    }
}

pub fn build_router(config: Arc<AppConfig>, backend: BackendState) -> Router {
    let state = AppState::new(config, backend);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/models", get(list_models))
        .route("/generate", post(generate))
        .route("/generate/batch", post(generate_batch))
        .route("/red-team/generate", post(red_team_generate))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health - GET",
            "models": "/models - GET",
            "generate": "/generate - POST",
            "batch": "/generate/batch - POST",
            "red_team": "/red-team/generate - POST",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.health.health())
}

async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    Json(state.health.models())
}

async fn generate(
    State(state): State<AppState>,
    AppJson(request): AppJson<GenerationRequest>,
) -> Result<Json<GenerationResult>, ServiceError> {
    let params = request.resolve(&state.config.defaults)?;
    let response = state.service.generate(params).await?;
    Ok(Json(response))
}

async fn generate_batch(
    State(state): State<AppState>,
    AppJson(items): AppJson<Vec<Value>>,
) -> Json<Vec<BatchItemResult>> {
    Json(state.batch.generate_json_batch(items).await)
}

async fn red_team_generate(
    State(state): State<AppState>,
    AppJson(request): AppJson<GenerationRequest>,
) -> Result<Json<GenerationResult>, ServiceError> {
    let params = red_team_params(request, &state.config.defaults)?;
    info!("generating red-team prompt");
    let response = state.service.generate(params).await?;
    Ok(Json(response))
}
