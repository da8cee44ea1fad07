use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::{task, time};
use tracing::{debug, info, warn};

use crate::{
    config::AppConfig,
    error::ServiceError,
    fallback::{FallbackGenerator, count_words},
    model::{BackendHandle, BackendState, GenerationParams, GenerationResult},
};

/// Token estimate per word when the engine does not report a count.
pub const TOKENS_PER_WORD_ESTIMATE: usize = 2;

const PROMPT_PREVIEW_CHARS: usize = 100;

/// Anything that turns validated parameters into a generation result.
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(&self, params: GenerationParams) -> Result<GenerationResult, ServiceError>;
}

pub struct GenerationService {
    state: BackendState,
    fallback: FallbackGenerator,
    model_identifier: String,
    timeout: Option<Duration>,
}

impl GenerationService {
    pub fn new(
        state: BackendState,
        fallback: FallbackGenerator,
        model_identifier: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            state,
            fallback,
            model_identifier: model_identifier.into(),
            timeout,
        }
    }

    pub fn from_config(config: &AppConfig, state: BackendState) -> Self {
        Self::new(
            state,
            FallbackGenerator::new(config.fallback_padding),
            config.model_identifier(),
            config.generation_timeout,
        )
    }

    pub fn backend_state(&self) -> &BackendState {
        &self.state
    }

    async fn invoke_backend(
        &self,
        handle: BackendHandle,
        params: GenerationParams,
    ) -> Result<(String, usize), ServiceError> {
        let GenerationParams { prompt, sampling } = params;
        info!(prompt = %preview(&prompt), max_tokens = sampling.max_tokens, "generating");

        let inference = task::spawn_blocking(move || {
            handle.complete(&prompt, &sampling).map(|output| {
                let text = output.text().trim().to_string();
                let tokens = output
                    .token_count()
                    .unwrap_or_else(|| count_words(&text) * TOKENS_PER_WORD_ESTIMATE);
                (text, tokens)
            })
        });

        let joined = match self.timeout {
            Some(limit) => time::timeout(limit, inference)
                .await
                .map_err(|_| ServiceError::Timeout(limit))?,
            None => inference.await,
        };

        joined
            .map_err(|err| ServiceError::Inference(format!("inference task failed: {err}")))?
            .map_err(|err| ServiceError::Inference(err.to_string()))
    }
}

#[async_trait]
impl Generate for GenerationService {
    async fn generate(&self, params: GenerationParams) -> Result<GenerationResult, ServiceError> {
        let start = Instant::now();

        let (text, tokens_used) = match &self.state {
            BackendState::Loaded(handle) => {
                self.invoke_backend(handle.clone(), params).await.inspect_err(|err| {
                    warn!(error = %err, "generation failed");
                })?
            }
            BackendState::Unloaded => {
                debug!(prompt = %preview(&params.prompt), "model not loaded, using fallback template");
                let text = self
                    .fallback
                    .generate(&params.prompt, params.sampling.max_tokens);
                let tokens = count_words(&text);
                (text, tokens)
            }
        };

        let generation_time_ms = start.elapsed().as_secs_f64() * 1000.0;
        info!(tokens_used, generation_time_ms, "generation complete");

        Ok(GenerationResult {
            text,
            tokens_used,
            generation_time_ms,
            model: self.model_identifier.clone(),
        })
    }
}

fn preview(prompt: &str) -> &str {
    match prompt.char_indices().nth(PROMPT_PREVIEW_CHARS) {
        Some((idx, _)) => &prompt[..idx],
        None => prompt,
    }
}
