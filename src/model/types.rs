use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Inbound body of `/generate`, `/generate/batch` and `/red-team/generate`.
/// Every field except `prompt` falls back to the endpoint's defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, alias = "max_new_tokens")]
    pub max_tokens: Option<usize>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub repeat_penalty: Option<f64>,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            repeat_penalty: None,
            stop: None,
        }
    }

    /// Fills unset fields from `defaults` and validates the result.
    pub fn resolve(self, defaults: &GenerationDefaults) -> Result<GenerationParams, ServiceError> {
        if self.prompt.trim().is_empty() {
            return Err(ServiceError::BadRequest("prompt must not be empty".into()));
        }

        let sampling = SamplingParams {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            repeat_penalty: self.repeat_penalty.unwrap_or(defaults.repeat_penalty),
            stop: self.stop.unwrap_or_else(|| defaults.stop.clone()),
        };
        sampling.validate(defaults.max_tokens_limit)?;

        Ok(GenerationParams {
            prompt: self.prompt,
            sampling,
        })
    }
}

/// Per-endpoint defaults for unset request fields.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationDefaults {
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repeat_penalty: f64,
    pub stop: Vec<String>,
    pub max_tokens_limit: usize,
}

impl GenerationDefaults {
    /// Defaults for single requests.
    pub fn standard() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            repeat_penalty: 1.1,
            stop: default_stop_sequences(),
            max_tokens_limit: 4096,
        }
    }

    /// Defaults for batch items.
    pub fn batch() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.8,
            ..Self::standard()
        }
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            repeat_penalty: self.repeat_penalty,
            stop: self.stop.clone(),
        }
    }
}

fn default_stop_sequences() -> Vec<String> {
    ["\n\n", "###", "Human:"].map(String::from).to_vec()
}

/// Engine-facing generation parameters, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: usize,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: usize,
    pub repeat_penalty: f64,
    pub stop: Vec<String>,
}

impl SamplingParams {
    pub fn validate(&self, max_tokens_limit: usize) -> Result<(), ServiceError> {
        if self.max_tokens > max_tokens_limit {
            return Err(ServiceError::BadRequest(format!(
                "max_tokens must be at most {max_tokens_limit}"
            )));
        }
        if !self.temperature.is_finite() || !(0.0..=2.0).contains(&self.temperature) {
            return Err(ServiceError::BadRequest(
                "temperature must be between 0 and 2".into(),
            ));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return Err(ServiceError::BadRequest(
                "top_p must be in the range (0, 1]".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(ServiceError::BadRequest("top_k must be at least 1".into()));
        }
        if !self.repeat_penalty.is_finite() || self.repeat_penalty <= 0.0 {
            return Err(ServiceError::BadRequest(
                "repeat_penalty must be a positive number".into(),
            ));
        }
        if self.stop.iter().any(|s| s.is_empty()) {
            return Err(ServiceError::BadRequest(
                "stop sequences must not be empty strings".into(),
            ));
        }
        Ok(())
    }
}

/// A validated request, consumed once by the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub sampling: SamplingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub tokens_used: usize,
    pub generation_time_ms: f64,
    pub model: String,
}

/// Stands in for a failed batch item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPlaceholder {
    pub text: String,
    pub tokens_used: usize,
}

impl ErrorPlaceholder {
    pub fn new(err: &ServiceError) -> Self {
        Self {
            text: format!("Error: {err}"),
            tokens_used: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BatchItemResult {
    Generated(GenerationResult),
    Failed(ErrorPlaceholder),
}

impl BatchItemResult {
    pub fn is_error(&self) -> bool {
        matches!(self, BatchItemResult::Failed(_))
    }

    pub fn text(&self) -> &str {
        match self {
            BatchItemResult::Generated(result) => &result.text,
            BatchItemResult::Failed(placeholder) => &placeholder.text,
        }
    }

    pub fn tokens_used(&self) -> usize {
        match self {
            BatchItemResult::Generated(result) => result.tokens_used,
            BatchItemResult::Failed(placeholder) => placeholder.tokens_used,
        }
    }
}
