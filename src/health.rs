use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, model::BackendState};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
    pub model_name: String,
    pub quantization: String,
    pub model_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelEntry {
    pub name: String,
    pub quantization: String,
    pub loaded: bool,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsResponse {
    pub models: Vec<ModelEntry>,
}

/// Read-only view of the backend state plus static model configuration.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    model_name: String,
    quantization: String,
    model_dir: String,
    model_file: String,
    loaded: bool,
}

impl HealthReporter {
    pub fn new(config: &AppConfig, state: &BackendState) -> Self {
        Self {
            model_name: config.model_name.clone(),
            quantization: config.quantization.clone(),
            model_dir: config.model_dir.display().to_string(),
            model_file: config.model_file.display().to_string(),
            loaded: state.is_loaded(),
        }
    }

    pub fn health(&self) -> HealthResponse {
        let status = if self.loaded { "healthy" } else { "mock_mode" };
        HealthResponse {
            status: status.to_string(),
            model_loaded: self.loaded,
            model_name: self.model_name.clone(),
            quantization: self.quantization.clone(),
            model_path: self.model_file.clone(),
        }
    }

    pub fn models(&self) -> ModelsResponse {
        ModelsResponse {
            models: vec![ModelEntry {
                name: self.model_name.clone(),
                quantization: self.quantization.clone(),
                loaded: self.loaded,
                path: self.model_dir.clone(),
            }],
        }
    }
}
