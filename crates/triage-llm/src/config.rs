//! NIM endpoint configuration.

use triage_core::{Result, TriageError};

/// Hosted NIM API root.
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";

/// Default reasoning model.
pub const DEFAULT_MODEL: &str = "nvidia/nvidia-nemotron-nano-9b-v2";

/// Configuration for the NIM reasoning collaborator.
#[derive(Debug, Clone)]
pub struct NimConfig {
    /// OpenAI-compatible API root; overridable for self-hosted NIMs.
    pub base_url: String,
    pub model: String,
    pub api_key: String,
}

impl NimConfig {
    /// Build from the environment. `NVIDIA_API_KEY` is required;
    /// `NIM_BASE_URL` and `NIM_MODEL` override the hosted defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("NVIDIA_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                TriageError::Configuration("NVIDIA_API_KEY is not set".to_string())
            })?;
        Ok(Self {
            base_url: std::env::var("NIM_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: std::env::var("NIM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            api_key,
        })
    }

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
