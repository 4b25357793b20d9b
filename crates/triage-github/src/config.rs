//! GitHub client configuration.

use triage_core::{Result, TriageError};

/// Default REST API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Configuration for the GitHub collaborator.
#[derive(Debug, Clone)]
pub struct GithubConfig {
    /// API root; overridable for GitHub Enterprise or tests.
    pub api_url: String,
    /// Personal access token. Unauthenticated access works but gets a far
    /// lower rate limit.
    pub token: Option<String>,
}

impl GithubConfig {
    /// Build from `GITHUB_TOKEN` and `GITHUB_API_URL`.
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("GITHUB_API_URL")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }

    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Reject obviously unusable settings before any session starts.
    pub fn validate(&self) -> Result<()> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(TriageError::Configuration(format!(
                "GITHUB_API_URL must be an http(s) URL, got {:?}",
                self.api_url
            )));
        }
        Ok(())
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}
