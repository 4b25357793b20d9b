//! Collaborator port definitions.
//!
//! The orchestration core consumes three narrow capabilities:
//! - `ReasoningPort`: structured prompt in, structured result out
//! - `RepositoryDataPort`: normalized backlog items for a repository
//! - `ContextFetcherPort`: extra per-item context (comments, review states)
//!
//! All traits are async and backend-agnostic; the core treats them as
//! fallible, latency-unbounded operations. Timeout and transient-retry policy
//! live behind these traits, never in the core. Scripted fakes are provided
//! for testing via the `fakes` module.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::{FetchedItem, RepoRef};
use crate::error::Result;

/// Extended-reasoning token budget, passed through to the service untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingBudget {
    pub min_tokens: u32,
    pub max_tokens: u32,
}

impl Default for ThinkingBudget {
    fn default() -> Self {
        Self {
            min_tokens: 1024,
            max_tokens: 2048,
        }
    }
}

/// One structured request to the reasoning service.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    /// Role/system instruction.
    pub system: String,
    /// Task content.
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// When set, the service runs with an extended-reasoning budget.
    pub thinking: Option<ThinkingBudget>,
    /// Request constrained JSON output from the service.
    pub json_output: bool,
}

impl ReasoningRequest {
    /// A request expecting a JSON object back.
    pub fn json(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.7,
            max_tokens: 4096,
            thinking: Some(ThinkingBudget::default()),
            json_output: true,
        }
    }

    /// A request expecting free text back.
    pub fn text(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            json_output: false,
            ..Self::json(system, user)
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Abstract reasoning capability.
#[async_trait]
pub trait ReasoningPort: Send + Sync {
    /// Submit a request and parse the reply as a JSON object.
    async fn complete_json(&self, request: &ReasoningRequest) -> Result<serde_json::Value>;

    /// Submit a request and return the raw reply text.
    async fn complete_text(&self, request: &ReasoningRequest) -> Result<String>;
}

/// Abstract backlog fetching capability.
#[async_trait]
pub trait RepositoryDataPort: Send + Sync {
    /// Fetch up to `limit` normalized open items for `repo`.
    async fn fetch_items(
        &self,
        repo: &RepoRef,
        limit: usize,
        include_issues: bool,
        include_prs: bool,
    ) -> Result<Vec<FetchedItem>>;
}

/// Abstract on-demand context capability, cache-backed in real
/// implementations.
#[async_trait]
pub trait ContextFetcherPort: Send + Sync {
    /// Comment bodies per item number.
    async fn fetch_comments(
        &self,
        repo: &RepoRef,
        numbers: &[u64],
    ) -> Result<HashMap<u64, Vec<String>>>;

    /// Review states per pull-request number.
    async fn fetch_reviews(
        &self,
        repo: &RepoRef,
        numbers: &[u64],
    ) -> Result<HashMap<u64, Vec<String>>>;
}
