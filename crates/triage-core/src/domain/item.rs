//! Fetched backlog items and repository references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TriageError};

/// Kind of a fetched backlog item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Issue,
    PullRequest,
}

impl ItemKind {
    pub fn is_pull_request(self) -> bool {
        matches!(self, ItemKind::PullRequest)
    }
}

/// One issue or pull request as returned by the Repository Data Port.
///
/// Immutable once fetched; owned by the session that fetched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedItem {
    /// Issue/PR number, unique within a repository.
    pub number: u64,
    pub kind: ItemKind,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Labels already applied in the repository.
    #[serde(default)]
    pub labels: Vec<String>,
    /// "open" or "closed".
    pub state: String,
    /// Number of comments on the item.
    #[serde(default)]
    pub comments: u32,
    pub updated_at: DateTime<Utc>,
    pub html_url: String,
}

/// An `owner/name` repository reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Parse `"owner/name"`. Anything else is an `InvalidRequest`.
    pub fn parse(repo: &str) -> Result<Self> {
        match repo.split('/').collect::<Vec<_>>().as_slice() {
            [owner, name] if !owner.is_empty() && !name.is_empty() => Ok(RepoRef {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(TriageError::InvalidRequest(format!(
                "invalid repo format: {repo} (expected owner/name)"
            ))),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}
