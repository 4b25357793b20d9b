//! GitHub REST client implementing the backlog and context ports.
//!
//! All reads go through the shared [`ContextCache`] where repetition is
//! likely (comments, reviews); the backlog listing itself is always fetched
//! fresh since it starts a new session. Every HTTP status is classified once
//! here; the orchestration core never sees a status code.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER, USER_AGENT};
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use triage_core::{
    ContextCache, ContextFetcherPort, FetchedItem, ItemKind, RepoRef, RepositoryDataPort, Result,
    TriageError,
};

use crate::config::GithubConfig;

/// Comments fetched per item.
const MAX_COMMENTS_PER_ITEM: usize = 3;

/// Comment bodies are truncated to this many characters.
const MAX_COMMENT_CHARS: usize = 200;

/// Page size for backlog listing requests.
const PAGE_SIZE: usize = 100;

/// GitHub collaborator serving both the backlog port and the context port.
pub struct GithubClient {
    config: GithubConfig,
    http: reqwest::Client,
    cache: Arc<ContextCache>,
}

impl GithubClient {
    pub fn new(config: GithubConfig, cache: Arc<ContextCache>) -> Result<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TriageError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            config,
            http,
            cache,
        })
    }

    pub fn from_env(cache: Arc<ContextCache>) -> Result<Self> {
        Self::new(GithubConfig::from_env(), cache)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("backlog-triage/0.2"));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        if let Some(token) = &self.config.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        debug!(url, "github request");
        let response = self
            .http
            .get(url)
            .headers(self.headers())
            .send()
            .await
            .map_err(|e| TriageError::Transient(format!("github request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, retry_after_secs(&response)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|e| TriageError::Transient(format!("github response body: {e}")))
    }

    /// Cached variant for per-item context reads, keyed by the full URL.
    async fn get_json_cached(&self, url: &str) -> Result<Value> {
        if let Some(hit) = self.cache.get(url) {
            debug!(url, "context cache hit");
            return Ok(hit);
        }
        let value = self.get_json(url).await?;
        self.cache.put(url, value.clone());
        Ok(value)
    }
}

#[async_trait]
impl RepositoryDataPort for GithubClient {
    async fn fetch_items(
        &self,
        repo: &RepoRef,
        limit: usize,
        include_issues: bool,
        include_prs: bool,
    ) -> Result<Vec<FetchedItem>> {
        let mut items = Vec::new();
        let per_page = limit.min(PAGE_SIZE);
        let mut page = 1usize;

        // The issues listing endpoint returns pull requests too; they carry
        // a `pull_request` key.
        while items.len() < limit {
            let url = format!(
                "{}/repos/{}/issues?state=open&sort=updated&direction=desc&per_page={}&page={}",
                self.config.api_url, repo, per_page, page
            );
            let payload = self.get_json(&url).await?;
            let Some(entries) = payload.as_array() else {
                return Err(TriageError::Transient(
                    "issues listing was not an array".to_string(),
                ));
            };

            for entry in entries {
                let Some(item) = parse_item(entry) else {
                    warn!("skipping unparseable backlog entry");
                    continue;
                };
                let wanted = match item.kind {
                    ItemKind::Issue => include_issues,
                    ItemKind::PullRequest => include_prs,
                };
                if wanted && items.len() < limit {
                    items.push(item);
                }
            }

            if entries.len() < per_page {
                break;
            }
            page += 1;
        }

        debug!(repo = %repo, count = items.len(), "backlog fetched");
        Ok(items)
    }
}

#[async_trait]
impl ContextFetcherPort for GithubClient {
    async fn fetch_comments(
        &self,
        repo: &RepoRef,
        numbers: &[u64],
    ) -> Result<HashMap<u64, Vec<String>>> {
        let mut comments = HashMap::new();
        for &number in numbers {
            let url = format!(
                "{}/repos/{}/issues/{}/comments?per_page={}",
                self.config.api_url, repo, number, MAX_COMMENTS_PER_ITEM
            );
            let payload = self.get_json_cached(&url).await?;
            let bodies = comment_bodies(&payload);
            if !bodies.is_empty() {
                comments.insert(number, bodies);
            }
        }
        Ok(comments)
    }

    async fn fetch_reviews(
        &self,
        repo: &RepoRef,
        numbers: &[u64],
    ) -> Result<HashMap<u64, Vec<String>>> {
        let mut reviews = HashMap::new();
        for &number in numbers {
            let url = format!(
                "{}/repos/{}/pulls/{}/reviews",
                self.config.api_url, repo, number
            );
            let payload = self.get_json_cached(&url).await?;
            let states = review_states(&payload);
            if !states.is_empty() {
                reviews.insert(number, states);
            }
        }
        Ok(reviews)
    }
}

/// Map one normalized item out of a listing entry. `None` drops the entry.
fn parse_item(entry: &Value) -> Option<FetchedItem> {
    let number = entry["number"].as_u64()?;
    let title = entry["title"].as_str()?.to_string();
    let kind = if entry.get("pull_request").is_some() {
        ItemKind::PullRequest
    } else {
        ItemKind::Issue
    };
    let labels = entry["labels"]
        .as_array()
        .map(|labels| {
            labels
                .iter()
                .filter_map(|label| label["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    let updated_at = entry["updated_at"]
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Some(FetchedItem {
        number,
        kind,
        title,
        body: entry["body"].as_str().unwrap_or_default().to_string(),
        labels,
        state: entry["state"].as_str().unwrap_or("open").to_string(),
        comments: entry["comments"].as_u64().unwrap_or(0) as u32,
        updated_at,
        html_url: entry["html_url"].as_str().unwrap_or_default().to_string(),
    })
}

/// First few comment bodies, truncated so prompts stay bounded.
fn comment_bodies(payload: &Value) -> Vec<String> {
    payload
        .as_array()
        .map(|comments| {
            comments
                .iter()
                .filter_map(|comment| comment["body"].as_str())
                .filter(|body| !body.trim().is_empty())
                .take(MAX_COMMENTS_PER_ITEM)
                .map(|body| truncate_chars(body.trim(), MAX_COMMENT_CHARS))
                .collect()
        })
        .unwrap_or_default()
}

fn review_states(payload: &Value) -> Vec<String> {
    payload
        .as_array()
        .map(|reviews| {
            reviews
                .iter()
                .filter_map(|review| review["state"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Char-boundary-safe truncation.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

/// Classify a non-success GitHub status into the triage error taxonomy.
fn classify_status(status: StatusCode, retry_after_secs: Option<u64>) -> TriageError {
    match status {
        StatusCode::NOT_FOUND => TriageError::NotFound("repository or item".to_string()),
        StatusCode::UNAUTHORIZED => {
            TriageError::Configuration("github rejected the credentials".to_string())
        }
        StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
            TriageError::RateLimited { retry_after_secs }
        }
        other => TriageError::Transient(format!("github returned {other}")),
    }
}

fn retry_after_secs(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn issue_fixture() -> Value {
        json!({
            "number": 42,
            "title": "Login fails with expired token",
            "body": "Steps:\n1. log in\n2. wait an hour",
            "state": "open",
            "comments": 5,
            "updated_at": "2026-08-01T12:30:00Z",
            "html_url": "https://github.com/acme/widgets/issues/42",
            "labels": [
                { "name": "type:bug", "color": "d73a4a" },
                { "name": "component:auth" },
            ],
        })
    }

    #[test]
    fn test_parse_issue() {
        let item = parse_item(&issue_fixture()).unwrap();
        assert_eq!(item.number, 42);
        assert_eq!(item.kind, ItemKind::Issue);
        assert_eq!(item.labels, vec!["type:bug", "component:auth"]);
        assert_eq!(item.comments, 5);
        assert_eq!(item.updated_at.to_rfc3339(), "2026-08-01T12:30:00+00:00");
    }

    #[test]
    fn test_parse_pull_request_and_null_body() {
        let mut fixture = issue_fixture();
        fixture["pull_request"] = json!({ "url": "https://api.github.com/..." });
        fixture["body"] = Value::Null;
        let item = parse_item(&fixture).unwrap();
        assert_eq!(item.kind, ItemKind::PullRequest);
        assert!(item.body.is_empty());
    }

    #[test]
    fn test_parse_drops_entry_without_number() {
        let mut fixture = issue_fixture();
        fixture.as_object_mut().unwrap().remove("number");
        assert!(parse_item(&fixture).is_none());
    }

    #[test]
    fn test_comment_bodies_are_capped_and_truncated() {
        let long = "x".repeat(500);
        let payload = json!([
            { "body": long },
            { "body": "   " },
            { "body": "short" },
            { "body": "second short" },
            { "body": "dropped, past the cap" },
        ]);
        let bodies = comment_bodies(&payload);
        assert_eq!(bodies.len(), MAX_COMMENTS_PER_ITEM);
        assert_eq!(bodies[0].chars().count(), MAX_COMMENT_CHARS);
        assert_eq!(bodies[1], "short");
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 200), "short");
    }

    #[test]
    fn test_review_states() {
        let payload = json!([
            { "state": "APPROVED", "user": { "login": "alice" } },
            { "state": "CHANGES_REQUESTED" },
        ]);
        assert_eq!(review_states(&payload), vec!["APPROVED", "CHANGES_REQUESTED"]);
    }

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None),
            TriageError::NotFound(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None),
            TriageError::Configuration(_)
        ));
        match classify_status(StatusCode::FORBIDDEN, Some(30)) {
            TriageError::RateLimited { retry_after_secs } => {
                assert_eq!(retry_after_secs, Some(30));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None),
            TriageError::Transient(_)
        ));
    }
}
