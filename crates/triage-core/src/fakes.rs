//! In-memory fakes for the collaborator ports (testing only).
//!
//! `ScriptedReasoning` replays queued responses in order, `StaticRepository`
//! serves a fixed item set, and `StaticContext` serves fixed comment/review
//! maps. All of them count calls so tests can assert exact collaborator
//! traffic.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use crate::domain::{FetchedItem, ItemKind, RepoRef};
use crate::error::{Result, TriageError};
use crate::ports::{ContextFetcherPort, ReasoningPort, ReasoningRequest, RepositoryDataPort};

/// Reasoning port that replays queued responses in FIFO order.
///
/// An exhausted script surfaces as a `Transient` failure so a test that
/// under-provisions responses fails loudly instead of hanging.
#[derive(Debug, Default)]
pub struct ScriptedReasoning {
    json_responses: Mutex<VecDeque<Value>>,
    text_responses: Mutex<VecDeque<String>>,
    json_calls: AtomicUsize,
    text_calls: AtomicUsize,
}

impl ScriptedReasoning {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, response: Value) {
        self.json_responses.lock().unwrap().push_back(response);
    }

    pub fn push_text(&self, response: impl Into<String>) {
        self.text_responses.lock().unwrap().push_back(response.into());
    }

    /// Number of `complete_json` calls served so far.
    pub fn json_calls(&self) -> usize {
        self.json_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningPort for ScriptedReasoning {
    async fn complete_json(&self, _request: &ReasoningRequest) -> Result<Value> {
        self.json_calls.fetch_add(1, Ordering::SeqCst);
        self.json_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TriageError::Transient("scripted reasoning exhausted".to_string()))
    }

    async fn complete_text(&self, _request: &ReasoningRequest) -> Result<String> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.text_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| TriageError::Transient("scripted reasoning exhausted".to_string()))
    }
}

/// Repository data port serving a fixed item list.
#[derive(Debug, Default)]
pub struct StaticRepository {
    items: Vec<FetchedItem>,
    fetch_calls: AtomicUsize,
}

impl StaticRepository {
    pub fn new(items: Vec<FetchedItem>) -> Self {
        Self {
            items,
            fetch_calls: AtomicUsize::new(0),
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RepositoryDataPort for StaticRepository {
    async fn fetch_items(
        &self,
        _repo: &RepoRef,
        limit: usize,
        include_issues: bool,
        include_prs: bool,
    ) -> Result<Vec<FetchedItem>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .items
            .iter()
            .filter(|item| match item.kind {
                ItemKind::Issue => include_issues,
                ItemKind::PullRequest => include_prs,
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Context fetcher serving fixed comment/review maps.
#[derive(Debug, Default)]
pub struct StaticContext {
    pub comments: HashMap<u64, Vec<String>>,
    pub reviews: HashMap<u64, Vec<String>>,
    comment_calls: AtomicUsize,
    review_calls: AtomicUsize,
}

impl StaticContext {
    pub fn with_comments(comments: HashMap<u64, Vec<String>>) -> Self {
        Self {
            comments,
            ..Self::default()
        }
    }

    pub fn comment_calls(&self) -> usize {
        self.comment_calls.load(Ordering::SeqCst)
    }

    pub fn review_calls(&self) -> usize {
        self.review_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextFetcherPort for StaticContext {
    async fn fetch_comments(
        &self,
        _repo: &RepoRef,
        numbers: &[u64],
    ) -> Result<HashMap<u64, Vec<String>>> {
        self.comment_calls.fetch_add(1, Ordering::SeqCst);
        Ok(numbers
            .iter()
            .filter_map(|n| self.comments.get(n).map(|texts| (*n, texts.clone())))
            .collect())
    }

    async fn fetch_reviews(
        &self,
        _repo: &RepoRef,
        numbers: &[u64],
    ) -> Result<HashMap<u64, Vec<String>>> {
        self.review_calls.fetch_add(1, Ordering::SeqCst);
        Ok(numbers
            .iter()
            .filter_map(|n| self.reviews.get(n).map(|states| (*n, states.clone())))
            .collect())
    }
}

/// Build a minimal open issue for tests.
pub fn sample_item(number: u64, title: &str) -> FetchedItem {
    FetchedItem {
        number,
        kind: ItemKind::Issue,
        title: title.to_string(),
        body: format!("Body of item {number}"),
        labels: vec![],
        state: "open".to_string(),
        comments: 0,
        updated_at: Utc::now(),
        html_url: format!("https://github.com/acme/widgets/issues/{number}"),
    }
}

/// Build a minimal open pull request for tests.
pub fn sample_pr(number: u64, title: &str) -> FetchedItem {
    FetchedItem {
        kind: ItemKind::PullRequest,
        html_url: format!("https://github.com/acme/widgets/pull/{number}"),
        ..sample_item(number, title)
    }
}
