//! NIM chat-completions client implementing the reasoning port.
//!
//! Speaks the OpenAI-compatible `/chat/completions` shape. Extended-thinking
//! budgets travel in the NIM-specific `min_thinking_tokens` /
//! `max_thinking_tokens` fields; JSON requests additionally set
//! `response_format`. Replies are parsed leniently; reasoning models wrap
//! JSON in fences or prose more often than not.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tracing::{debug, warn};

use triage_core::{ReasoningPort, ReasoningRequest, Result, TriageError};

use crate::config::NimConfig;

const TOP_P: f64 = 0.95;

/// NIM reasoning collaborator.
pub struct NimClient {
    config: NimConfig,
    http: reqwest::Client,
}

impl NimClient {
    pub fn new(config: NimConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TriageError::Configuration(format!("http client: {e}")))?;
        Ok(Self { config, http })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(NimConfig::from_env()?)
    }

    async fn complete(&self, request: &ReasoningRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let payload = build_payload(&self.config.model, request);
        debug!(model = %self.config.model, json = request.json_output, "reasoning request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| TriageError::Transient(format!("reasoning request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(classify_status(status, retry_after));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| TriageError::Transient(format!("reasoning response body: {e}")))?;
        message_content(&body)
    }
}

#[async_trait]
impl ReasoningPort for NimClient {
    async fn complete_json(&self, request: &ReasoningRequest) -> Result<Value> {
        let content = self.complete(request).await?;
        extract_json_object(&content).ok_or_else(|| {
            warn!("reasoning reply did not contain a JSON object");
            TriageError::MalformedResponse("reply did not contain a JSON object".to_string())
        })
    }

    async fn complete_text(&self, request: &ReasoningRequest) -> Result<String> {
        self.complete(request).await
    }
}

/// Assemble the chat-completions payload for one request.
fn build_payload(model: &str, request: &ReasoningRequest) -> Value {
    let mut payload = json!({
        "model": model,
        "messages": [
            { "role": "system", "content": request.system },
            { "role": "user", "content": request.user },
        ],
        "temperature": request.temperature,
        "top_p": TOP_P,
        "max_tokens": request.max_tokens,
        "stream": false,
    });
    if let Some(thinking) = &request.thinking {
        payload["min_thinking_tokens"] = json!(thinking.min_tokens);
        payload["max_thinking_tokens"] = json!(thinking.max_tokens);
    }
    if request.json_output {
        payload["response_format"] = json!({ "type": "json_object" });
    }
    payload
}

/// First choice's message content.
fn message_content(body: &Value) -> Result<String> {
    body["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            TriageError::MalformedResponse("completion has no message content".to_string())
        })
}

/// Pull a JSON object out of a reply that may carry fences, a thinking
/// preamble, or surrounding prose.
fn extract_json_object(content: &str) -> Option<Value> {
    // Reasoning models sometimes leak their scratchpad before the answer.
    let content = match content.rsplit_once("</think>") {
        Some((_, after)) => after,
        None => content,
    };
    let candidate = match content.split("```json").nth(1) {
        Some(fenced) => fenced.split("```").next().unwrap_or(fenced),
        None => content,
    };
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&candidate[start..=end])
        .ok()
        .filter(Value::is_object)
}

fn classify_status(status: StatusCode, retry_after_secs: Option<u64>) -> TriageError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TriageError::Configuration("reasoning service rejected the credentials".to_string())
        }
        StatusCode::NOT_FOUND => TriageError::NotFound("reasoning model or endpoint".to_string()),
        StatusCode::TOO_MANY_REQUESTS => TriageError::RateLimited { retry_after_secs },
        other => TriageError::Transient(format!("reasoning service returned {other}")),
    }
}
