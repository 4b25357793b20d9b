//! Error taxonomy for the triage pipeline.
//!
//! Collaborator failures are classified once, at the port boundary, and the
//! orchestration core only branches on the kind:
//! - `NotFound` / `RateLimited` are terminal and surfaced to the caller as-is
//! - `Transient` is retried (if at all) inside the ports, never by the core
//! - `MalformedResponse` triggers the code-generation fallback path; other
//!   stages surface it like a transient failure
//! - `Configuration` fails session start before the pipeline runs

use thiserror::Error;

/// Errors produced by the triage pipeline and its collaborator ports.
#[derive(Debug, Error)]
pub enum TriageError {
    /// Repository, item, or model absent. Terminal, never retried.
    #[error("not found: {0}")]
    NotFound(String),

    /// Collaborator quota exceeded, or the session limit of this process.
    #[error("rate limited (retry after {retry_after_secs:?} seconds)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Network failure or collaborator 5xx.
    #[error("transient collaborator failure: {0}")]
    Transient(String),

    /// Reasoning service returned output that does not parse as the
    /// expected shape.
    #[error("malformed reasoning response: {0}")]
    MalformedResponse(String),

    /// Missing or invalid credentials/settings. Fails before any session
    /// enters the pipeline.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Caller input rejected by validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No session registered under the given identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Session aborted at a suspension point after cancellation.
    #[error("session cancelled")]
    Cancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TriageError {
    /// Best-effort duplicate, for failures that are both stored on a session
    /// and surfaced to a caller. Only `Serialization` loses its source (it
    /// becomes a `MalformedResponse` carrying the message).
    pub fn replicate(&self) -> TriageError {
        match self {
            TriageError::NotFound(what) => TriageError::NotFound(what.clone()),
            TriageError::RateLimited { retry_after_secs } => TriageError::RateLimited {
                retry_after_secs: *retry_after_secs,
            },
            TriageError::Transient(message) => TriageError::Transient(message.clone()),
            TriageError::MalformedResponse(message) => {
                TriageError::MalformedResponse(message.clone())
            }
            TriageError::Configuration(message) => TriageError::Configuration(message.clone()),
            TriageError::InvalidRequest(message) => TriageError::InvalidRequest(message.clone()),
            TriageError::SessionNotFound(id) => TriageError::SessionNotFound(id.clone()),
            TriageError::Cancelled => TriageError::Cancelled,
            TriageError::Serialization(source) => {
                TriageError::MalformedResponse(source.to_string())
            }
        }
    }
}

/// Result type for triage operations.
pub type Result<T> = std::result::Result<T, TriageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TriageError::NotFound("acme/widgets".to_string());
        assert!(err.to_string().contains("acme/widgets"));

        let err = TriageError::RateLimited {
            retry_after_secs: Some(42),
        };
        assert!(err.to_string().contains("42"));

        let err = TriageError::MalformedResponse("missing clusters array".to_string());
        assert!(err.to_string().contains("malformed reasoning response"));
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("not json");
        let err: TriageError = parse.unwrap_err().into();
        assert!(matches!(err, TriageError::Serialization(_)));
    }
}
