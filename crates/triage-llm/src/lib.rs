//! NVIDIA NIM reasoning collaborator for backlog triage.
//!
//! Implements the core's reasoning port against an OpenAI-compatible
//! chat-completions endpoint, hosted or self-served.

pub mod client;
pub mod config;

pub use client::NimClient;
pub use config::{NimConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
