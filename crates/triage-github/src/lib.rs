//! GitHub collaborator for backlog triage.
//!
//! Implements the core's repository-data and context-fetcher ports against
//! the GitHub REST API, with TTL caching of per-item context reads.

pub mod client;
pub mod config;

pub use client::GithubClient;
pub use config::{GithubConfig, DEFAULT_API_URL};
