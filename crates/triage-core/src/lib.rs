//! Triage Core Library
//!
//! LLM-driven backlog triage pipeline: fetch a repository's open items,
//! cluster them, propose labels, prioritize, plan fixes, and render a
//! report, with on-demand patch generation afterwards. Collaborators are
//! abstracted behind async ports; this crate contains no network code.

pub mod cache;
pub mod domain;
pub mod error;
pub mod fakes;
pub mod orchestrator;
pub mod ports;
pub mod refine;
pub mod session;
pub mod stages;
pub mod telemetry;

pub use cache::{ContextCache, DEFAULT_CACHE_TTL};

pub use domain::{
    priority_score, Cluster, CodePatch, ContextDelta, FetchedItem, FixPlan, ItemKind,
    PatchOutcome, PriorityEntry, RepoRef, ReportMetadata, TriageReport, MIN_PATCH_CONFIDENCE,
};

pub use error::{Result, TriageError};

pub use orchestrator::{
    Orchestrator, OrchestratorConfig, Ports, TriageRequest, DEFAULT_MAX_ITEMS,
    DEFAULT_MAX_SESSIONS,
};

pub use ports::{
    ContextFetcherPort, ReasoningPort, ReasoningRequest, RepositoryDataPort, ThinkingBudget,
};

pub use session::{PipelineStage, ProgressSnapshot, SessionId, SessionState, StageTiming};
