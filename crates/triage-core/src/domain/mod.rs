//! Domain types threaded through the triage pipeline.
//!
//! Everything here is a plain serde-serializable record. Items are immutable
//! once fetched; clusters, priorities, plans, and patches are produced by the
//! stages and accumulate on the session state.

mod cluster;
mod item;
mod patch;
mod plan;
mod priority;
mod report;

pub use cluster::{Cluster, ContextDelta};
pub use item::{FetchedItem, ItemKind, RepoRef};
pub use patch::{CodePatch, PatchOutcome, MIN_PATCH_CONFIDENCE};
pub use plan::{FixPlan, MAX_PLAN_STEPS};
pub use priority::{priority_score, PriorityEntry};
pub use report::{ReportMetadata, TriageReport};
