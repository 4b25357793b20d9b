//! Final triage report delivered for a completed session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cluster, CodePatch, FixPlan, PriorityEntry};

/// Processing metadata attached to a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub items_fetched: usize,
    pub cluster_count: usize,
    pub elapsed_ms: u64,
    /// (stage name, elapsed ms at completion) in pipeline order.
    #[serde(default)]
    pub stage_timings: Vec<(String, u64)>,
}

/// Everything a completed triage session produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageReport {
    pub repo: String,
    pub generated_at: DateTime<Utc>,
    pub clusters: Vec<Cluster>,
    /// Top-3 prioritized items (fewer only when fewer items exist).
    pub top_issues: Vec<PriorityEntry>,
    pub plans: Vec<FixPlan>,
    /// On-demand patches collected so far (sparse).
    pub patches: Vec<CodePatch>,
    pub report_markdown: String,
    pub metadata: ReportMetadata,
}
