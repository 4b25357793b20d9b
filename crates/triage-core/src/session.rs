//! Per-session state and progress reporting.
//!
//! One `SessionState` exists per triage run. It is mutated only by the
//! orchestrator task driving that session; observers see it through
//! [`ProgressSnapshot`]s and, once complete, the final [`TriageReport`].
//! Nothing here is persisted; re-running a repository creates a fresh
//! session.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    Cluster, CodePatch, FetchedItem, FixPlan, PriorityEntry, RepoRef, ReportMetadata, TriageReport,
};
use crate::error::TriageError;

/// Unique identifier for one triage session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        SessionId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline states, strictly sequential per session.
///
/// `Failed` is reachable from any state. On-demand patch generation is not a
/// pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetching,
    Clustering,
    Labeling,
    Prioritizing,
    Planning,
    Editing,
    Done,
    Failed,
}

impl PipelineStage {
    pub fn name(self) -> &'static str {
        match self {
            PipelineStage::Fetching => "fetching",
            PipelineStage::Clustering => "clustering",
            PipelineStage::Labeling => "labeling",
            PipelineStage::Prioritizing => "prioritizing",
            PipelineStage::Planning => "planning",
            PipelineStage::Editing => "editing",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Done | PipelineStage::Failed)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Elapsed time at which a stage finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: PipelineStage,
    pub elapsed_ms: u64,
}

/// What the progress query returns.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub session_id: String,
    pub repo: String,
    pub stage: PipelineStage,
    pub elapsed_ms: u64,
    pub completed: Vec<StageTiming>,
    pub error: Option<String>,
}

/// Mutable record threaded through the pipeline stages.
#[derive(Debug)]
pub struct SessionState {
    pub id: SessionId,
    pub repo: RepoRef,
    pub started_at: DateTime<Utc>,
    started: Instant,
    pub stage: PipelineStage,
    pub items: Vec<FetchedItem>,
    pub clusters: Vec<Cluster>,
    pub priorities: Vec<PriorityEntry>,
    pub plans: Vec<FixPlan>,
    pub patches: Vec<CodePatch>,
    pub timings: Vec<StageTiming>,
    pub error: Option<TriageError>,
    pub report: Option<TriageReport>,
}

impl SessionState {
    pub fn new(id: SessionId, repo: RepoRef) -> Self {
        Self {
            id,
            repo,
            started_at: Utc::now(),
            started: Instant::now(),
            stage: PipelineStage::Fetching,
            items: vec![],
            clusters: vec![],
            priorities: vec![],
            plans: vec![],
            patches: vec![],
            timings: vec![],
            error: None,
            report: None,
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Record completion of the current stage and enter the next one.
    pub fn advance(&mut self, next: PipelineStage) {
        self.timings.push(StageTiming {
            stage: self.stage,
            elapsed_ms: self.elapsed_ms(),
        });
        self.stage = next;
    }

    /// Move to `Failed`, keeping the causing error.
    pub fn fail(&mut self, error: TriageError) {
        self.timings.push(StageTiming {
            stage: self.stage,
            elapsed_ms: self.elapsed_ms(),
        });
        self.stage = PipelineStage::Failed;
        self.error = Some(error);
    }

    /// Assemble the final report and move to `Done`.
    pub fn finish(&mut self, report_markdown: String) {
        self.advance(PipelineStage::Done);
        let metadata = ReportMetadata {
            items_fetched: self.items.len(),
            cluster_count: self.clusters.len(),
            elapsed_ms: self.elapsed_ms(),
            stage_timings: self
                .timings
                .iter()
                .map(|timing| (timing.stage.name().to_string(), timing.elapsed_ms))
                .collect(),
        };
        self.report = Some(TriageReport {
            repo: self.repo.to_string(),
            generated_at: Utc::now(),
            clusters: self.clusters.clone(),
            top_issues: self.priorities.clone(),
            plans: self.plans.clone(),
            patches: self.patches.clone(),
            report_markdown,
            metadata,
        });
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            session_id: self.id.to_string(),
            repo: self.repo.to_string(),
            stage: self.stage,
            elapsed_ms: self.elapsed_ms(),
            completed: self.timings.clone(),
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(SessionId::new(), RepoRef::parse("acme/widgets").unwrap())
    }

    #[test]
    fn test_advance_records_timings_in_order() {
        let mut state = state();
        state.advance(PipelineStage::Clustering);
        state.advance(PipelineStage::Labeling);
        let stages: Vec<PipelineStage> = state.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stages, vec![PipelineStage::Fetching, PipelineStage::Clustering]);
        assert_eq!(state.stage, PipelineStage::Labeling);
    }

    #[test]
    fn test_fail_is_terminal_and_keeps_error() {
        let mut state = state();
        state.fail(TriageError::NotFound("acme/widgets".to_string()));
        assert_eq!(state.stage, PipelineStage::Failed);
        assert!(state.stage.is_terminal());
        let snapshot = state.snapshot();
        assert!(snapshot.error.unwrap().contains("acme/widgets"));
    }

    #[test]
    fn test_finish_builds_report() {
        let mut state = state();
        state.advance(PipelineStage::Clustering);
        state.finish("# Report".to_string());
        assert_eq!(state.stage, PipelineStage::Done);
        let report = state.report.as_ref().unwrap();
        assert_eq!(report.repo, "acme/widgets");
        assert_eq!(report.report_markdown, "# Report");
        assert_eq!(report.metadata.stage_timings.len(), 2);
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(PipelineStage::Fetching.name(), "fetching");
        assert_eq!(PipelineStage::Done.to_string(), "done");
    }
}
