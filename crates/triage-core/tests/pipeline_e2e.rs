//! End-to-end pipeline tests against scripted collaborator fakes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Semaphore;
use triage_core::fakes::{sample_item, sample_pr, ScriptedReasoning, StaticContext, StaticRepository};
use triage_core::{
    FetchedItem, Orchestrator, OrchestratorConfig, PipelineStage, Ports, ReasoningPort,
    ReasoningRequest, RepoRef, TriageError, TriageRequest,
};

fn backlog() -> Vec<FetchedItem> {
    let mut items: Vec<FetchedItem> = (1..=10)
        .map(|n| sample_item(n, &format!("item {n}")))
        .collect();
    items.push(sample_pr(11, "item 11"));
    items.push(sample_pr(12, "item 12"));
    items
}

fn request() -> TriageRequest {
    TriageRequest::new(RepoRef::parse("acme/widgets").unwrap())
}

fn clustering_reply(uncertainties: [f64; 4], needs_context: Vec<u64>) -> Value {
    json!({
        "clusters": [
            { "id": "cluster_1", "title": "Auth failures", "summary": "Login breaks",
              "members": [1, 2, 3], "uncertainty": uncertainties[0] },
            { "id": "cluster_2", "title": "Flaky CI", "summary": "Intermittent reds",
              "members": [4, 5, 6], "uncertainty": uncertainties[1] },
            { "id": "cluster_3", "title": "Docs", "summary": "Stale guides",
              "members": [7, 8], "uncertainty": uncertainties[2] },
            { "id": "cluster_4", "title": "Performance", "summary": "Hot-path regressions",
              "members": [9, 10, 11, 12], "uncertainty": uncertainties[3] },
        ],
        "needs_context": needs_context,
    })
}

/// Script one complete happy-path run: clustering needs one refinement
/// round, every later stage converges in a single call.
fn script_full_run(reasoning: &ScriptedReasoning) {
    reasoning.push_json(clustering_reply([0.1, 0.5, 0.2, 0.6], vec![5, 11]));
    reasoning.push_json(clustering_reply([0.1, 0.3, 0.2, 0.3], vec![]));
    reasoning.push_json(json!({
        "labels_by_cluster": [
            { "cluster_id": "cluster_1", "labels": ["type:bug", "component:auth"], "uncertainty": 0.2 },
            { "cluster_id": "cluster_2", "labels": ["type:ci"], "uncertainty": 0.3 },
            { "cluster_id": "cluster_3", "labels": ["type:docs"], "uncertainty": 0.1 },
            { "cluster_id": "cluster_4", "labels": ["type:perf"], "uncertainty": 0.3 },
        ],
        "needs_context": [],
    }));
    reasoning.push_json(json!({
        "top": [
            { "number": 2, "title": "item 2", "severity": 5, "impact": 5, "effort": 5,
              "justification": "login fully broken" },
            { "number": 5, "title": "item 5", "severity": 4, "impact": 5, "effort": 2,
              "justification": "blocks every release" },
            { "number": 9, "title": "item 9", "severity": 3, "impact": 4, "effort": 1,
              "justification": "hot path regression" },
        ],
    }));
    reasoning.push_json(json!({
        "plans": [
            { "number": 5, "title": "Stabilize CI", "plan": ["a", "b", "c", "d", "e"],
              "files_likely_touched": ["ci/runner.rs"], "edge_cases": ["timeout"],
              "acceptance_criteria": ["green builds"], "test_hints": ["rerun 10x"], "citations": [] },
            { "number": 2, "title": "Fix login", "plan": ["a", "b", "c"],
              "files_likely_touched": [], "edge_cases": [], "acceptance_criteria": [],
              "test_hints": [], "citations": [] },
            { "number": 9, "title": "Speed up hot path", "plan": ["a", "b"],
              "files_likely_touched": [], "edge_cases": [], "acceptance_criteria": [],
              "test_hints": [], "citations": [] },
        ],
    }));
    reasoning.push_text("# Triage Report: acme/widgets\n\nAll clear.");
}

fn orchestrator_with(
    reasoning: Arc<ScriptedReasoning>,
    context: Arc<StaticContext>,
) -> Orchestrator {
    Orchestrator::new(
        Ports {
            reasoning,
            repository: Arc::new(StaticRepository::new(backlog())),
            context,
        },
        OrchestratorConfig::default(),
    )
}

#[tokio::test]
async fn test_full_pipeline_with_one_refinement_round() {
    let reasoning = Arc::new(ScriptedReasoning::new());
    script_full_run(&reasoning);
    let context = Arc::new(StaticContext::with_comments(HashMap::from([
        (5, vec!["fails only on the arm64 runner".to_string()]),
        (11, vec!["superseded by #12".to_string()]),
    ])));
    let orchestrator = orchestrator_with(reasoning.clone(), context.clone());

    let id = orchestrator.start_triage(request()).await.unwrap();
    let report = orchestrator.wait(&id).await.unwrap();

    // 2 clustering calls (refinement), then one each for labeling,
    // prioritizing, and planning.
    assert_eq!(reasoning.json_calls(), 5);
    assert_eq!(reasoning.text_calls(), 1);
    assert_eq!(context.comment_calls(), 1);

    // Cluster members partition the fetched set.
    let mut all: Vec<u64> = report
        .clusters
        .iter()
        .flat_map(|c| c.members.clone())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (1..=12).collect::<Vec<u64>>());
    assert_eq!(
        report.clusters[0].proposed_labels,
        vec!["type:bug".to_string(), "component:auth".to_string()]
    );

    // Scores recomputed locally and ranked descending.
    let numbers: Vec<u64> = report.top_issues.iter().map(|p| p.number).collect();
    assert_eq!(numbers, vec![5, 2, 9]);
    let scores: Vec<u8> = report.top_issues.iter().map(|p| p.score).collect();
    assert_eq!(scores, vec![81, 75, 66]);
    assert!(report.top_issues[0].links[0].contains("/issues/5"));

    assert_eq!(report.plans.len(), 3);
    assert!(report.report_markdown.contains("All clear"));
    assert_eq!(report.metadata.items_fetched, 12);
    assert_eq!(report.metadata.stage_timings.len(), 6);

    let snapshot = orchestrator.progress(&id).await.unwrap();
    assert_eq!(snapshot.stage, PipelineStage::Done);
    assert!(snapshot.error.is_none());
}

#[tokio::test]
async fn test_patch_generation_after_completion() {
    let reasoning = Arc::new(ScriptedReasoning::new());
    script_full_run(&reasoning);
    let orchestrator = orchestrator_with(reasoning.clone(), Arc::new(StaticContext::default()));

    let id = orchestrator.start_triage(request()).await.unwrap();
    orchestrator.wait(&id).await.unwrap();
    let text_calls_after_run = reasoning.text_calls();

    // Item 9's context is thin (two plan steps, nothing else): rejected
    // before any reasoning call.
    let outcome = orchestrator.generate_patch(&id, 9).await.unwrap();
    assert!(outcome.is_rejected());
    assert_eq!(reasoning.text_calls(), text_calls_after_run);

    // Item 5 has a full plan with files and edge cases.
    reasoning.push_text(
        r#"{"file_path": "ci/runner.rs", "pseudocode": "// retry the stage once",
            "explanation": "Retries the flaky stage", "approach": "retry"}"#,
    );
    let outcome = orchestrator.generate_patch(&id, 5).await.unwrap();
    let patch = outcome.patch().expect("patch should be generated");
    assert_eq!(patch.file_path, "ci/runner.rs");
    assert!((patch.confidence - 0.6).abs() < 1e-9);
    assert!(patch.review_note.is_none());

    // The generated patch lands on the session's report.
    let report = orchestrator.report(&id).await.unwrap();
    assert_eq!(report.patches.len(), 1);
    assert_eq!(report.patches[0].number, 5);

    // Unprioritized items cannot be patched.
    assert!(matches!(
        orchestrator.generate_patch(&id, 7).await.unwrap_err(),
        TriageError::InvalidRequest(_)
    ));
}

/// Reasoning port that blocks each call on a semaphore, so tests control
/// exactly when the pipeline progresses.
struct GatedReasoning {
    inner: ScriptedReasoning,
    gate: Semaphore,
}

impl GatedReasoning {
    fn new() -> Self {
        Self {
            inner: ScriptedReasoning::new(),
            gate: Semaphore::new(0),
        }
    }
}

#[async_trait]
impl ReasoningPort for GatedReasoning {
    async fn complete_json(&self, request: &ReasoningRequest) -> triage_core::Result<Value> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| TriageError::Transient("gate closed".to_string()))?;
        self.inner.complete_json(request).await
    }

    async fn complete_text(&self, request: &ReasoningRequest) -> triage_core::Result<String> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| TriageError::Transient("gate closed".to_string()))?;
        self.inner.complete_text(request).await
    }
}

#[tokio::test]
async fn test_cancellation_stops_at_next_suspension_point() {
    let reasoning = Arc::new(GatedReasoning::new());
    // An uncertain first proposal forces a second propose pass, where the
    // cancellation check fires.
    reasoning
        .inner
        .push_json(clustering_reply([0.1, 0.5, 0.2, 0.6], vec![5]));
    let orchestrator = Orchestrator::new(
        Ports {
            reasoning: reasoning.clone(),
            repository: Arc::new(StaticRepository::new(backlog())),
            context: Arc::new(StaticContext::default()),
        },
        OrchestratorConfig::default(),
    );

    let id = orchestrator.start_triage(request()).await.unwrap();
    orchestrator.cancel(&id).await.unwrap();
    reasoning.gate.add_permits(8);

    let error = orchestrator.wait(&id).await.unwrap_err();
    assert!(matches!(error, TriageError::Cancelled));

    let snapshot = orchestrator.progress(&id).await.unwrap();
    assert_eq!(snapshot.stage, PipelineStage::Failed);
}

#[tokio::test]
async fn test_session_capacity_is_enforced() {
    let reasoning = Arc::new(GatedReasoning::new());
    let orchestrator = Orchestrator::new(
        Ports {
            reasoning: reasoning.clone(),
            repository: Arc::new(StaticRepository::new(backlog())),
            context: Arc::new(StaticContext::default()),
        },
        OrchestratorConfig {
            max_concurrent_sessions: 1,
            ..OrchestratorConfig::default()
        },
    );

    // First session parks at the clustering gate and holds the only slot.
    let id = orchestrator.start_triage(request()).await.unwrap();
    let error = orchestrator.start_triage(request()).await.unwrap_err();
    assert!(matches!(error, TriageError::RateLimited { .. }));

    orchestrator.cancel(&id).await.unwrap();
    reasoning.gate.add_permits(8);
    assert!(orchestrator.wait(&id).await.is_err());
}

#[tokio::test]
async fn test_label_failure_degrades_to_unlabeled_clusters() {
    let reasoning = Arc::new(ScriptedReasoning::new());
    // Confident clustering, then a malformed labeling reply, then the rest
    // of the pipeline.
    reasoning.push_json(clustering_reply([0.1, 0.2, 0.2, 0.1], vec![]));
    reasoning.push_json(json!({ "unexpected": true }));
    reasoning.push_json(json!({
        "top": [
            { "number": 1, "title": "item 1", "severity": 4, "impact": 4, "effort": 2,
              "justification": "worst offender" },
        ],
    }));
    reasoning.push_json(json!({ "plans": [] }));
    reasoning.push_text("# Report");
    let orchestrator = orchestrator_with(reasoning.clone(), Arc::new(StaticContext::default()));

    let id = orchestrator.start_triage(request()).await.unwrap();
    let report = orchestrator.wait(&id).await.unwrap();

    assert!(report
        .clusters
        .iter()
        .all(|cluster| cluster.proposed_labels.is_empty()));
    assert_eq!(report.top_issues.len(), 1);
    assert!(report.plans.is_empty());
}
