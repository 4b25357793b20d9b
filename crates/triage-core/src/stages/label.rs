//! Label stage: propose 1-4 labels per cluster.
//!
//! Runs the refinement loop at threshold 0.35 with a wider gathering surface
//! than clustering: flagged issues get their comments fetched, flagged pull
//! requests additionally get their review states. Optional stage: the
//! orchestrator absorbs failures into unlabeled clusters.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::{Cluster, ContextDelta, FetchedItem, RepoRef};
use crate::error::{Result, TriageError};
use crate::ports::{ContextFetcherPort, ReasoningPort, ReasoningRequest};
use crate::refine::{refine, Proposal, LABEL_UNCERTAINTY_THRESHOLD, MAX_REFINEMENT_ROUNDS};
use crate::stages::{context_section, items_payload, string_array, u64_array};

/// Labels applied per cluster are capped here.
pub const MAX_LABELS_PER_CLUSTER: usize = 4;

const SYSTEM_PROMPT: &str = "You label clusters of repository issues and pull \
requests. Suggest 1-4 labels per cluster, preferring the repository's \
existing labels over new ones, using conventional forms like type:bug, \
component:api, priority:high. Report an uncertainty score per cluster between \
0.0 and 1.0, listing item numbers that need comments or reviews fetched under \
needs_context when uncertainty is high. Respond with only a JSON object: \
{\"labels_by_cluster\": [{\"cluster_id\": \"cluster_1\", \"labels\": \
[\"type:bug\"], \"uncertainty\": 0.2}], \"needs_context\": [], \"notes\": []}";

#[derive(Debug, Clone)]
struct LabelAssignment {
    cluster_id: String,
    labels: Vec<String>,
    uncertainty: f64,
}

/// Run the label stage, returning the clusters with `proposed_labels`
/// populated.
pub async fn run(
    reasoning: &dyn ReasoningPort,
    fetcher: &dyn ContextFetcherPort,
    repo: &RepoRef,
    clusters: Vec<Cluster>,
    items: &[FetchedItem],
    cancel: &CancellationToken,
) -> Result<Vec<Cluster>> {
    let existing: HashSet<&str> = items
        .iter()
        .flat_map(|item| item.labels.iter().map(String::as_str))
        .collect();
    let mut vocabulary: Vec<&str> = existing.into_iter().collect();
    vocabulary.sort_unstable();

    let clusters_json = serde_json::to_value(&clusters)?;
    let items_json = items_payload(items);
    let pr_numbers: HashSet<u64> = items
        .iter()
        .filter(|item| item.kind.is_pull_request())
        .map(|item| item.number)
        .collect();

    let refined = refine(
        LABEL_UNCERTAINTY_THRESHOLD,
        MAX_REFINEMENT_ROUNDS,
        |context| {
            let user = format!(
                "Existing labels in repo: {:?}\n\nClusters:\n{}\n\nAll items:\n{}{}",
                vocabulary,
                clusters_json,
                items_json,
                context_section(&context)
            );
            let request = ReasoningRequest::json(SYSTEM_PROMPT, user);
            async move {
                if cancel.is_cancelled() {
                    return Err(TriageError::Cancelled);
                }
                let payload = reasoning.complete_json(&request).await?;
                parse_proposal(&payload)
            }
        },
        |numbers| {
            let flagged_prs: Vec<u64> = numbers
                .iter()
                .copied()
                .filter(|n| pr_numbers.contains(n))
                .collect();
            async move {
                let comments = fetcher.fetch_comments(repo, &numbers).await?;
                let review_states = if flagged_prs.is_empty() {
                    HashMap::new()
                } else {
                    fetcher.fetch_reviews(repo, &flagged_prs).await?
                };
                Ok(ContextDelta {
                    comments,
                    review_states,
                })
            }
        },
    )
    .await?;

    let labeled = apply_labels(clusters, refined.value);
    info!(
        uncertainty = refined.uncertainty,
        rounds = refined.rounds,
        "label stage complete"
    );
    Ok(labeled)
}

fn parse_proposal(payload: &Value) -> Result<Proposal<Vec<LabelAssignment>>> {
    let entries = payload["labels_by_cluster"].as_array().ok_or_else(|| {
        TriageError::MalformedResponse("labeling reply has no labels_by_cluster array".to_string())
    })?;

    let assignments: Vec<LabelAssignment> = entries
        .iter()
        .filter_map(|entry| {
            let cluster_id = entry["cluster_id"].as_str()?.to_string();
            Some(LabelAssignment {
                cluster_id,
                labels: string_array(entry, "labels"),
                uncertainty: entry["uncertainty"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0),
            })
        })
        .collect();

    let uncertainty = assignments
        .iter()
        .map(|a| a.uncertainty)
        .fold(0.0_f64, f64::max);

    Ok(Proposal {
        value: assignments,
        uncertainty,
        needs_context: u64_array(payload, "needs_context"),
    })
}

/// Apply assignments onto the clusters: at most 4 labels each, cluster
/// uncertainty lowered to the better of the two scores.
fn apply_labels(mut clusters: Vec<Cluster>, assignments: Vec<LabelAssignment>) -> Vec<Cluster> {
    let by_id: HashMap<&str, &LabelAssignment> = assignments
        .iter()
        .map(|a| (a.cluster_id.as_str(), a))
        .collect();

    for cluster in &mut clusters {
        if let Some(assignment) = by_id.get(cluster.id.as_str()) {
            cluster.proposed_labels = assignment
                .labels
                .iter()
                .take(MAX_LABELS_PER_CLUSTER)
                .cloned()
                .collect();
            cluster.uncertainty = cluster.uncertainty.min(assignment.uncertainty);
        }
    }
    clusters
}
