//! Cluster stage: partition the backlog into topic clusters.
//!
//! Runs the refinement loop at threshold 0.4, then enforces the partition
//! invariant: duplicate members are removed, overlapping clusters merged,
//! and unassigned items swept into a designated `uncategorized` cluster.

use std::collections::HashSet;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::domain::{Cluster, ContextDelta, FetchedItem, RepoRef};
use crate::error::{Result, TriageError};
use crate::ports::{ContextFetcherPort, ReasoningPort, ReasoningRequest};
use crate::refine::{refine, Proposal, Refined, CLUSTER_UNCERTAINTY_THRESHOLD, MAX_REFINEMENT_ROUNDS};
use crate::stages::{context_section, items_payload, string_array, u64_array};

pub const UNCATEGORIZED_CLUSTER_ID: &str = "uncategorized";

const SYSTEM_PROMPT: &str = "You cluster repository issues and pull requests by \
concrete technical topic. Group the provided items into 3-7 clusters, merging \
near-duplicates. For each cluster report an uncertainty score between 0.0 \
(confident) and 1.0 (needs more context), and list item numbers that need \
their comments fetched under needs_context when uncertainty is high. Respond \
with only a JSON object: {\"clusters\": [{\"id\": \"cluster_1\", \"title\": \
\"...\", \"summary\": \"...\", \"members\": [1, 2], \"uncertainty\": 0.2}], \
\"needs_context\": [], \"notes\": []}";

/// Run the cluster stage over the full fetched item set.
///
/// This is a required stage: reasoning failures propagate.
pub async fn run(
    reasoning: &dyn ReasoningPort,
    fetcher: &dyn ContextFetcherPort,
    repo: &RepoRef,
    items: &[FetchedItem],
    cancel: &CancellationToken,
) -> Result<Vec<Cluster>> {
    let items_json = items_payload(items);

    let refined: Refined<Vec<Cluster>> = refine(
        CLUSTER_UNCERTAINTY_THRESHOLD,
        MAX_REFINEMENT_ROUNDS,
        |context| {
            let user = format!(
                "Cluster these issues/PRs:\n\n{}{}",
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
        |numbers| async move {
            let comments = fetcher.fetch_comments(repo, &numbers).await?;
            Ok(ContextDelta {
                comments,
                ..ContextDelta::default()
            })
        },
    )
    .await?;

    let clusters = enforce_partition(refined.value, items);
    info!(
        clusters = clusters.len(),
        uncertainty = refined.uncertainty,
        rounds = refined.rounds,
        "cluster stage complete"
    );
    Ok(clusters)
}

/// Parse the clustering payload into a proposal. The stage-level uncertainty
/// is the maximum over per-cluster scores.
fn parse_proposal(payload: &Value) -> Result<Proposal<Vec<Cluster>>> {
    let entries = payload["clusters"]
        .as_array()
        .filter(|entries| !entries.is_empty())
        .ok_or_else(|| {
            TriageError::MalformedResponse("clustering reply has no clusters array".to_string())
        })?;

    let mut clusters = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let uncertainty = entry["uncertainty"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0);
        clusters.push(Cluster {
            id: entry["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| format!("cluster_{}", index + 1)),
            title: entry["title"]
                .as_str()
                .unwrap_or("Untitled cluster")
                .to_string(),
            summary: entry["summary"].as_str().unwrap_or_default().to_string(),
            members: u64_array(entry, "members"),
            proposed_labels: string_array(entry, "proposed_labels"),
            uncertainty,
        });
    }

    let uncertainty = clusters
        .iter()
        .map(|c| c.uncertainty)
        .fold(0.0_f64, f64::max);

    Ok(Proposal {
        value: clusters,
        uncertainty,
        needs_context: u64_array(payload, "needs_context"),
    })
}

/// Post-pass enforcing the partition invariant.
///
/// Unknown member numbers are dropped, a cluster overlapping an earlier one
/// is merged into it (union of members, max uncertainty), and any fetched
/// item left unassigned lands in the `uncategorized` cluster.
fn enforce_partition(proposed: Vec<Cluster>, items: &[FetchedItem]) -> Vec<Cluster> {
    let known: HashSet<u64> = items.iter().map(|item| item.number).collect();
    let mut assigned: HashSet<u64> = HashSet::new();
    let mut output: Vec<Cluster> = Vec::new();

    for mut cluster in proposed {
        cluster.members.retain(|number| known.contains(number));

        let overlaps = output
            .iter()
            .position(|existing| existing.members.iter().any(|m| cluster.members.contains(m)));

        match overlaps {
            Some(index) => {
                let target = &mut output[index];
                warn!(
                    merged = %cluster.id,
                    into = %target.id,
                    "merging overlapping clusters"
                );
                for member in cluster.members {
                    if assigned.insert(member) {
                        target.members.push(member);
                    }
                }
                target.uncertainty = target.uncertainty.max(cluster.uncertainty);
            }
            None => {
                cluster.members.retain(|number| assigned.insert(*number));
                if !cluster.members.is_empty() {
                    output.push(cluster);
                }
            }
        }
    }

    let missing: Vec<u64> = items
        .iter()
        .map(|item| item.number)
        .filter(|number| !assigned.contains(number))
        .collect();

    if !missing.is_empty() {
        warn!(count = missing.len(), "sweeping unassigned items into fallback cluster");
        match output
            .iter_mut()
            .find(|cluster| cluster.id == UNCATEGORIZED_CLUSTER_ID)
        {
            Some(fallback) => fallback.members.extend(missing),
            None => output.push(Cluster {
                id: UNCATEGORIZED_CLUSTER_ID.to_string(),
                title: "Uncategorized".to_string(),
                summary: "Items not assigned to any topic cluster.".to_string(),
                members: missing,
                proposed_labels: vec![],
                uncertainty: 0.5,
            }),
        }
    }

    output
}
