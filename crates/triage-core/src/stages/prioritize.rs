//! Prioritize stage: score every item and select the top 3.
//!
//! Single-shot consumer, no refinement loop. Scores from the reasoning
//! service are never trusted: severity/impact/effort are clamped into 1-5
//! and the final score is recomputed locally. Required stage.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{priority_score, Cluster, FetchedItem, PriorityEntry};
use crate::error::{Result, TriageError};
use crate::ports::{ReasoningPort, ReasoningRequest};
use crate::stages::{items_payload, string_array};

/// Size of the priority list whenever enough items exist.
pub const TOP_PRIORITY_COUNT: usize = 3;

const SYSTEM_PROMPT: &str = "You are an engineering triage lead. Score each \
issue/PR on severity (1-5, user damage), impact (1-5, users affected), and \
effort (1-5, cost to fix), then select the top 3 most important items with a \
one-sentence justification each. Respond with only a JSON object: {\"top\": \
[{\"number\": 123, \"title\": \"...\", \"severity\": 4, \"impact\": 4, \
\"effort\": 2, \"justification\": \"...\", \"links\": [\"...\"]}]}";

/// Run the prioritize stage. Errors when no items are available or when the
/// reply yields no usable entry.
pub async fn run(
    reasoning: &dyn ReasoningPort,
    items: &[FetchedItem],
    clusters: &[Cluster],
) -> Result<Vec<PriorityEntry>> {
    if items.is_empty() {
        return Err(TriageError::InvalidRequest(
            "no items available to prioritize".to_string(),
        ));
    }

    let user = format!(
        "Clusters:\n{}\n\nAll items:\n{}\n\nSelect and score the top {} most important items.",
        serde_json::to_value(clusters)?,
        items_payload(items),
        TOP_PRIORITY_COUNT,
    );
    let request = ReasoningRequest::json(SYSTEM_PROMPT, user).with_temperature(0.5);
    let payload = reasoning.complete_json(&request).await?;

    let priorities = parse_priorities(&payload, items)?;
    info!(selected = priorities.len(), "prioritize stage complete");
    Ok(priorities)
}

/// Parse, validate, and rank the reply.
///
/// Entries referencing unknown items or missing a justification are dropped
/// with a warning. Survivors are ordered by original fetch order first, then
/// stably sorted by score descending, so equal scores tie-break by fetch
/// order. Duplicate numbers keep their first occurrence.
fn parse_priorities(payload: &Value, items: &[FetchedItem]) -> Result<Vec<PriorityEntry>> {
    let entries = payload["top"].as_array().ok_or_else(|| {
        TriageError::MalformedResponse("prioritization reply has no top array".to_string())
    })?;

    let by_number: HashMap<u64, &FetchedItem> =
        items.iter().map(|item| (item.number, item)).collect();
    let fetch_index: HashMap<u64, usize> = items
        .iter()
        .enumerate()
        .map(|(index, item)| (item.number, index))
        .collect();

    let mut seen: HashSet<u64> = HashSet::new();
    let mut priorities: Vec<PriorityEntry> = Vec::new();

    for entry in entries {
        let Some(number) = entry["number"].as_u64() else {
            warn!("dropping priority entry without item number");
            continue;
        };
        let Some(item) = by_number.get(&number) else {
            warn!(number, "dropping priority entry for unknown item");
            continue;
        };
        let justification = entry["justification"].as_str().unwrap_or_default().trim();
        if justification.is_empty() {
            warn!(number, "dropping priority entry without justification");
            continue;
        }
        if !seen.insert(number) {
            continue;
        }

        let severity = clamp_axis(entry["severity"].as_u64());
        let impact = clamp_axis(entry["impact"].as_u64());
        let effort = clamp_axis(entry["effort"].as_u64());
        let mut links = string_array(entry, "links");
        if links.is_empty() {
            links.push(item.html_url.clone());
        }

        priorities.push(PriorityEntry {
            number,
            title: entry["title"].as_str().unwrap_or(&item.title).to_string(),
            severity,
            impact,
            effort,
            score: priority_score(severity, impact, effort),
            justification: justification.to_string(),
            links,
        });
    }

    if priorities.is_empty() {
        return Err(TriageError::MalformedResponse(
            "prioritization reply yielded no usable entries".to_string(),
        ));
    }

    priorities.sort_by_key(|entry| fetch_index[&entry.number]);
    priorities.sort_by(|a, b| b.score.cmp(&a.score));
    priorities.truncate(TOP_PRIORITY_COUNT);
    Ok(priorities)
}

/// Clamp a severity/impact/effort axis into 1-5 (3 when absent).
fn clamp_axis(value: Option<u64>) -> u8 {
    value.unwrap_or(3).clamp(1, 5) as u8
}
