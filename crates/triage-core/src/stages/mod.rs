//! Pipeline stages.
//!
//! Cluster and Label run the shared refinement loop; Prioritize, Plan, and
//! Edit are single-shot consumers of the Reasoning Port; Codegen is invoked
//! on demand, outside the main pipeline. Each stage module owns its prompt,
//! its payload parsing, and nothing else; sequencing and failure policy
//! belong to the orchestrator.

pub mod cluster;
pub mod codegen;
pub mod edit;
pub mod label;
pub mod plan;
pub mod prioritize;

use serde_json::{json, Value};

use crate::domain::{ContextDelta, FetchedItem};

/// Compact item projection included in stage prompts.
pub(crate) fn items_payload(items: &[FetchedItem]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|item| {
                json!({
                    "number": item.number,
                    "kind": item.kind,
                    "title": item.title,
                    "body": item.body,
                    "labels": item.labels,
                    "state": item.state,
                    "comments": item.comments,
                    "html_url": item.html_url,
                })
            })
            .collect(),
    )
}

/// Render accumulated refinement context as a prompt section, or an empty
/// string when there is nothing to add.
pub(crate) fn context_section(delta: &ContextDelta) -> String {
    if delta.is_empty() {
        return String::new();
    }
    let mut entries: Vec<Value> = Vec::new();
    let mut numbers: Vec<u64> = delta
        .comments
        .keys()
        .chain(delta.review_states.keys())
        .copied()
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    for number in numbers {
        let mut entry = json!({ "number": number });
        if let Some(comments) = delta.comments.get(&number) {
            entry["sample_comments"] = json!(comments);
        }
        if let Some(states) = delta.review_states.get(&number) {
            entry["review_states"] = json!(states);
        }
        entries.push(entry);
    }
    format!(
        "\n\nAdditional context gathered for uncertain items:\n{}",
        Value::Array(entries)
    )
}

/// Read a `u64` array out of a JSON field, skipping non-integers.
pub(crate) fn u64_array(value: &Value, field: &str) -> Vec<u64> {
    value[field]
        .as_array()
        .map(|entries| entries.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default()
}

/// Read a string array out of a JSON field, skipping non-strings.
pub(crate) fn string_array(value: &Value, field: &str) -> Vec<String> {
    value[field]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
