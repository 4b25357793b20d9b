//! Fix-plan stage: structured plans for the top-3 prioritized items.
//!
//! Single-shot consumer covering all prioritized items in one request.
//! Optional stage: the orchestrator absorbs failures into an empty plan
//! list, which only lowers the checklist confidence of later on-demand
//! patch generation.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{FetchedItem, FixPlan, PriorityEntry};
use crate::error::{Result, TriageError};
use crate::ports::{ReasoningPort, ReasoningRequest};
use crate::stages::{items_payload, string_array};

const SYSTEM_PROMPT: &str = "You are a senior engineer writing fix plans for \
prioritized issues. For each issue provide 5-9 concrete steps, candidate file \
paths, edge cases, acceptance criteria, test hints, and citation URLs. \
Respond with only a JSON object: {\"plans\": [{\"number\": 123, \"title\": \
\"...\", \"plan\": [\"...\"], \"files_likely_touched\": [\"...\"], \
\"edge_cases\": [\"...\"], \"acceptance_criteria\": [\"...\"], \"test_hints\": \
[\"...\"], \"citations\": [\"...\"]}]}";

/// Run the fix-plan stage over the prioritized items.
pub async fn run(
    reasoning: &dyn ReasoningPort,
    priorities: &[PriorityEntry],
    items: &[FetchedItem],
) -> Result<Vec<FixPlan>> {
    if priorities.is_empty() {
        return Ok(vec![]);
    }

    let prioritized: HashSet<u64> = priorities.iter().map(|p| p.number).collect();
    let relevant: Vec<FetchedItem> = items
        .iter()
        .filter(|item| prioritized.contains(&item.number))
        .cloned()
        .collect();

    let user = format!(
        "Create fix plans for these prioritized issues.\n\nPriorities:\n{}\n\nFull issue details:\n{}",
        serde_json::to_value(priorities)?,
        items_payload(&relevant),
    );
    let request = ReasoningRequest::json(SYSTEM_PROMPT, user).with_temperature(0.6);
    let payload = reasoning.complete_json(&request).await?;

    let plans = parse_plans(&payload, &prioritized)?;
    info!(plans = plans.len(), "fix-plan stage complete");
    Ok(plans)
}

fn parse_plans(payload: &Value, prioritized: &HashSet<u64>) -> Result<Vec<FixPlan>> {
    let entries = payload["plans"].as_array().ok_or_else(|| {
        TriageError::MalformedResponse("fix-plan reply has no plans array".to_string())
    })?;

    let mut plans = Vec::new();
    for entry in entries {
        let Some(number) = entry["number"].as_u64() else {
            warn!("dropping plan without item number");
            continue;
        };
        if !prioritized.contains(&number) {
            warn!(number, "dropping plan for non-prioritized item");
            continue;
        }
        let mut plan = FixPlan {
            number,
            title: entry["title"].as_str().unwrap_or_default().to_string(),
            steps: string_array(entry, "plan"),
            files: string_array(entry, "files_likely_touched"),
            edge_cases: string_array(entry, "edge_cases"),
            acceptance_criteria: string_array(entry, "acceptance_criteria"),
            test_hints: string_array(entry, "test_hints"),
            citations: string_array(entry, "citations"),
        };
        plan.truncate_steps();
        plans.push(plan);
    }
    Ok(plans)
}
