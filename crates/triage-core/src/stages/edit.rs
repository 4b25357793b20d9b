//! Edit stage: render the final report.
//!
//! Pure aggregation, one structured-to-text reasoning call. Failure here is
//! never fatal: a minimal report is synthesized locally from the structured
//! data instead.

use serde_json::json;
use tracing::warn;

use crate::domain::{Cluster, CodePatch, FixPlan, PriorityEntry};
use crate::error::Result;
use crate::ports::{ReasoningPort, ReasoningRequest};

const SYSTEM_PROMPT: &str = "You are a technical editor. Turn the provided \
triage data into a clean professional Markdown report: executive summary, \
clusters overview with members and labels, a table of the top prioritized \
issues with scores, the fix plans, and any generated patches with their \
confidence. Cite item URLs. Respond with only the Markdown text.";

/// Inputs the edit stage aggregates.
#[derive(Debug)]
pub struct ReportInputs<'a> {
    pub repo: &'a str,
    pub clusters: &'a [Cluster],
    pub priorities: &'a [PriorityEntry],
    pub plans: &'a [FixPlan],
    pub patches: &'a [CodePatch],
}

/// Render the report, falling back to a locally synthesized one when the
/// reasoning call fails or returns nothing usable.
pub async fn run(reasoning: &dyn ReasoningPort, inputs: &ReportInputs<'_>) -> String {
    match render_remote(reasoning, inputs).await {
        Ok(markdown) if !markdown.trim().is_empty() => markdown,
        Ok(_) => {
            warn!("editor returned an empty report, synthesizing fallback");
            fallback_report(inputs)
        }
        Err(error) => {
            warn!(%error, "editor stage failed, synthesizing fallback report");
            fallback_report(inputs)
        }
    }
}

async fn render_remote(reasoning: &dyn ReasoningPort, inputs: &ReportInputs<'_>) -> Result<String> {
    let data = json!({
        "repo": inputs.repo,
        "clusters": inputs.clusters,
        "priorities": inputs.priorities,
        "plans": inputs.plans,
        "patches": inputs.patches,
    });
    let request = ReasoningRequest::text(
        SYSTEM_PROMPT,
        format!("Create a triage report from this data:\n\n{data}"),
    )
    .with_temperature(0.5);
    let reply = reasoning.complete_text(&request).await?;
    Ok(strip_markdown_fence(&reply))
}

/// Editors sometimes wrap the whole reply in a markdown fence; unwrap it.
fn strip_markdown_fence(reply: &str) -> String {
    let trimmed = reply.trim();
    for fence in ["```markdown", "```md", "```"] {
        if let Some(rest) = trimmed.strip_prefix(fence) {
            return rest
                .rsplit_once("```")
                .map(|(body, _)| body)
                .unwrap_or(rest)
                .trim()
                .to_string();
        }
    }
    trimmed.to_string()
}

/// Minimal report synthesized from the structured data alone.
fn fallback_report(inputs: &ReportInputs<'_>) -> String {
    let mut out = format!("# Triage Report: {}\n\n## Clusters\n\n", inputs.repo);
    for cluster in inputs.clusters {
        out.push_str(&format!(
            "- **{}** ({} items{}): {}\n",
            cluster.title,
            cluster.members.len(),
            if cluster.proposed_labels.is_empty() {
                String::new()
            } else {
                format!(", labels: {}", cluster.proposed_labels.join(", "))
            },
            cluster.summary,
        ));
    }

    out.push_str("\n## Top Issues\n\n| # | Title | Score | Why |\n|---|---|---|---|\n");
    for entry in inputs.priorities {
        out.push_str(&format!(
            "| {} | {} | {} | {} |\n",
            entry.number, entry.title, entry.score, entry.justification
        ));
    }

    if !inputs.plans.is_empty() {
        out.push_str("\n## Fix Plans\n");
        for plan in inputs.plans {
            out.push_str(&format!("\n### #{} {}\n\n", plan.number, plan.title));
            for (index, step) in plan.steps.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", index + 1, step));
            }
        }
    }

    if !inputs.patches.is_empty() {
        out.push_str("\n## Patches\n");
        for patch in inputs.patches {
            out.push_str(&format!(
                "\n### #{} `{}` (confidence {:.2})\n\n```\n{}\n```\n",
                patch.number, patch.file_path, patch.confidence, patch.pseudocode
            ));
        }
    }

    out
}
