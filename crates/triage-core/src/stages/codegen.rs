//! On-demand code-patch generation.
//!
//! Not a pipeline state: invoked per item against a session's accumulated
//! priorities and plans, any number of times. Confidence comes from a fixed
//! weighted checklist over the available context, not from the reasoning
//! service; anything below 0.3 is an explicit rejection, never a weak patch.
//! An unparseable structured reply falls back to extracting a code block
//! from the raw text at fixed medium confidence with a review note.

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{CodePatch, FetchedItem, FixPlan, PatchOutcome, PriorityEntry, MIN_PATCH_CONFIDENCE};
use crate::error::Result;
use crate::ports::{ReasoningPort, ReasoningRequest};

/// Confidence assigned when the structured reply fails to parse and the
/// patch is recovered from raw text.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Weight of each checklist signal.
const SIGNAL_WEIGHT: f64 = 0.2;

const SYSTEM_PROMPT: &str = "You write a focused code patch for one \
prioritized issue, following its fix plan. Respond with only a JSON object: \
{\"file_path\": \"src/...\", \"pseudocode\": \"commented pseudocode of the \
change\", \"explanation\": \"what the patch does\", \"approach\": \"strategy \
tag\", \"full_code\": \"complete implementation if feasible\"}";

/// The fixed readiness checklist: each present signal contributes up to 0.2,
/// capped at 1.0. A partial plan (fewer than 5 steps) earns half weight.
pub fn readiness_confidence(item: &FetchedItem, plan: Option<&FixPlan>) -> (f64, Vec<&'static str>) {
    let body = item.body.to_lowercase();
    let mut confidence = 0.0;
    let mut missing = Vec::new();

    let has_file_path = plan.map(|p| !p.files.is_empty()).unwrap_or(false)
        || body.split_whitespace().any(looks_like_path);
    if has_file_path {
        confidence += SIGNAL_WEIGHT;
    } else {
        missing.push("concrete file path");
    }

    if ["error", "exception", "panic", "traceback", "stack trace"]
        .iter()
        .any(|needle| body.contains(needle))
    {
        confidence += SIGNAL_WEIGHT;
    } else {
        missing.push("error message");
    }

    let has_repro = body.contains("reproduce") || body.contains("repro")
        || (body.contains("\n1.") && body.contains("\n2."));
    if has_repro {
        confidence += SIGNAL_WEIGHT;
    } else {
        missing.push("reproduction steps");
    }

    match plan.map(|p| p.steps.len()).unwrap_or(0) {
        0 => missing.push("detailed plan"),
        1..=4 => confidence += SIGNAL_WEIGHT / 2.0,
        _ => confidence += SIGNAL_WEIGHT,
    }

    if plan.map(|p| !p.edge_cases.is_empty()).unwrap_or(false) {
        confidence += SIGNAL_WEIGHT;
    } else {
        missing.push("identified edge cases");
    }

    (confidence.min(1.0), missing)
}

/// Generate a patch for one prioritized item.
///
/// Requests with too little context are rejected up front, without spending
/// a reasoning call.
pub async fn generate(
    reasoning: &dyn ReasoningPort,
    priority: &PriorityEntry,
    plan: Option<&FixPlan>,
    item: &FetchedItem,
) -> Result<PatchOutcome> {
    let (confidence, missing) = readiness_confidence(item, plan);
    if confidence < MIN_PATCH_CONFIDENCE {
        info!(
            number = priority.number,
            confidence, "rejecting patch generation for thin context"
        );
        return Ok(PatchOutcome::Rejected {
            number: priority.number,
            confidence,
            reason: format!("insufficient context: missing {}", missing.join(", ")),
        });
    }

    let user = format!(
        "Issue:\n{}\n\nPriority assessment:\n{}\n\nFix plan:\n{}",
        serde_json::to_value(item)?,
        serde_json::to_value(priority)?,
        match plan {
            Some(plan) => serde_json::to_value(plan)?.to_string(),
            None => "(no plan available)".to_string(),
        },
    );
    let request = ReasoningRequest::json(SYSTEM_PROMPT, user).with_temperature(0.3);
    let raw = reasoning.complete_text(&request).await?;

    let patch = match parse_structured_patch(&raw, priority.number, confidence) {
        Some(patch) => patch,
        None => {
            warn!(
                number = priority.number,
                "structured patch reply unparseable, using raw-text fallback"
            );
            fallback_patch(&raw, priority.number, plan)
        }
    };

    if patch.confidence < MIN_PATCH_CONFIDENCE {
        return Ok(PatchOutcome::Rejected {
            number: priority.number,
            confidence: patch.confidence,
            reason: "generated patch confidence below threshold".to_string(),
        });
    }
    Ok(PatchOutcome::Generated(patch))
}

/// Parse the expected JSON shape; `None` routes to the fallback path.
fn parse_structured_patch(raw: &str, number: u64, confidence: f64) -> Option<CodePatch> {
    let value = extract_json_object(raw)?;
    let file_path = value["file_path"].as_str()?.to_string();
    let pseudocode = value["pseudocode"].as_str()?.to_string();
    Some(CodePatch {
        number,
        file_path,
        pseudocode,
        explanation: value["explanation"].as_str().unwrap_or_default().to_string(),
        confidence,
        approach: value["approach"].as_str().map(str::to_string),
        full_code: value["full_code"].as_str().map(str::to_string),
        review_note: None,
    })
}

/// Best-effort recovery from an unstructured reply.
fn fallback_patch(raw: &str, number: u64, plan: Option<&FixPlan>) -> CodePatch {
    let pseudocode = extract_code_block(raw)
        .unwrap_or_else(|| raw.trim().to_string());
    CodePatch {
        number,
        file_path: plan
            .and_then(|p| p.files.first().cloned())
            .unwrap_or_else(|| "unknown".to_string()),
        pseudocode,
        explanation: "Recovered from an unstructured reasoning reply.".to_string(),
        confidence: FALLBACK_CONFIDENCE,
        approach: None,
        full_code: None,
        review_note: Some(
            "Reply did not match the expected shape; extracted best-effort code. Review before use."
                .to_string(),
        ),
    }
}

/// Pull the first JSON object out of a reply that may be fenced or wrapped
/// in prose.
fn extract_json_object(raw: &str) -> Option<Value> {
    let candidate = match raw.split("```json").nth(1) {
        Some(fenced) => fenced.split("```").next().unwrap_or(fenced),
        None => raw,
    };
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&candidate[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Pull the first fenced code block out of a reply, dropping the language
/// line.
fn extract_code_block(raw: &str) -> Option<String> {
    let after_fence = raw.split("```").nth(1)?;
    let body = match after_fence.split_once('\n') {
        Some((first_line, rest)) if first_line.chars().all(|c| c.is_ascii_alphanumeric()) => rest,
        _ => after_fence,
    };
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn looks_like_path(token: &str) -> bool {
    let token = token.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '/' && c != '.');
    token.contains('/')
        && token
            .rsplit('.')
            .next()
            .map(|ext| (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or(false)
        && token.contains('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{sample_item, ScriptedReasoning};

    fn plan(number: u64, steps: usize, files: Vec<&str>, edge_cases: Vec<&str>) -> FixPlan {
        FixPlan {
            number,
            title: "plan".to_string(),
            steps: (0..steps).map(|i| format!("step {i}")).collect(),
            files: files.into_iter().map(str::to_string).collect(),
            edge_cases: edge_cases.into_iter().map(str::to_string).collect(),
            acceptance_criteria: vec![],
            test_hints: vec![],
            citations: vec![],
        }
    }

    fn priority(number: u64) -> PriorityEntry {
        PriorityEntry {
            number,
            title: "broken".to_string(),
            severity: 4,
            impact: 4,
            effort: 2,
            score: 78,
            justification: "matters".to_string(),
            links: vec![],
        }
    }

    #[test]
    fn test_full_checklist_scores_one() {
        let mut item = sample_item(1, "crash");
        item.body = "panic at src/auth/handler.rs\nSteps to reproduce:\n1. log in\n2. wait"
            .to_string();
        let plan = plan(1, 6, vec!["src/auth/handler.rs"], vec!["expired token"]);
        let (confidence, missing) = readiness_confidence(&item, Some(&plan));
        assert!((confidence - 1.0).abs() < 1e-9);
        assert!(missing.is_empty());
    }

    #[test]
    fn test_partial_plan_earns_half_weight() {
        let mut item = sample_item(1, "crash");
        item.body = "error in src/auth/handler.rs when reproduce".to_string();
        let short = plan(1, 3, vec![], vec![]);
        let (with_short, _) = readiness_confidence(&item, Some(&short));
        let full = plan(1, 6, vec![], vec![]);
        let (with_full, _) = readiness_confidence(&item, Some(&full));
        assert!(with_full > with_short);
        assert!((with_full - with_short - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_thin_context_is_rejected_without_reasoning_call() {
        let reasoning = ScriptedReasoning::new();
        let mut item = sample_item(5, "vague");
        item.body = "something is off".to_string();
        let outcome = generate(&reasoning, &priority(5), None, &item).await.unwrap();
        assert!(outcome.is_rejected());
        assert_eq!(reasoning.text_calls(), 0);
        if let PatchOutcome::Rejected { confidence, reason, .. } = outcome {
            assert!(confidence < MIN_PATCH_CONFIDENCE);
            assert!(reason.contains("missing"));
        }
    }

    #[tokio::test]
    async fn test_structured_reply_keeps_checklist_confidence() {
        let reasoning = ScriptedReasoning::new();
        reasoning.push_text(
            r#"{"file_path": "src/auth.rs", "pseudocode": "// guard the token", "explanation": "adds a guard", "approach": "guard-clause"}"#,
        );
        let mut item = sample_item(5, "crash");
        item.body = "panic in src/auth.rs\nSteps to reproduce:\n1. a\n2. b".to_string();
        let plan = plan(5, 6, vec!["src/auth.rs"], vec!["empty token"]);

        let outcome = generate(&reasoning, &priority(5), Some(&plan), &item)
            .await
            .unwrap();
        let patch = outcome.patch().expect("patch expected");
        assert_eq!(patch.file_path, "src/auth.rs");
        assert!((patch.confidence - 1.0).abs() < 1e-9);
        assert!(patch.review_note.is_none());
    }

    #[tokio::test]
    async fn test_unstructured_reply_falls_back_with_review_note() {
        let reasoning = ScriptedReasoning::new();
        reasoning.push_text("Here is the fix:\n```rust\nfn fix() {}\n```\nGood luck!");
        let mut item = sample_item(5, "crash");
        item.body = "panic in src/auth.rs, reproduce with 1. and 2.".to_string();
        let plan = plan(5, 6, vec!["src/auth.rs"], vec![]);

        let outcome = generate(&reasoning, &priority(5), Some(&plan), &item)
            .await
            .unwrap();
        let patch = outcome.patch().expect("patch expected");
        assert_eq!(patch.pseudocode, "fn fix() {}");
        assert_eq!(patch.file_path, "src/auth.rs");
        assert!((patch.confidence - FALLBACK_CONFIDENCE).abs() < 1e-9);
        assert!(patch.review_note.is_some());
    }

    #[test]
    fn test_extract_json_object_from_fenced_reply() {
        let raw = "Sure!\n```json\n{\"file_path\": \"a.rs\", \"pseudocode\": \"x\"}\n```";
        let value = extract_json_object(raw).unwrap();
        assert_eq!(value["file_path"], "a.rs");
    }

    #[test]
    fn test_looks_like_path() {
        assert!(looks_like_path("src/auth/handler.rs"));
        assert!(looks_like_path("(tests/auth.test.ts)"));
        assert!(!looks_like_path("and/or"));
        assert!(!looks_like_path("5/6"));
    }
}
