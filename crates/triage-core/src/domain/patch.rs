//! Generated code patches and the rejection gate.

use serde::{Deserialize, Serialize};

/// Patches with confidence below this are never surfaced to the caller.
pub const MIN_PATCH_CONFIDENCE: f64 = 0.3;

/// A generated code patch for one item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodePatch {
    pub number: u64,
    /// Target file path for the change.
    pub file_path: String,
    /// Commented pseudocode describing the fix.
    pub pseudocode: String,
    /// Natural-language explanation of what the patch does.
    pub explanation: String,
    /// Confidence in [0.0, 1.0]; always >= [`MIN_PATCH_CONFIDENCE`] for a
    /// surfaced patch.
    pub confidence: f64,
    /// Fix approach/strategy tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approach: Option<String>,
    /// Full generated implementation, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_code: Option<String>,
    /// Set when the patch came from the raw-text fallback path and needs
    /// human review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,
}

/// Outcome of an on-demand generation request.
///
/// A low-confidence result is an explicit rejection, not a weak patch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PatchOutcome {
    Generated(CodePatch),
    Rejected {
        number: u64,
        confidence: f64,
        reason: String,
    },
}

impl PatchOutcome {
    pub fn is_rejected(&self) -> bool {
        matches!(self, PatchOutcome::Rejected { .. })
    }

    /// The surfaced patch, if one was generated.
    pub fn patch(&self) -> Option<&CodePatch> {
        match self {
            PatchOutcome::Generated(patch) => Some(patch),
            PatchOutcome::Rejected { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_outcome_has_no_patch() {
        let outcome = PatchOutcome::Rejected {
            number: 12,
            confidence: 0.2,
            reason: "no reproduction steps".to_string(),
        };
        assert!(outcome.is_rejected());
        assert!(outcome.patch().is_none());
    }

    #[test]
    fn test_outcome_serde_tag() {
        let outcome = PatchOutcome::Rejected {
            number: 3,
            confidence: 0.1,
            reason: "thin context".to_string(),
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "rejected");
    }
}
