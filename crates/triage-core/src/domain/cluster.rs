//! Topic clusters and the per-round context accumulated while refining them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A topic cluster of backlog items.
///
/// Across one session the clusters form a strict partition of the fetched
/// item numbers: their member sets are pairwise disjoint and their union is
/// the full fetched set. The cluster stage enforces this after refinement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub title: String,
    /// Short summary of the common theme.
    pub summary: String,
    /// Member item numbers, in proposal order.
    pub members: Vec<u64>,
    /// Filled in by the label stage (1-4 labels; empty until then, or when
    /// labeling degraded).
    #[serde(default)]
    pub proposed_labels: Vec<String>,
    /// Self-reported uncertainty in [0.0, 1.0].
    pub uncertainty: f64,
}

/// Additional per-item context gathered during refinement rounds.
///
/// Merging is additive: later rounds append to whatever earlier rounds
/// collected, so a re-propose always sees the full accumulated context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextDelta {
    /// Item number -> sampled comment bodies.
    #[serde(default)]
    pub comments: HashMap<u64, Vec<String>>,
    /// PR number -> review states ("APPROVED", "CHANGES_REQUESTED", ...).
    #[serde(default)]
    pub review_states: HashMap<u64, Vec<String>>,
}

impl ContextDelta {
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty() && self.review_states.is_empty()
    }

    /// Fold `other` into `self`, appending per-item entries.
    pub fn merge(&mut self, other: ContextDelta) {
        for (number, mut texts) in other.comments {
            self.comments.entry(number).or_default().append(&mut texts);
        }
        for (number, mut states) in other.review_states {
            self.review_states
                .entry(number)
                .or_default()
                .append(&mut states);
        }
    }
}
