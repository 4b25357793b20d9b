//! Structured fix plans for prioritized items.

use serde::{Deserialize, Serialize};

/// Maximum number of steps kept in a plan.
pub const MAX_PLAN_STEPS: usize = 9;

/// An actionable fix plan for one prioritized item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixPlan {
    pub number: u64,
    pub title: String,
    /// Ordered step descriptions (5-9 requested, capped at 9).
    pub steps: Vec<String>,
    /// Candidate file paths likely touched by the fix.
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub edge_cases: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default)]
    pub test_hints: Vec<String>,
    /// Reference URLs backing the plan.
    #[serde(default)]
    pub citations: Vec<String>,
}

impl FixPlan {
    /// Enforce the step cap, keeping the leading steps.
    pub fn truncate_steps(&mut self) {
        self.steps.truncate(MAX_PLAN_STEPS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_steps_caps_at_nine() {
        let mut plan = FixPlan {
            number: 1,
            title: "t".to_string(),
            steps: (0..12).map(|i| format!("step {i}")).collect(),
            files: vec![],
            edge_cases: vec![],
            acceptance_criteria: vec![],
            test_hints: vec![],
            citations: vec![],
        };
        plan.truncate_steps();
        assert_eq!(plan.steps.len(), MAX_PLAN_STEPS);
        assert_eq!(plan.steps[0], "step 0");
    }
}
