//! Priority entries and the scoring formula.

use serde::{Deserialize, Serialize};

/// Compute the priority score from severity, impact, and effort (each 1-5).
///
/// `score = clamp((severity*4 + impact*3 - effort*2) * 3, 0, 100)`
///
/// The score returned by the reasoning service is never trusted; callers
/// recompute it with this function.
pub fn priority_score(severity: u8, impact: u8, effort: u8) -> u8 {
    let raw = (i32::from(severity) * 4 + i32::from(impact) * 3 - i32::from(effort) * 2) * 3;
    raw.clamp(0, 100) as u8
}

/// One scored entry in the top-3 priority list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityEntry {
    pub number: u64,
    pub title: String,
    /// How badly users are affected, 1-5.
    pub severity: u8,
    /// How many users are affected, 1-5.
    pub impact: u8,
    /// How hard the fix is, 1-5.
    pub effort: u8,
    /// Derived via [`priority_score`], 0-100.
    pub score: u8,
    /// Required, non-empty reasoning for the ranking.
    pub justification: String,
    /// Reference links (item URLs).
    #[serde(default)]
    pub links: Vec<String>,
}
