//! Deterministic review scoring.

use crate::core::types::Issue;

/// Score awarded to a review with no issues.
pub const PERFECT_SCORE: u32 = 100;

/// Score an issue list: start at 100, subtract each issue's severity penalty,
/// clamp to `0..=100`.
///
/// Depends only on the multiset of severities, never on issue order or text.
pub fn score(issues: &[Issue]) -> u32 {
    let penalty: u32 = issues.iter().map(|issue| issue.severity.penalty()).sum();
    PERFECT_SCORE.saturating_sub(penalty)
}
