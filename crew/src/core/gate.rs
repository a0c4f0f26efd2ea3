//! Quality gate deciding whether another improvement iteration is required.

use crate::core::types::{ReviewResult, TestResult};

/// Minimum review score an artifact needs to pass the gate.
pub const PASSING_SCORE: u32 = 80;

/// True if this review fails the gate on its own.
pub fn review_fails(review: &ReviewResult) -> bool {
    review.score < PASSING_SCORE
}

/// Returns true iff any review scores below [`PASSING_SCORE`] or any test failed.
///
/// No weighting across artifacts: a single failing artifact forces another
/// iteration over the whole set.
pub fn needs_iteration(reviews: &[ReviewResult], tests: &[TestResult]) -> bool {
    reviews.iter().any(review_fails) || tests.iter().any(|test| !test.outcome.passed)
}

/// Subtask ids that trip the gate, ascending and deduplicated.
pub fn failing_subtasks(reviews: &[ReviewResult], tests: &[TestResult]) -> Vec<u32> {
    let mut ids: Vec<u32> = reviews
        .iter()
        .filter(|review| review_fails(review))
        .map(|review| review.subtask_id)
        .chain(
            tests
                .iter()
                .filter(|test| !test.outcome.passed)
                .map(|test| test.subtask_id),
        )
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
