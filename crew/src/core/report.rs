//! Final report assembly and rendering.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::gate::review_fails;
use crate::core::types::{
    ArchitectureSpec, CodeArtifact, RequirementDoc, ReviewResult, TestResult, WorkflowStatus,
};

const EXCERPT_CHARS: usize = 500;

/// Per-artifact line of the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub subtask_id: u32,
    pub location: PathBuf,
    pub score: Option<u32>,
    pub issue_count: usize,
    pub review_passed: bool,
    pub test_passed: bool,
    pub passed: bool,
}

/// Aggregate outcome of a run, ordered by subtask id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub status: WorkflowStatus,
    pub iterations: u32,
    pub artifact_count: usize,
    pub passed_count: usize,
    /// Mean review score, `0.0` when there are no reviews.
    pub average_score: f64,
    pub entries: Vec<ReportEntry>,
}

impl FinalReport {
    pub fn all_passed(&self) -> bool {
        self.passed_count == self.artifact_count
    }
}

/// Build the report from the last materialized pass.
///
/// Reviews and tests are paired to artifacts by `subtask_id`; an artifact with
/// no paired review or test counts as failing that check.
pub fn build_report(
    status: WorkflowStatus,
    iterations: u32,
    artifacts: &[CodeArtifact],
    reviews: &[ReviewResult],
    tests: &[TestResult],
) -> FinalReport {
    let mut entries: Vec<ReportEntry> = artifacts
        .iter()
        .map(|artifact| {
            let review = reviews.iter().find(|r| r.subtask_id == artifact.subtask_id);
            let test = tests.iter().find(|t| t.subtask_id == artifact.subtask_id);
            let review_passed = review.is_some_and(|r| !review_fails(r));
            let test_passed = test.is_some_and(|t| t.outcome.passed);
            ReportEntry {
                subtask_id: artifact.subtask_id,
                location: artifact.location.clone(),
                score: review.map(|r| r.score),
                issue_count: review.map_or(0, |r| r.issues.len()),
                review_passed,
                test_passed,
                passed: review_passed && test_passed,
            }
        })
        .collect();
    entries.sort_by_key(|entry| entry.subtask_id);

    FinalReport {
        status,
        iterations,
        artifact_count: artifacts.len(),
        passed_count: entries.iter().filter(|entry| entry.passed).count(),
        average_score: average_score(reviews),
        entries,
    }
}

/// Mean review score, `0.0` for an empty set.
pub fn average_score(reviews: &[ReviewResult]) -> f64 {
    if reviews.is_empty() {
        return 0.0;
    }
    let total: u32 = reviews.iter().map(|r| r.score).sum();
    f64::from(total) / reviews.len() as f64
}

/// Render the report as Markdown for `final_report.md`.
pub fn render_markdown(
    report: &FinalReport,
    requirements: &RequirementDoc,
    architecture: &ArchitectureSpec,
) -> String {
    let mut lines = vec![
        "# Code Generation Report".to_string(),
        String::new(),
        "## Overview".to_string(),
        String::new(),
        format!("- Status: {}", report.status),
        format!("- Iterations: {}", report.iterations),
        format!("- Files generated: {}", report.artifact_count),
        format!("- Average review score: {:.1}/100", report.average_score),
        format!(
            "- Artifacts passing: {}/{}",
            report.passed_count, report.artifact_count
        ),
        String::new(),
        "## Requirements".to_string(),
        String::new(),
        excerpt(&requirements.structured_doc),
        String::new(),
        "## Architecture".to_string(),
        String::new(),
        excerpt(&architecture.architecture_text),
        String::new(),
        "## Generated Files".to_string(),
        String::new(),
    ];
    lines.extend(
        report
            .entries
            .iter()
            .map(|entry| format!("- {}", entry.location.display())),
    );

    lines.extend([String::new(), "## Code Review".to_string(), String::new()]);
    lines.extend(report.entries.iter().map(|entry| match entry.score {
        Some(score) => format!(
            "- {}: score {score}/100 ({} issues)",
            entry.location.display(),
            entry.issue_count
        ),
        None => format!("- {}: not reviewed", entry.location.display()),
    }));

    lines.extend([String::new(), "## Tests".to_string(), String::new()]);
    lines.extend(report.entries.iter().map(|entry| {
        let verdict = if entry.test_passed { "passed" } else { "failed" };
        format!("- {}: {verdict}", entry.location.display())
    }));

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "N/A".to_string();
    }
    let mut chars = trimmed.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}…")
    } else {
        head
    }
}
