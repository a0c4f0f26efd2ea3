//! Code review and scoring.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::parse::extract_issues;
use crate::core::scoring;
use crate::core::types::{CodeArtifact, Issue, RequirementDoc, ReviewResult, SubTask};
use crate::io::prompt::PromptVars;
use crate::io::reasoning::{Operation, ReasoningService, StageContext};

use super::{Reasoning, Stage};

#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewStage;

impl ReviewStage {
    /// Review one artifact. The score is derived from the extracted issues only.
    #[instrument(skip_all, fields(subtask_id = artifact.subtask_id))]
    pub fn review<R: ReasoningService>(
        &self,
        io: &Reasoning<'_, R>,
        artifact: &CodeArtifact,
        subtask: &SubTask,
        requirements: &RequirementDoc,
    ) -> Result<ReviewResult> {
        let base = PromptVars {
            subtask: Some(subtask.description.clone()),
            code: Some(artifact.source_text.clone()),
            ..io.vars(&requirements.raw_input)
        };

        let reviewing = StageContext {
            prior_artifacts: vec![artifact.source_text.clone()],
            prior_feedback: Vec::new(),
        };

        let review_text = io.ask(Stage::Review, Operation::ReviewCode, &base, Some(&reviewing))?;
        let issues = extract_issues(&review_text);

        let findings = issue_list(&issues);
        let suggestions = io.ask(
            Stage::Review,
            Operation::SuggestImprovements,
            &PromptVars {
                review: Some(findings.clone()),
                ..base
            },
            Some(&StageContext {
                prior_feedback: vec![findings],
                ..reviewing
            }),
        )?;

        let score = scoring::score(&issues);
        info!(score, issues = issues.len(), "artifact reviewed");
        Ok(ReviewResult {
            subtask_id: artifact.subtask_id,
            issues,
            suggestions: suggestions.trim().to_string(),
            score,
        })
    }
}

/// Numbered `[severity] description` lines.
pub fn issue_list(issues: &[Issue]) -> String {
    issues
        .iter()
        .enumerate()
        .map(|(i, issue)| format!("{}. [{}] {}", i + 1, issue.severity, issue.description))
        .collect::<Vec<_>>()
        .join("\n")
}
