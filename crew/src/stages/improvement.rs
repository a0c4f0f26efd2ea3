//! Improvement of artifacts that fail review.
//!
//! This is the only place an artifact's source changes after creation.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::gate::review_fails;
use crate::core::types::{CodeArtifact, RequirementDoc, ReviewResult, TestResult};
use crate::io::reasoning::{ReasoningService, StageContext};
use crate::io::storage::ArtifactStore;

use super::codegen::CodeGenStage;
use super::review::issue_list;
use super::{Reasoning, fan_out, subtask_for};

pub struct ImprovementStage<'a> {
    codegen: &'a CodeGenStage,
    parallel: bool,
}

impl<'a> ImprovementStage<'a> {
    pub fn new(codegen: &'a CodeGenStage, parallel: bool) -> Self {
        Self { codegen, parallel }
    }

    /// Revise every artifact whose review scores below the gate.
    ///
    /// Artifacts that pass review are left untouched even if their tests
    /// failed. Revisions are persisted in subtask order. Returns the ids of the
    /// revised artifacts.
    #[instrument(skip_all, fields(artifacts = artifacts.len()))]
    pub fn improve<R, S>(
        &self,
        io: &Reasoning<'_, R>,
        store: &S,
        requirements: &RequirementDoc,
        artifacts: &mut [CodeArtifact],
        reviews: &[ReviewResult],
        tests: &[TestResult],
    ) -> Result<Vec<u32>>
    where
        R: ReasoningService,
        S: ArtifactStore + ?Sized,
    {
        let targets: Vec<(usize, StageContext)> = artifacts
            .iter()
            .enumerate()
            .filter_map(|(idx, artifact)| {
                let review = reviews
                    .iter()
                    .find(|r| r.subtask_id == artifact.subtask_id)?;
                if !review_fails(review) {
                    return None;
                }
                let test = tests.iter().find(|t| t.subtask_id == artifact.subtask_id);
                Some((idx, improvement_context(artifact, review, test)))
            })
            .collect();

        let shared: &[CodeArtifact] = artifacts;
        let revisions = fan_out(self.parallel, &targets, |(idx, context)| {
            let artifact = &shared[*idx];
            let subtask = subtask_for(&requirements.subtasks, artifact.subtask_id)?;
            self.codegen
                .improve(io, artifact, subtask, requirements, context)
        })?;

        let mut improved = Vec::with_capacity(targets.len());
        for ((idx, _), source) in targets.iter().zip(revisions) {
            let artifact = &mut artifacts[*idx];
            artifact.source_text = source;
            store.write(&artifact.location, &artifact.source_text)?;
            improved.push(artifact.subtask_id);
        }
        info!(improved = improved.len(), "artifacts improved");
        Ok(improved)
    }
}

/// Current code as the prior artifact; suggestions then failing test output
/// as prior feedback.
fn improvement_context(
    artifact: &CodeArtifact,
    review: &ReviewResult,
    test: Option<&TestResult>,
) -> StageContext {
    let mut feedback = Vec::new();
    if review.suggestions.trim().is_empty() {
        feedback.push(issue_list(&review.issues));
    } else {
        feedback.push(review.suggestions.clone());
    }
    if let Some(test) = test.filter(|t| !t.outcome.passed) {
        let stderr = test.outcome.stderr.trim();
        if !stderr.is_empty() {
            feedback.push(format!("Failing test output:\n{stderr}"));
        }
    }
    StageContext {
        prior_artifacts: vec![artifact.source_text.clone()],
        prior_feedback: feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ExecutionOutcome, Issue, Severity};
    use crate::io::prompt::PromptBuilder;
    use crate::io::reasoning::Operation;
    use crate::test_support::{ScriptedReasoner, TestWorkspace, sample_requirements};
    use std::path::PathBuf;

    fn artifact(id: u32, location: &str, code: &str) -> CodeArtifact {
        CodeArtifact {
            subtask_id: id,
            source_text: code.to_string(),
            location: PathBuf::from(location),
        }
    }

    fn review(id: u32, score: u32, suggestions: &str) -> ReviewResult {
        ReviewResult {
            subtask_id: id,
            issues: vec![Issue::new(Severity::Severe, "crash on empty input")],
            suggestions: suggestions.to_string(),
            score,
        }
    }

    fn test(id: u32, passed: bool, stderr: &str) -> TestResult {
        TestResult {
            subtask_id: id,
            test_code: String::new(),
            test_location: PathBuf::from(format!("test_{id}.py")),
            outcome: ExecutionOutcome {
                passed,
                stdout: String::new(),
                stderr: stderr.to_string(),
                exit_code: i32::from(!passed),
            },
        }
    }

    #[test]
    fn only_low_scoring_artifacts_are_revised_and_persisted() {
        let workspace = TestWorkspace::new().expect("workspace");
        let store = workspace.store();
        let reasoner = ScriptedReasoner::new()
            .respond(Operation::ImproveCode, "```python\nfixed = True\n```");
        let prompts = PromptBuilder::new(40_000).expect("prompts");
        let io = Reasoning::new(&reasoner, &prompts, "python");
        let codegen = CodeGenStage::new("py", "python");
        let requirements = sample_requirements("req", &["first", "second"]);
        let mut artifacts = vec![
            artifact(1, "module.py", "broken = 1"),
            artifact(2, "main.py", "fine = 1"),
        ];
        let reviews = vec![review(1, 60, "handle empty input"), review(2, 90, "")];
        // Subtask 2 fails its tests but passes review, so it stays as is.
        let tests = vec![test(1, false, "E AssertionError"), test(2, false, "boom")];

        let improved = ImprovementStage::new(&codegen, false)
            .improve(&io, &store, &requirements, &mut artifacts, &reviews, &tests)
            .expect("improve");

        assert_eq!(improved, vec![1]);
        assert_eq!(artifacts[0].source_text, "fixed = True");
        assert_eq!(artifacts[1].source_text, "fine = 1");
        assert_eq!(
            store.read(std::path::Path::new("module.py")).expect("read"),
            Some("fixed = True".to_string())
        );

        let calls = reasoner.calls_for(Operation::ImproveCode);
        assert_eq!(calls.len(), 1);
        let context = calls[0].context.as_ref().expect("context");
        assert_eq!(context.prior_artifacts, vec!["broken = 1".to_string()]);
        assert_eq!(context.prior_feedback[0], "handle empty input");
        assert!(context.prior_feedback[1].contains("E AssertionError"));
    }

    #[test]
    fn blank_suggestions_fall_back_to_issue_list() {
        let context = improvement_context(
            &artifact(1, "module.py", "x"),
            &review(1, 50, "   "),
            Some(&test(1, true, "")),
        );
        assert_eq!(
            context.prior_feedback,
            vec!["1. [severe] crash on empty input".to_string()]
        );
    }
}
