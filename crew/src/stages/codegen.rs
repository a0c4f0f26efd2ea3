//! Code generation and revision for single subtasks.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, instrument};

use crate::core::naming::artifact_location;
use crate::core::parse::extract_code;
use crate::core::types::{ArchitectureSpec, CodeArtifact, RequirementDoc, SubTask};
use crate::io::prompt::PromptVars;
use crate::io::reasoning::{Operation, ReasoningService, StageContext};

use super::{Reasoning, Stage};

#[derive(Debug, Clone)]
pub struct CodeGenStage {
    extension: String,
    language: String,
}

impl CodeGenStage {
    pub fn new(extension: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            language: language.into(),
        }
    }

    /// Workspace-relative file for the subtask's artifact.
    pub fn location(&self, subtask: &SubTask) -> PathBuf {
        artifact_location(subtask, &self.extension)
    }

    /// Generate source for one subtask. Persisting it is the caller's job.
    #[instrument(skip_all, fields(subtask_id = subtask.id))]
    pub fn generate_source<R: ReasoningService>(
        &self,
        io: &Reasoning<'_, R>,
        subtask: &SubTask,
        requirements: &RequirementDoc,
        architecture: &ArchitectureSpec,
    ) -> Result<String> {
        let vars = PromptVars {
            subtask: Some(subtask.description.clone()),
            architecture: Some(architecture.architecture_text.clone()),
            interfaces: Some(architecture.module_interfaces.clone()),
            tech_stack: Some(architecture.tech_stack.clone()),
            ..io.vars(&requirements.raw_input)
        };
        let generated = io.ask(Stage::CodeGen, Operation::GenerateCode, &vars, None)?;
        let source = extract_code(&generated, &self.language);
        debug!(bytes = source.len(), "source generated");
        Ok(source)
    }

    /// Produce a revised version of `artifact` addressing `context`'s feedback.
    ///
    /// The context's prior artifact is the current code; its feedback entries
    /// are rendered into the prompt in order.
    #[instrument(skip_all, fields(subtask_id = artifact.subtask_id))]
    pub fn improve<R: ReasoningService>(
        &self,
        io: &Reasoning<'_, R>,
        artifact: &CodeArtifact,
        subtask: &SubTask,
        requirements: &RequirementDoc,
        context: &StageContext,
    ) -> Result<String> {
        let vars = PromptVars {
            subtask: Some(subtask.description.clone()),
            code: Some(artifact.source_text.clone()),
            feedback: Some(context.prior_feedback.join("\n\n")),
            ..io.vars(&requirements.raw_input)
        };
        let generated = io.ask(Stage::CodeGen, Operation::ImproveCode, &vars, Some(context))?;
        Ok(extract_code(&generated, &self.language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::prompt::PromptBuilder;
    use crate::test_support::{ScriptedReasoner, sample_architecture, sample_requirements};

    #[test]
    fn generated_source_is_extracted_from_fence() {
        let reasoner = ScriptedReasoner::new().respond(
            Operation::GenerateCode,
            "Here you go:\n```python\ndef add(a, b):\n    return a + b\n```\nEnjoy.",
        );
        let prompts = PromptBuilder::new(40_000).expect("prompts");
        let io = Reasoning::new(&reasoner, &prompts, "python");
        let stage = CodeGenStage::new("py", "python");
        let requirements = sample_requirements("build a calculator", &["add numbers"]);

        let source = stage
            .generate_source(
                &io,
                &requirements.subtasks[0],
                &requirements,
                &sample_architecture(),
            )
            .expect("generate");

        assert_eq!(source, "def add(a, b):\n    return a + b");
        let call = &reasoner.calls_for(Operation::GenerateCode)[0];
        assert!(call.prompt.contains("add numbers"));
        assert!(call.context.is_none());
    }

    #[test]
    fn improve_passes_current_code_and_feedback() {
        let reasoner = ScriptedReasoner::new()
            .respond(Operation::ImproveCode, "```python\nx = 2\n```");
        let prompts = PromptBuilder::new(40_000).expect("prompts");
        let io = Reasoning::new(&reasoner, &prompts, "python");
        let stage = CodeGenStage::new("py", "python");
        let requirements = sample_requirements("req", &["task"]);
        let artifact = CodeArtifact {
            subtask_id: 1,
            source_text: "x = 1".to_string(),
            location: PathBuf::from("module.py"),
        };
        let context = StageContext {
            prior_artifacts: vec!["x = 1".to_string()],
            prior_feedback: vec!["use a constant".to_string()],
        };

        let revised = stage
            .improve(&io, &artifact, &requirements.subtasks[0], &requirements, &context)
            .expect("improve");

        assert_eq!(revised, "x = 2");
        let call = &reasoner.calls_for(Operation::ImproveCode)[0];
        assert!(call.prompt.contains("x = 1"));
        assert!(call.prompt.contains("use a constant"));
        assert_eq!(call.context.as_ref(), Some(&context));
    }

    #[test]
    fn location_follows_description_keywords() {
        let stage = CodeGenStage::new("py", "python");
        assert_eq!(
            stage.location(&SubTask::new(3, "Command line entry point")),
            PathBuf::from("main.py")
        );
    }
}
