//! Reasoning service abstraction.
//!
//! The [`ReasoningService`] trait is the only outward call stages make for
//! generated content. [`CommandReasoner`] spawns an external command per
//! request; tests use scripted services keyed by [`Operation`] that never
//! spawn processes.

use std::fmt;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ReasoningConfig;
use crate::io::process::run_command_with_timeout;

/// A single capability a stage can request from the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Understand,
    Decompose,
    DocumentRequirements,
    AnalyzeRequirements,
    DesignArchitecture,
    SelectTechStack,
    DefineInterfaces,
    GenerateCode,
    ImproveCode,
    ReviewCode,
    SuggestImprovements,
    DesignTestCases,
    GenerateTestCode,
}

impl Operation {
    pub const ALL: [Operation; 13] = [
        Operation::Understand,
        Operation::Decompose,
        Operation::DocumentRequirements,
        Operation::AnalyzeRequirements,
        Operation::DesignArchitecture,
        Operation::SelectTechStack,
        Operation::DefineInterfaces,
        Operation::GenerateCode,
        Operation::ImproveCode,
        Operation::ReviewCode,
        Operation::SuggestImprovements,
        Operation::DesignTestCases,
        Operation::GenerateTestCode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Understand => "understand",
            Operation::Decompose => "decompose",
            Operation::DocumentRequirements => "document_requirements",
            Operation::AnalyzeRequirements => "analyze_requirements",
            Operation::DesignArchitecture => "design_architecture",
            Operation::SelectTechStack => "select_tech_stack",
            Operation::DefineInterfaces => "define_interfaces",
            Operation::GenerateCode => "generate_code",
            Operation::ImproveCode => "improve_code",
            Operation::ReviewCode => "review_code",
            Operation::SuggestImprovements => "suggest_improvements",
            Operation::DesignTestCases => "design_test_cases",
            Operation::GenerateTestCode => "generate_test_code",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rendered request for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub operation: Operation,
    pub text: String,
}

/// Immutable context threaded explicitly into a stage call.
///
/// Built fresh for every request; nothing accumulates across calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageContext {
    pub prior_artifacts: Vec<String>,
    pub prior_feedback: Vec<String>,
}

/// Source of generated text.
///
/// Output is non-deterministic and has no format guarantees. Callers wrap no
/// retry logic around it; an error fails the calling stage.
pub trait ReasoningService: Send + Sync {
    fn generate(&self, prompt: &Prompt, context: Option<&StageContext>) -> Result<String>;
}

/// Reasoning service backed by an external command.
///
/// The prompt text is written to the command's stdin and its stdout is the
/// answer. The operation name is exported as `CREW_OPERATION`. Stage context
/// is already rendered into the prompt text by the stages.
#[derive(Debug, Clone)]
pub struct CommandReasoner {
    config: ReasoningConfig,
}

impl CommandReasoner {
    pub fn new(config: ReasoningConfig) -> Self {
        Self { config }
    }
}

impl ReasoningService for CommandReasoner {
    #[instrument(skip_all, fields(operation = %prompt.operation, prompt_bytes = prompt.text.len()))]
    fn generate(&self, prompt: &Prompt, context: Option<&StageContext>) -> Result<String> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or_else(|| anyhow!("reasoning command is empty"))?;
        debug!(
            prior_artifacts = context.map_or(0, |c| c.prior_artifacts.len()),
            prior_feedback = context.map_or(0, |c| c.prior_feedback.len()),
            "invoking reasoning command"
        );

        let mut cmd = Command::new(program);
        cmd.args(args).env("CREW_OPERATION", prompt.operation.as_str());

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.text.as_bytes()),
            Duration::from_secs(self.config.timeout_secs),
            self.config.output_limit_bytes,
        )
        .with_context(|| format!("run reasoning command {program}"))?;

        if output.timed_out {
            warn!(timeout_secs = self.config.timeout_secs, "reasoning command timed out");
            return Err(anyhow!(
                "reasoning command timed out after {}s",
                self.config.timeout_secs
            ));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "reasoning command exited with {}: {}",
                output.exit_code(),
                output.stderr_lossy("reasoning").trim()
            ));
        }

        let text = output.stdout_lossy();
        info!(response_bytes = text.len(), "reasoning command finished");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_names_are_unique_snake_case() {
        let mut names: Vec<&str> = Operation::ALL.iter().map(|op| op.as_str()).collect();
        for name in &names {
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
        }
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Operation::ALL.len());
    }

    #[test]
    fn operation_serde_matches_as_str() {
        for op in Operation::ALL {
            let json = serde_json::to_string(&op).expect("serialize");
            assert_eq!(json, format!("\"{}\"", op.as_str()));
        }
    }

    #[cfg(unix)]
    mod command {
        use super::*;

        fn reasoner(script: &str) -> CommandReasoner {
            CommandReasoner::new(ReasoningConfig {
                command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
                timeout_secs: 10,
                output_limit_bytes: 4096,
                required_env: Vec::new(),
            })
        }

        fn prompt(text: &str) -> Prompt {
            Prompt {
                operation: Operation::GenerateCode,
                text: text.to_string(),
            }
        }

        #[test]
        fn answers_with_stdout() {
            let out = reasoner("printf \"$CREW_OPERATION:\"; cat")
                .generate(&prompt("write code"), None)
                .expect("generate");
            assert_eq!(out, "generate_code:write code");
        }

        #[test]
        fn non_zero_exit_is_error() {
            let err = reasoner("echo quota exceeded >&2; exit 7")
                .generate(&prompt("x"), None)
                .unwrap_err();
            let msg = format!("{err:#}");
            assert!(msg.contains("exited with 7"), "{msg}");
            assert!(msg.contains("quota exceeded"), "{msg}");
        }

        #[test]
        fn missing_program_is_error() {
            let reasoner = CommandReasoner::new(ReasoningConfig {
                command: vec!["crew-missing-reasoner-binary".to_string()],
                ..ReasoningConfig::default()
            });
            assert!(reasoner.generate(&prompt("x"), None).is_err());
        }
    }
}
