//! Shared data model for a workflow run.
//!
//! These types are the contracts passed between stages, the quality gate and
//! the engine. They carry no I/O and serialize to stable JSON.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One unit of work produced by requirement decomposition.
///
/// `id` is 1-based, unique within a run and defines report ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: u32,
    pub description: String,
}

impl SubTask {
    pub fn new(id: u32, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
        }
    }
}

/// Output of the requirement stage. Created once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementDoc {
    pub raw_input: String,
    pub understanding: String,
    pub subtasks: Vec<SubTask>,
    pub structured_doc: String,
}

/// Output of the architecture stage. Created once per run and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchitectureSpec {
    pub analysis: String,
    pub architecture_text: String,
    pub tech_stack: String,
    pub module_interfaces: String,
}

/// Generated source for one subtask.
///
/// `source_text` is replaced in place by the improvement stage; no history is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeArtifact {
    pub subtask_id: u32,
    pub source_text: String,
    /// Workspace-relative path the source is persisted to.
    pub location: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Moderate,
    Severe,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }

    /// Points deducted from a perfect review score per issue of this severity.
    pub fn penalty(self) -> u32 {
        match self {
            Severity::Minor => 2,
            Severity::Moderate => 5,
            Severity::Severe => 10,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub description: String,
}

impl Issue {
    pub fn new(severity: Severity, description: impl Into<String>) -> Self {
        Self {
            severity,
            description: description.into(),
        }
    }
}

/// Review of one artifact. Recomputed in full on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResult {
    pub subtask_id: u32,
    pub issues: Vec<Issue>,
    pub suggestions: String,
    /// Quality score in `0..=100`, derived from `issues`.
    pub score: u32,
}

/// Result of executing a generated test file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub passed: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl ExecutionOutcome {
    /// Failed outcome with no process output (timeouts, spawn failures).
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            passed: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: -1,
        }
    }
}

/// Tests generated and executed for one artifact. Recomputed in full on every pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub subtask_id: u32,
    pub test_code: String,
    pub test_location: PathBuf,
    pub outcome: ExecutionOutcome,
}

/// Lifecycle status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Idle,
    Analyzing,
    Designing,
    Coding,
    Reviewing,
    Testing,
    Completed,
    Error,
}

impl WorkflowStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStatus::Idle => "idle",
            WorkflowStatus::Analyzing => "analyzing",
            WorkflowStatus::Designing => "designing",
            WorkflowStatus::Coding => "coding",
            WorkflowStatus::Reviewing => "reviewing",
            WorkflowStatus::Testing => "testing",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Error => "error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Error)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named pipeline step recorded as `current_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    RequirementAnalysis,
    ArchitectureDesign,
    CodeGeneration,
    CodeReview,
    TestGeneration,
    Iteration,
}

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStep::RequirementAnalysis => "requirement_analysis",
            WorkflowStep::ArchitectureDesign => "architecture_design",
            WorkflowStep::CodeGeneration => "code_generation",
            WorkflowStep::CodeReview => "code_review",
            WorkflowStep::TestGeneration => "test_generation",
            WorkflowStep::Iteration => "iteration",
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&WorkflowStatus::Reviewing).expect("serialize");
        assert_eq!(json, "\"reviewing\"");
    }

    #[test]
    fn step_serializes_snake_case() {
        let json = serde_json::to_string(&WorkflowStep::RequirementAnalysis).expect("serialize");
        assert_eq!(json, "\"requirement_analysis\"");
    }

    #[test]
    fn failed_outcome_uses_sentinel_exit_code() {
        let outcome = ExecutionOutcome::failed("boom");
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.stdout.is_empty());
    }
}
