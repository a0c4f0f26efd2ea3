//! Scripted collaborators and fixtures for tests.
//!
//! Scripted services answer by [`Operation`] plus an optional prompt needle,
//! so results stay deterministic when stages fan out across threads.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::types::{ArchitectureSpec, ExecutionOutcome, RequirementDoc, SubTask};
use crate::io::config::{CrewConfig, ReasoningConfig};
use crate::io::reasoning::{Operation, Prompt, ReasoningService, StageContext};
use crate::io::sandbox::{SandboxRequest, TestSandbox};
use crate::io::storage::FsArtifactStore;

/// One request observed by [`ScriptedReasoner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub prompt: String,
    pub context: Option<StageContext>,
}

#[derive(Debug)]
struct Rule {
    operation: Operation,
    needle: String,
    /// Consumed front to back; the last response repeats.
    responses: VecDeque<String>,
}

/// Reasoning service returning canned text per operation.
#[derive(Debug)]
pub struct ScriptedReasoner {
    defaults: HashMap<Operation, String>,
    rules: Mutex<Vec<Rule>>,
    failures: HashMap<Operation, String>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl Default for ScriptedReasoner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedReasoner {
    /// Reasoner with a passing default answer for every operation.
    pub fn new() -> Self {
        let defaults = Operation::ALL
            .into_iter()
            .map(|op| (op, default_response(op).to_string()))
            .collect();
        Self {
            defaults,
            rules: Mutex::new(Vec::new()),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Replace the default answer for `operation`.
    pub fn respond(mut self, operation: Operation, text: &str) -> Self {
        self.defaults.insert(operation, text.to_string());
        self
    }

    /// Answer `operation` prompts containing `needle` with `responses` in turn.
    ///
    /// Rules are checked in insertion order before the defaults.
    pub fn respond_when<I, S>(self, operation: Operation, needle: &str, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let responses: VecDeque<String> = responses.into_iter().map(Into::into).collect();
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                operation,
                needle: needle.to_string(),
                responses,
            });
        }
        self
    }

    /// Fail every request for `operation` with `message`.
    pub fn fail_on(mut self, operation: Operation, message: &str) -> Self {
        self.failures.insert(operation, message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn calls_for(&self, operation: Operation) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.operation == operation)
            .collect()
    }

    fn scripted_answer(&self, prompt: &Prompt) -> Option<String> {
        let mut rules = self.rules.lock().ok()?;
        let rule = rules
            .iter_mut()
            .find(|rule| rule.operation == prompt.operation && prompt.text.contains(&rule.needle))?;
        if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        }
    }
}

impl ReasoningService for ScriptedReasoner {
    fn generate(&self, prompt: &Prompt, context: Option<&StageContext>) -> Result<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                operation: prompt.operation,
                prompt: prompt.text.clone(),
                context: context.cloned(),
            });
        }
        if let Some(message) = self.failures.get(&prompt.operation) {
            return Err(anyhow!("{message}"));
        }
        if let Some(answer) = self.scripted_answer(prompt) {
            return Ok(answer);
        }
        self.defaults
            .get(&prompt.operation)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted response for {}", prompt.operation))
    }
}

fn default_response(operation: Operation) -> &'static str {
    match operation {
        Operation::Understand => "The user wants a small working program.",
        Operation::Decompose => "1. Implement the requirement",
        Operation::DocumentRequirements => "# Requirements\n\n- implement the requirement",
        Operation::AnalyzeRequirements => "Single module, no external services.",
        Operation::DesignArchitecture => "One module exposing plain functions.",
        Operation::SelectTechStack => "- python standard library",
        Operation::DefineInterfaces => "def run() -> int",
        Operation::GenerateCode => "```python\ndef run():\n    return 0\n```",
        Operation::ImproveCode => "```python\ndef run():\n    return 0  # improved\n```",
        // No list markers, so this becomes the single moderate fallback issue (score 95).
        Operation::ReviewCode => "Looks good overall.",
        Operation::SuggestImprovements => "No further suggestions.",
        Operation::DesignTestCases => "run() returns 0",
        Operation::GenerateTestCode => {
            "```python\nfrom module import run\n\ndef test_run():\n    assert run() == 0\n```"
        }
    }
}

/// Test sandbox returning scripted outcomes per subtask.
///
/// Each subtask's queue is consumed one run at a time; once empty, runs pass.
#[derive(Debug, Default)]
pub struct ScriptedSandbox {
    outcomes: Mutex<HashMap<u32, VecDeque<ExecutionOutcome>>>,
    requests: Mutex<Vec<SandboxRequest>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one failing run per stderr message for `subtask_id`.
    pub fn fail<I, S>(self, subtask_id: u32, stderrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for stderr in stderrs {
            self.push(
                subtask_id,
                ExecutionOutcome {
                    passed: false,
                    stdout: String::new(),
                    stderr: stderr.into(),
                    exit_code: 1,
                },
            );
        }
        self
    }

    /// Queue a passing run for `subtask_id`.
    pub fn pass(self, subtask_id: u32) -> Self {
        self.push(subtask_id, passing());
        self
    }

    pub fn requests(&self) -> Vec<SandboxRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn push(&self, subtask_id: u32, outcome: ExecutionOutcome) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.entry(subtask_id).or_default().push_back(outcome);
        }
    }
}

impl TestSandbox for ScriptedSandbox {
    fn run(&self, request: &SandboxRequest) -> Result<ExecutionOutcome> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let mut outcomes = self
            .outcomes
            .lock()
            .map_err(|_| anyhow!("sandbox script poisoned"))?;
        Ok(outcomes
            .get_mut(&request.subtask_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(passing))
    }
}

fn passing() -> ExecutionOutcome {
    ExecutionOutcome {
        passed: true,
        stdout: "1 passed".to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}

/// Temporary directory with a workspace and a matching config.
pub struct TestWorkspace {
    _temp: tempfile::TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("workspace");
        Ok(Self { _temp: temp, root })
    }

    /// Workspace directory; created lazily by the first write.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> FsArtifactStore {
        FsArtifactStore::new(&self.root)
    }

    /// Sequential config rooted at this workspace with no credential checks.
    pub fn config(&self) -> CrewConfig {
        CrewConfig {
            workspace_dir: self.root.clone(),
            reasoning: ReasoningConfig {
                required_env: Vec::new(),
                ..ReasoningConfig::default()
            },
            ..CrewConfig::default()
        }
    }

    pub fn read(&self, location: impl AsRef<Path>) -> Option<String> {
        std::fs::read_to_string(self.root.join(location)).ok()
    }
}

/// Requirement document with one subtask per description, ids from 1.
pub fn sample_requirements(raw_input: &str, descriptions: &[&str]) -> RequirementDoc {
    RequirementDoc {
        raw_input: raw_input.to_string(),
        understanding: String::new(),
        subtasks: descriptions
            .iter()
            .zip(1u32..)
            .map(|(description, id)| SubTask::new(id, *description))
            .collect(),
        structured_doc: String::new(),
    }
}

pub fn sample_architecture() -> ArchitectureSpec {
    ArchitectureSpec {
        analysis: "analysis".to_string(),
        architecture_text: "layered".to_string(),
        tech_stack: "stdlib".to_string(),
        module_interfaces: "def run()".to_string(),
    }
}
