//! Pipeline stages and their fixed operation tables.
//!
//! Each stage may only request the operations listed in [`Stage::operations`];
//! [`Reasoning::ask`] rejects anything else before a prompt is rendered.

use std::fmt;
use std::thread;

use anyhow::{Result, anyhow, ensure};
use tracing::debug;

use crate::core::types::SubTask;
use crate::io::prompt::{PromptBuilder, PromptVars};
use crate::io::reasoning::{Operation, ReasoningService, StageContext};

pub mod architecture;
pub mod codegen;
pub mod improvement;
pub mod requirement;
pub mod review;

/// Stages that talk to the reasoning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Requirement,
    Architecture,
    CodeGen,
    Review,
    Test,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Requirement,
        Stage::Architecture,
        Stage::CodeGen,
        Stage::Review,
        Stage::Test,
    ];

    /// The statically known capability set of this stage.
    pub fn operations(self) -> &'static [Operation] {
        match self {
            Stage::Requirement => &[
                Operation::Understand,
                Operation::Decompose,
                Operation::DocumentRequirements,
            ],
            Stage::Architecture => &[
                Operation::AnalyzeRequirements,
                Operation::DesignArchitecture,
                Operation::SelectTechStack,
                Operation::DefineInterfaces,
            ],
            Stage::CodeGen => &[Operation::GenerateCode, Operation::ImproveCode],
            Stage::Review => &[Operation::ReviewCode, Operation::SuggestImprovements],
            Stage::Test => &[Operation::DesignTestCases, Operation::GenerateTestCode],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Requirement => "requirement",
            Stage::Architecture => "architecture",
            Stage::CodeGen => "codegen",
            Stage::Review => "review",
            Stage::Test => "test",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasoning service plus prompt rendering, shared by every stage of a run.
pub struct Reasoning<'a, R> {
    service: &'a R,
    prompts: &'a PromptBuilder,
    language: &'a str,
}

impl<'a, R: ReasoningService> Reasoning<'a, R> {
    pub fn new(service: &'a R, prompts: &'a PromptBuilder, language: &'a str) -> Self {
        Self {
            service,
            prompts,
            language,
        }
    }

    /// Base template values for a run on `requirement`.
    pub fn vars(&self, requirement: &str) -> PromptVars {
        PromptVars {
            requirement: requirement.to_string(),
            language: self.language.to_string(),
            ..PromptVars::default()
        }
    }

    /// Render and send one request on behalf of `stage`.
    pub fn ask(
        &self,
        stage: Stage,
        operation: Operation,
        vars: &PromptVars,
        context: Option<&StageContext>,
    ) -> Result<String> {
        ensure!(
            stage.operations().contains(&operation),
            "{stage} stage does not support operation {operation}"
        );
        let prompt = self.prompts.build(operation, vars)?;
        debug!(%stage, %operation, prompt_bytes = prompt.text.len(), "requesting generation");
        self.service.generate(&prompt, context)
    }
}

/// Look up the subtask an artifact was generated for.
pub fn subtask_for(subtasks: &[SubTask], subtask_id: u32) -> Result<&SubTask> {
    subtasks
        .iter()
        .find(|task| task.id == subtask_id)
        .ok_or_else(|| anyhow!("no subtask with id {subtask_id}"))
}

/// Numbered list of subtasks for prompt templates.
pub fn subtask_list(subtasks: &[SubTask]) -> String {
    subtasks
        .iter()
        .map(|task| format!("{}. {}", task.id, task.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Apply `work` to every item, on scoped threads when `parallel` is set.
///
/// Results keep the order of `items` regardless of completion order. The
/// first error in item order is returned.
pub fn fan_out<T, U, F>(parallel: bool, items: &[T], work: F) -> Result<Vec<U>>
where
    T: Sync,
    U: Send,
    F: Fn(&T) -> Result<U> + Sync,
{
    if !parallel || items.len() < 2 {
        return items.iter().map(&work).collect();
    }
    let work = &work;
    thread::scope(|scope| {
        let handles: Vec<_> = items
            .iter()
            .map(|item| scope.spawn(move || work(item)))
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow!("stage worker thread panicked"))?
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn every_operation_belongs_to_exactly_one_stage() {
        let mut seen = HashSet::new();
        for stage in Stage::ALL {
            for op in stage.operations() {
                assert!(seen.insert(*op), "{op} listed twice");
            }
        }
        assert_eq!(seen.len(), Operation::ALL.len());
    }

    #[test]
    fn fan_out_preserves_item_order() {
        let items: Vec<u64> = (1..=6).collect();
        let out = fan_out(true, &items, |n| {
            // Later items finish first.
            thread::sleep(Duration::from_millis(60 - n * 10));
            Ok(n * 10)
        })
        .expect("fan out");
        assert_eq!(out, vec![10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn fan_out_reports_first_error_in_item_order() {
        let items = [1, 2, 3];
        let err = fan_out(true, &items, |n| {
            if *n >= 2 {
                Err(anyhow!("item {n} failed"))
            } else {
                Ok(*n)
            }
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "item 2 failed");
    }

    #[test]
    fn subtask_list_is_numbered_by_id() {
        let tasks = vec![SubTask::new(1, "parse"), SubTask::new(2, "print")];
        assert_eq!(subtask_list(&tasks), "1. parse\n2. print");
        assert_eq!(subtask_for(&tasks, 2).expect("found").description, "print");
        assert!(subtask_for(&tasks, 9).is_err());
    }
}
