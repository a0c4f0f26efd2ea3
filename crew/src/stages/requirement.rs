//! Requirement analysis: understanding, decomposition, and documentation.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::parse::decompose;
use crate::core::types::RequirementDoc;
use crate::io::prompt::PromptVars;
use crate::io::reasoning::{Operation, ReasoningService};

use super::{Reasoning, Stage, subtask_list};

#[derive(Debug, Clone, Copy, Default)]
pub struct RequirementStage;

impl RequirementStage {
    /// Turn raw user input into a [`RequirementDoc`].
    ///
    /// Always yields at least one subtask: unparseable decompositions fall
    /// back to the whole input.
    #[instrument(skip_all, fields(input_bytes = user_input.len()))]
    pub fn analyze<R: ReasoningService>(
        &self,
        io: &Reasoning<'_, R>,
        user_input: &str,
    ) -> Result<RequirementDoc> {
        let base = io.vars(user_input);

        let understanding = io.ask(Stage::Requirement, Operation::Understand, &base, None)?;

        let decomposition = io.ask(
            Stage::Requirement,
            Operation::Decompose,
            &PromptVars {
                understanding: Some(understanding.clone()),
                ..base.clone()
            },
            None,
        )?;
        let subtasks = decompose(&decomposition, user_input);

        let structured_doc = io.ask(
            Stage::Requirement,
            Operation::DocumentRequirements,
            &PromptVars {
                understanding: Some(understanding.clone()),
                subtasks: Some(subtask_list(&subtasks)),
                ..base
            },
            None,
        )?;

        info!(subtasks = subtasks.len(), "requirements analyzed");
        Ok(RequirementDoc {
            raw_input: user_input.to_string(),
            understanding,
            subtasks,
            structured_doc,
        })
    }
}
