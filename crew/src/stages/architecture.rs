//! Architecture design over a finished requirement document.

use anyhow::Result;
use tracing::{info, instrument};

use crate::core::types::{ArchitectureSpec, RequirementDoc};
use crate::io::prompt::PromptVars;
use crate::io::reasoning::{Operation, ReasoningService};

use super::{Reasoning, Stage, subtask_list};

#[derive(Debug, Clone, Copy, Default)]
pub struct ArchitectureStage;

impl ArchitectureStage {
    #[instrument(skip_all, fields(subtasks = requirements.subtasks.len()))]
    pub fn design<R: ReasoningService>(
        &self,
        io: &Reasoning<'_, R>,
        requirements: &RequirementDoc,
    ) -> Result<ArchitectureSpec> {
        let base = PromptVars {
            requirements_doc: Some(requirements.structured_doc.clone()),
            subtasks: Some(subtask_list(&requirements.subtasks)),
            ..io.vars(&requirements.raw_input)
        };

        let analysis = io.ask(
            Stage::Architecture,
            Operation::AnalyzeRequirements,
            &base,
            None,
        )?;
        let architecture_text = io.ask(
            Stage::Architecture,
            Operation::DesignArchitecture,
            &PromptVars {
                analysis: Some(analysis.clone()),
                ..base.clone()
            },
            None,
        )?;
        let with_architecture = PromptVars {
            architecture: Some(architecture_text.clone()),
            ..base
        };
        let tech_stack = io.ask(
            Stage::Architecture,
            Operation::SelectTechStack,
            &with_architecture,
            None,
        )?;
        let module_interfaces = io.ask(
            Stage::Architecture,
            Operation::DefineInterfaces,
            &with_architecture,
            None,
        )?;

        info!("architecture designed");
        Ok(ArchitectureSpec {
            analysis,
            architecture_text,
            tech_stack,
            module_interfaces,
        })
    }
}
