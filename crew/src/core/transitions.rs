//! Allowed workflow status transitions.
//!
//! Status moves along the fixed pipeline order, may take the improvement
//! back-edge from reviewing/testing to coding, completes from testing, and may
//! fail from any non-terminal state.

use crate::core::types::{WorkflowStatus, WorkflowStep};

impl WorkflowStatus {
    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: WorkflowStatus) -> bool {
        use WorkflowStatus::{
            Analyzing, Coding, Completed, Designing, Error, Idle, Reviewing, Testing,
        };

        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (_, Error)
                | (Idle, Analyzing)
                | (Analyzing, Designing)
                | (Designing, Coding)
                | (Coding, Reviewing)
                | (Reviewing, Testing)
                | (Reviewing | Testing, Coding)
                | (Testing, Completed)
        )
    }
}

impl WorkflowStep {
    /// Status a run holds while this step executes.
    pub fn status(self) -> WorkflowStatus {
        match self {
            WorkflowStep::RequirementAnalysis => WorkflowStatus::Analyzing,
            WorkflowStep::ArchitectureDesign => WorkflowStatus::Designing,
            WorkflowStep::CodeGeneration | WorkflowStep::Iteration => WorkflowStatus::Coding,
            WorkflowStep::CodeReview => WorkflowStatus::Reviewing,
            WorkflowStep::TestGeneration => WorkflowStatus::Testing,
        }
    }
}

/// Validate a transition, describing the violation on failure.
pub fn check_transition(from: WorkflowStatus, to: WorkflowStatus) -> Result<(), String> {
    if from.can_transition_to(to) {
        return Ok(());
    }
    Err(format!("illegal status transition {from} -> {to}"))
}
