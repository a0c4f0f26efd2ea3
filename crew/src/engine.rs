//! Workflow engine: the fixed stage pipeline plus the bounded improvement loop.
//!
//! A run is strictly sequential between stages. Per-subtask work inside a
//! stage may fan out across scoped threads, but results are always merged back
//! in subtask order and code artifacts are persisted by a single writer.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use tracing::{error, info, instrument, warn};

use crate::core::gate::{failing_subtasks, needs_iteration};
use crate::core::naming::location_collisions;
use crate::core::report::{FinalReport, build_report, render_markdown};
use crate::core::transitions::check_transition;
use crate::core::types::{
    ArchitectureSpec, CodeArtifact, RequirementDoc, ReviewResult, TestResult, WorkflowStatus,
    WorkflowStep,
};
use crate::io::config::CrewConfig;
use crate::io::prompt::PromptBuilder;
use crate::io::reasoning::ReasoningService;
use crate::io::sandbox::TestSandbox;
use crate::io::snapshot::{StateSnapshot, write_report, write_snapshot};
use crate::io::storage::ArtifactStore;
use crate::stages::architecture::ArchitectureStage;
use crate::stages::codegen::CodeGenStage;
use crate::stages::improvement::ImprovementStage;
use crate::stages::requirement::RequirementStage;
use crate::stages::review::ReviewStage;
use crate::stages::test::TestStage;
use crate::stages::{Reasoning, fan_out, subtask_for};

/// A step of the run failed; the underlying cause is the error's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFailure {
    pub step: WorkflowStep,
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed", self.step)
    }
}

/// The run was cancelled before `step` started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled {
    pub step: WorkflowStep,
}

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "workflow cancelled before {}", self.step)
    }
}

impl std::error::Error for Cancelled {}

/// Cooperative cancellation flag, checked between steps.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications delivered to [`WorkflowEngine::run_with`] callers.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkflowEvent {
    StepStarted {
        step: WorkflowStep,
        iteration: u32,
    },
    RequirementsReady {
        subtask_count: usize,
    },
    ArtifactWritten {
        subtask_id: u32,
        location: PathBuf,
        iteration: u32,
    },
    ReviewFinished {
        subtask_id: u32,
        score: u32,
    },
    TestFinished {
        subtask_id: u32,
        passed: bool,
    },
    GateEvaluated {
        iteration: u32,
        failing: Vec<u32>,
    },
    IterationStarted {
        iteration: u32,
    },
}

/// Mutable state of a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowState {
    pub status: WorkflowStatus,
    pub current_step: Option<WorkflowStep>,
    pub iteration_count: u32,
    pub artifacts: Vec<CodeArtifact>,
    pub reviews: Vec<ReviewResult>,
    pub tests: Vec<TestResult>,
}

impl WorkflowState {
    /// Move to `status`, rejecting transitions outside the pipeline order.
    pub fn transition(&mut self, status: WorkflowStatus) -> Result<()> {
        check_transition(self.status, status).map_err(|msg| anyhow!(msg))?;
        self.status = status;
        Ok(())
    }

    fn enter(&mut self, step: WorkflowStep) -> Result<()> {
        self.transition(step.status())?;
        self.current_step = Some(step);
        Ok(())
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot::now(
            self.status,
            self.current_step,
            self.iteration_count,
            self.artifacts.len(),
        )
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub requirements: RequirementDoc,
    pub architecture: ArchitectureSpec,
    pub state: WorkflowState,
    pub report: FinalReport,
}

impl WorkflowResult {
    pub fn iterations(&self) -> u32 {
        self.state.iteration_count
    }
}

/// Coordinates the stages for one configuration and set of collaborators.
pub struct WorkflowEngine<'a, R, S: ?Sized, T: ?Sized> {
    config: &'a CrewConfig,
    reasoner: &'a R,
    store: &'a S,
    sandbox: &'a T,
    prompts: PromptBuilder,
    codegen: CodeGenStage,
    tester: TestStage,
    cancellation: Cancellation,
}

impl<'a, R, S, T> WorkflowEngine<'a, R, S, T>
where
    R: ReasoningService,
    S: ArtifactStore + ?Sized,
    T: TestSandbox + ?Sized,
{
    pub fn new(
        config: &'a CrewConfig,
        reasoner: &'a R,
        store: &'a S,
        sandbox: &'a T,
    ) -> Result<Self> {
        Ok(Self {
            config,
            reasoner,
            store,
            sandbox,
            prompts: PromptBuilder::new(config.prompt_budget_bytes)?,
            codegen: CodeGenStage::new(&config.source_extension, &config.code_fence_language),
            tester: TestStage::new(&config.source_extension, &config.code_fence_language),
            cancellation: Cancellation::new(),
        })
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Run the full workflow on `user_input`.
    pub fn run(&self, user_input: &str, max_iterations: u32) -> Result<WorkflowResult> {
        self.run_with(user_input, max_iterations, |_| {})
    }

    /// Run the full workflow, reporting progress to `on_event`.
    ///
    /// Any failure aborts the run with status `error`; files already written
    /// stay in the workspace and a snapshot of the failed state is saved.
    #[instrument(
        skip_all,
        fields(max_iterations = max_iterations, parallel = self.config.parallel_subtasks)
    )]
    pub fn run_with<F: FnMut(&WorkflowEvent)>(
        &self,
        user_input: &str,
        max_iterations: u32,
        mut on_event: F,
    ) -> Result<WorkflowResult> {
        let mut state = WorkflowState::default();
        match self.drive(user_input, max_iterations, &mut state, &mut on_event) {
            Ok(result) => Ok(result),
            Err(err) => {
                error!(err = %format!("{err:#}"), step = ?state.current_step, "workflow failed");
                if state.transition(WorkflowStatus::Error).is_err() {
                    state.status = WorkflowStatus::Error;
                }
                if let Err(snapshot_err) =
                    write_snapshot(&self.config.snapshot_path(), &state.snapshot())
                {
                    warn!(err = %format!("{snapshot_err:#}"), "failed to write error snapshot");
                }
                Err(err)
            }
        }
    }

    fn drive<F: FnMut(&WorkflowEvent)>(
        &self,
        user_input: &str,
        max_iterations: u32,
        state: &mut WorkflowState,
        on_event: &mut F,
    ) -> Result<WorkflowResult> {
        let io = Reasoning::new(self.reasoner, &self.prompts, &self.config.code_fence_language);

        self.enter(state, WorkflowStep::RequirementAnalysis, on_event)?;
        let requirements = RequirementStage
            .analyze(&io, user_input)
            .context(StageFailure {
                step: WorkflowStep::RequirementAnalysis,
            })?;
        on_event(&WorkflowEvent::RequirementsReady {
            subtask_count: requirements.subtasks.len(),
        });

        self.enter(state, WorkflowStep::ArchitectureDesign, on_event)?;
        let architecture = ArchitectureStage
            .design(&io, &requirements)
            .context(StageFailure {
                step: WorkflowStep::ArchitectureDesign,
            })?;

        self.enter(state, WorkflowStep::CodeGeneration, on_event)?;
        self.generate_artifacts(&io, &requirements, &architecture, state, on_event)
            .context(StageFailure {
                step: WorkflowStep::CodeGeneration,
            })?;

        self.review_and_test(&io, &requirements, state, on_event)?;

        while state.iteration_count < max_iterations {
            let failing = failing_subtasks(&state.reviews, &state.tests);
            let again = needs_iteration(&state.reviews, &state.tests);
            on_event(&WorkflowEvent::GateEvaluated {
                iteration: state.iteration_count,
                failing,
            });
            if !again {
                break;
            }

            state.iteration_count += 1;
            self.enter(state, WorkflowStep::Iteration, on_event)?;
            on_event(&WorkflowEvent::IterationStarted {
                iteration: state.iteration_count,
            });
            info!(iteration = state.iteration_count, "improvement iteration");

            let improved = ImprovementStage::new(&self.codegen, self.config.parallel_subtasks)
                .improve(
                    &io,
                    self.store,
                    &requirements,
                    &mut state.artifacts,
                    &state.reviews,
                    &state.tests,
                )
                .context(StageFailure {
                    step: WorkflowStep::Iteration,
                })?;
            for artifact in state
                .artifacts
                .iter()
                .filter(|a| improved.contains(&a.subtask_id))
            {
                on_event(&WorkflowEvent::ArtifactWritten {
                    subtask_id: artifact.subtask_id,
                    location: artifact.location.clone(),
                    iteration: state.iteration_count,
                });
            }

            self.review_and_test(&io, &requirements, state, on_event)?;
        }

        state.transition(WorkflowStatus::Completed)?;
        let report = build_report(
            state.status,
            state.iteration_count,
            &state.artifacts,
            &state.reviews,
            &state.tests,
        );
        write_report(
            &self.config.report_path(),
            &render_markdown(&report, &requirements, &architecture),
        )?;
        write_snapshot(&self.config.snapshot_path(), &state.snapshot())?;
        info!(
            iterations = report.iterations,
            passed = report.passed_count,
            artifacts = report.artifact_count,
            "workflow completed"
        );

        Ok(WorkflowResult {
            requirements,
            architecture,
            state: state.clone(),
            report,
        })
    }

    fn enter<F: FnMut(&WorkflowEvent)>(
        &self,
        state: &mut WorkflowState,
        step: WorkflowStep,
        on_event: &mut F,
    ) -> Result<()> {
        if self.cancellation.is_cancelled() {
            return Err(Cancelled { step }.into());
        }
        state.enter(step)?;
        on_event(&WorkflowEvent::StepStarted {
            step,
            iteration: state.iteration_count,
        });
        Ok(())
    }

    /// Generate one artifact per subtask and persist them in subtask order.
    fn generate_artifacts<F: FnMut(&WorkflowEvent)>(
        &self,
        io: &Reasoning<'_, R>,
        requirements: &RequirementDoc,
        architecture: &ArchitectureSpec,
        state: &mut WorkflowState,
        on_event: &mut F,
    ) -> Result<()> {
        let locations: Vec<(u32, PathBuf)> = requirements
            .subtasks
            .iter()
            .map(|task| (task.id, self.codegen.location(task)))
            .collect();
        for (location, ids) in
            location_collisions(locations.iter().map(|(id, path)| (*id, path.as_path())))
        {
            warn!(
                location = %location.display(),
                subtasks = ?ids,
                "subtasks share an artifact location; later writes replace earlier ones"
            );
        }

        let sources = fan_out(
            self.config.parallel_subtasks,
            &requirements.subtasks,
            |task| {
                self.codegen
                    .generate_source(io, task, requirements, architecture)
            },
        )?;

        for ((subtask_id, location), source_text) in locations.into_iter().zip(sources) {
            self.store.write(&location, &source_text)?;
            on_event(&WorkflowEvent::ArtifactWritten {
                subtask_id,
                location: location.clone(),
                iteration: state.iteration_count,
            });
            state.artifacts.push(CodeArtifact {
                subtask_id,
                source_text,
                location,
            });
        }
        Ok(())
    }

    /// Review then test the whole artifact set, replacing the previous pass.
    fn review_and_test<F: FnMut(&WorkflowEvent)>(
        &self,
        io: &Reasoning<'_, R>,
        requirements: &RequirementDoc,
        state: &mut WorkflowState,
        on_event: &mut F,
    ) -> Result<()> {
        let parallel = self.config.parallel_subtasks;

        self.enter(state, WorkflowStep::CodeReview, on_event)?;
        let reviews = fan_out(parallel, &state.artifacts, |artifact| {
            let subtask = subtask_for(&requirements.subtasks, artifact.subtask_id)?;
            ReviewStage.review(io, artifact, subtask, requirements)
        })
        .context(StageFailure {
            step: WorkflowStep::CodeReview,
        })?;
        for review in &reviews {
            on_event(&WorkflowEvent::ReviewFinished {
                subtask_id: review.subtask_id,
                score: review.score,
            });
        }
        state.reviews = reviews;

        self.enter(state, WorkflowStep::TestGeneration, on_event)?;
        let tests = fan_out(parallel, &state.artifacts, |artifact| {
            let subtask = subtask_for(&requirements.subtasks, artifact.subtask_id)?;
            self.tester.run(
                io,
                self.store,
                self.sandbox,
                artifact,
                subtask,
                &requirements.raw_input,
            )
        })
        .context(StageFailure {
            step: WorkflowStep::TestGeneration,
        })?;
        for test in &tests {
            on_event(&WorkflowEvent::TestFinished {
                subtask_id: test.subtask_id,
                passed: test.outcome.passed,
            });
        }
        state.tests = tests;
        Ok(())
    }
}
