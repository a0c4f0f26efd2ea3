//! `crew` command line entry point.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crew::engine::{WorkflowEngine, WorkflowEvent};
use crew::exit_codes;
use crew::interactive::{EXAMPLE_REQUIREMENTS, run_session, summary};
use crew::io::config::{
    ConfigurationError, CrewConfig, DEFAULT_CONFIG_FILE, check_credentials, load_config,
};
use crew::io::reasoning::CommandReasoner;
use crew::io::sandbox::CommandSandbox;
use crew::io::snapshot::{StateSnapshot, load_snapshot};
use crew::io::storage::FsArtifactStore;
use crew::logging;

#[derive(Parser)]
#[command(
    name = "crew",
    version,
    about = "Self-correcting multi-stage code generation workflow"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workflow once on a requirement.
    Run {
        /// Requirement text.
        requirement: String,
        #[command(flatten)]
        options: RunOptions,
    },
    /// Read requirements interactively until `quit`.
    Interactive {
        #[command(flatten)]
        options: RunOptions,
    },
    /// List the built-in example requirements.
    Examples,
    /// Show the state snapshot left by the last run in the workspace.
    Status {
        /// Config file (defaults to `crew.toml` if present).
        #[arg(long)]
        config: Option<PathBuf>,
        /// Workspace to inspect; overrides `workspace_dir`.
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct RunOptions {
    /// Config file (defaults to `crew.toml` if present).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory for generated files; overrides `workspace_dir`.
    #[arg(long)]
    workspace: Option<PathBuf>,
    /// Improvement rounds after the first pass; overrides `max_iterations`.
    #[arg(long)]
    max_iterations: Option<u32>,
    /// Fan per-subtask work out across threads.
    #[arg(long)]
    parallel: bool,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            requirement,
            options,
        } => cmd_run(&requirement, &options),
        Command::Interactive { options } => cmd_interactive(&options),
        Command::Examples => {
            for (i, requirement) in EXAMPLE_REQUIREMENTS.iter().enumerate() {
                println!("{}. {requirement}", i + 1);
            }
            Ok(())
        }
        Command::Status { config, workspace } => cmd_status(&RunOptions {
            config,
            workspace,
            ..RunOptions::default()
        }),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<ConfigurationError>().is_some() {
        exit_codes::CONFIG
    } else {
        exit_codes::FAILED
    }
}

/// Load config, apply CLI overrides, and verify credentials.
fn resolve_config(options: &RunOptions) -> Result<CrewConfig> {
    let config = load_with_overrides(options)?;
    check_credentials(&config.reasoning)?;
    Ok(config)
}

fn load_with_overrides(options: &RunOptions) -> Result<CrewConfig> {
    let path = options
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let mut config = load_config(&path)?;
    apply_overrides(&mut config, options);
    Ok(config)
}

fn apply_overrides(config: &mut CrewConfig, options: &RunOptions) {
    if let Some(workspace) = &options.workspace {
        config.workspace_dir = workspace.clone();
    }
    if let Some(max_iterations) = options.max_iterations {
        config.max_iterations = max_iterations;
    }
    if options.parallel {
        config.parallel_subtasks = true;
    }
}

fn cmd_run(requirement: &str, options: &RunOptions) -> Result<()> {
    let config = resolve_config(options)?;
    let text = execute(&config, requirement)?;
    println!("{text}");
    Ok(())
}

fn cmd_interactive(options: &RunOptions) -> Result<()> {
    let config = resolve_config(options)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    run_session(stdin.lock(), &mut stdout, |requirement| {
        execute(&config, requirement)
    })
}

fn cmd_status(options: &RunOptions) -> Result<()> {
    let config = load_with_overrides(options)?;
    let snapshot = load_snapshot(&config.snapshot_path())?;
    println!("{}", describe_snapshot(&snapshot));
    Ok(())
}

fn describe_snapshot(snapshot: &StateSnapshot) -> String {
    let step = snapshot
        .current_step
        .map_or_else(|| "-".to_string(), |step| step.to_string());
    format!(
        "status: {}\nstep: {step}\niterations: {}\nartifacts: {}\nupdated: {}",
        snapshot.status, snapshot.iteration_count, snapshot.artifact_count, snapshot.timestamp
    )
}

fn execute(config: &CrewConfig, requirement: &str) -> Result<String> {
    let reasoner = CommandReasoner::new(config.reasoning.clone());
    let store = FsArtifactStore::new(&config.workspace_dir);
    let sandbox = CommandSandbox::new(config.sandbox.clone());
    let engine = WorkflowEngine::new(config, &reasoner, &store, &sandbox)?;

    let result = engine.run_with(requirement, config.max_iterations, print_event)?;
    Ok(format!(
        "{}\nreport: {}",
        summary(&result),
        config.report_path().display()
    ))
}

fn print_event(event: &WorkflowEvent) {
    let line = match event {
        WorkflowEvent::StepStarted { step, .. } => format!("==> {step}"),
        WorkflowEvent::RequirementsReady { subtask_count } => {
            format!("    {subtask_count} subtask(s)")
        }
        WorkflowEvent::ArtifactWritten {
            subtask_id,
            location,
            ..
        } => format!("    wrote {} (subtask {subtask_id})", location.display()),
        WorkflowEvent::ReviewFinished { subtask_id, score } => {
            format!("    review subtask {subtask_id}: {score}/100")
        }
        WorkflowEvent::TestFinished { subtask_id, passed } => {
            let verdict = if *passed { "passed" } else { "failed" };
            format!("    tests subtask {subtask_id}: {verdict}")
        }
        WorkflowEvent::GateEvaluated { failing, .. } if failing.is_empty() => {
            "    quality gate passed".to_string()
        }
        WorkflowEvent::GateEvaluated { failing, .. } => {
            format!("    quality gate failed for subtask(s) {failing:?}")
        }
        WorkflowEvent::IterationStarted { iteration } => format!("--- iteration {iteration}"),
    };
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_overrides() {
        let cli = Cli::parse_from([
            "crew",
            "run",
            "build a calculator",
            "--max-iterations",
            "5",
            "--workspace",
            "out",
            "--parallel",
        ]);
        let Command::Run {
            requirement,
            options,
        } = cli.command
        else {
            panic!("expected run command");
        };
        assert_eq!(requirement, "build a calculator");
        assert_eq!(options.max_iterations, Some(5));
        assert_eq!(options.workspace, Some(PathBuf::from("out")));
        assert!(options.parallel);
        assert_eq!(options.config, None);
    }

    #[test]
    fn parse_interactive_and_examples() {
        let cli = Cli::parse_from(["crew", "interactive", "--config", "alt.toml"]);
        assert!(matches!(cli.command, Command::Interactive { .. }));
        let cli = Cli::parse_from(["crew", "examples"]);
        assert!(matches!(cli.command, Command::Examples));
    }

    #[test]
    fn overrides_replace_config_values() {
        let mut config = CrewConfig::default();
        apply_overrides(
            &mut config,
            &RunOptions {
                workspace: Some(PathBuf::from("elsewhere")),
                max_iterations: Some(0),
                parallel: true,
                config: None,
            },
        );
        assert_eq!(config.workspace_dir, PathBuf::from("elsewhere"));
        assert_eq!(config.max_iterations, 0);
        assert!(config.parallel_subtasks);
    }

    #[test]
    fn parse_status_with_workspace() {
        let cli = Cli::parse_from(["crew", "status", "--workspace", "out"]);
        let Command::Status { config, workspace } = cli.command else {
            panic!("expected status command");
        };
        assert_eq!(workspace, Some(PathBuf::from("out")));
        assert_eq!(config, None);
    }

    #[test]
    fn snapshot_description_lists_fields() {
        let snapshot = StateSnapshot {
            status: crew::core::types::WorkflowStatus::Error,
            current_step: Some(crew::core::types::WorkflowStep::Iteration),
            iteration_count: 1,
            artifact_count: 2,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        assert_eq!(
            describe_snapshot(&snapshot),
            "status: error\nstep: iteration\niterations: 1\nartifacts: 2\nupdated: 2026-01-01T00:00:00Z"
        );
    }

    #[test]
    fn configuration_errors_map_to_config_exit_code() {
        let err: anyhow::Error = ConfigurationError {
            message: "missing OPENAI_API_KEY".to_string(),
        }
        .into();
        assert_eq!(exit_code_for(&err), exit_codes::CONFIG);
        assert_eq!(
            exit_code_for(&anyhow::anyhow!("reasoning failed")),
            exit_codes::FAILED
        );
    }
}
