//! Test execution sandbox.
//!
//! Running generated tests never fails the workflow: timeouts and spawn
//! errors come back as failed [`ExecutionOutcome`]s.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::ExecutionOutcome;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

/// Stderr recorded when a test run exceeds its time limit.
pub const TIMEOUT_MESSAGE: &str = "test execution timed out";

/// Parameters for one test execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRequest {
    pub subtask_id: u32,
    /// Test file handed to the runner.
    pub test_file: PathBuf,
    /// Working directory for the runner, normally the workspace root.
    pub workdir: PathBuf,
}

/// Executes a generated test file and reports the outcome.
pub trait TestSandbox: Send + Sync {
    fn run(&self, request: &SandboxRequest) -> Result<ExecutionOutcome>;
}

/// Sandbox that spawns the configured test runner (default `pytest -v <file>`).
#[derive(Debug, Clone)]
pub struct CommandSandbox {
    config: SandboxConfig,
}

impl CommandSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

impl TestSandbox for CommandSandbox {
    #[instrument(
        skip_all,
        fields(subtask_id = request.subtask_id, test_file = %request.test_file.display())
    )]
    fn run(&self, request: &SandboxRequest) -> Result<ExecutionOutcome> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Ok(ExecutionOutcome::failed("test command is empty"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&request.test_file)
            .current_dir(&request.workdir);

        let output = match run_command_with_timeout(
            cmd,
            None,
            Duration::from_secs(self.config.timeout_secs),
            self.config.output_limit_bytes,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %format!("{err:#}"), "test runner failed to start");
                return Ok(ExecutionOutcome::failed(format!("{err:#}")));
            }
        };

        if output.timed_out {
            return Ok(ExecutionOutcome {
                passed: false,
                stdout: output.stdout_lossy(),
                stderr: TIMEOUT_MESSAGE.to_string(),
                exit_code: -1,
            });
        }

        let outcome = ExecutionOutcome {
            passed: output.status.success(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy("test"),
            exit_code: output.exit_code(),
        };
        info!(passed = outcome.passed, exit_code = outcome.exit_code, "tests finished");
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sandbox(script: &str, timeout_secs: u64) -> CommandSandbox {
        // `sh -c SCRIPT FILE` exposes the test file as `$0`.
        CommandSandbox::new(SandboxConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            timeout_secs,
            output_limit_bytes: 4096,
        })
    }

    fn request(dir: &std::path::Path) -> SandboxRequest {
        SandboxRequest {
            subtask_id: 1,
            test_file: PathBuf::from("test_module_1.py"),
            workdir: dir.to_path_buf(),
        }
    }

    #[test]
    fn zero_exit_passes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox("echo ran $0", 10).run(&request(temp.path())).expect("run");
        assert!(outcome.passed);
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.stdout, "ran test_module_1.py\n");
    }

    #[test]
    fn non_zero_exit_fails_with_stderr() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox("echo 1 failed >&2; exit 1", 10)
            .run(&request(temp.path()))
            .expect("run");
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, 1);
        assert_eq!(outcome.stderr, "1 failed\n");
    }

    #[test]
    fn timeout_is_failed_outcome() {
        let temp = tempfile::tempdir().expect("tempdir");
        let outcome = sandbox("exec sleep 5", 1).run(&request(temp.path())).expect("run");
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, -1);
        assert_eq!(outcome.stderr, TIMEOUT_MESSAGE);
    }

    #[test]
    fn spawn_failure_is_failed_outcome() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = CommandSandbox::new(SandboxConfig {
            command: vec!["crew-missing-test-runner".to_string()],
            ..SandboxConfig::default()
        });
        let outcome = sandbox.run(&request(temp.path())).expect("run");
        assert!(!outcome.passed);
        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.stderr.contains("spawn command"));
    }
}
