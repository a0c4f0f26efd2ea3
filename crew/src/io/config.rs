//! Crew configuration loaded from `crew.toml`.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "crew.toml";

/// Crew configuration (TOML).
///
/// Missing fields take defaults, so an absent file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CrewConfig {
    /// Directory that receives generated sources, tests, and run state.
    pub workspace_dir: PathBuf,

    /// Upper bound on improvement rounds after the first pass.
    pub max_iterations: u32,

    /// Fan per-subtask stage work out across threads.
    pub parallel_subtasks: bool,

    /// Rendered prompts are trimmed by dropping optional sections past this size.
    pub prompt_budget_bytes: usize,

    /// Extension used for generated source and test files.
    pub source_extension: String,

    /// Preferred fence tag when extracting code from generated text.
    pub code_fence_language: String,

    pub reasoning: ReasoningConfig,

    pub sandbox: SandboxConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Command that reads a prompt on stdin and answers on stdout.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    pub output_limit_bytes: usize,

    /// Environment variables that must be set before a run starts.
    pub required_env: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Test runner command; the test file path is appended.
    pub command: Vec<String>,

    pub timeout_secs: u64,

    pub output_limit_bytes: usize,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("workspace"),
            max_iterations: 2,
            parallel_subtasks: false,
            prompt_budget_bytes: 40_000,
            source_extension: "py".to_string(),
            code_fence_language: "python".to_string(),
            reasoning: ReasoningConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 200_000,
            required_env: vec!["OPENAI_API_KEY".to_string()],
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            command: vec!["pytest".to_string(), "-v".to_string()],
            timeout_secs: 30,
            output_limit_bytes: 100_000,
        }
    }
}

impl CrewConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workspace_dir.as_os_str().is_empty() {
            return Err(anyhow!("workspace_dir must not be empty"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if self.source_extension.trim().is_empty() || self.source_extension.contains('.') {
            return Err(anyhow!(
                "source_extension must be a bare extension such as \"py\""
            ));
        }
        if is_blank_command(&self.reasoning.command) {
            return Err(anyhow!("reasoning.command must be a non-empty array"));
        }
        if self.reasoning.timeout_secs == 0 {
            return Err(anyhow!("reasoning.timeout_secs must be > 0"));
        }
        if self.reasoning.output_limit_bytes == 0 {
            return Err(anyhow!("reasoning.output_limit_bytes must be > 0"));
        }
        if is_blank_command(&self.sandbox.command) {
            return Err(anyhow!("sandbox.command must be a non-empty array"));
        }
        if self.sandbox.timeout_secs == 0 {
            return Err(anyhow!("sandbox.timeout_secs must be > 0"));
        }
        if self.sandbox.output_limit_bytes == 0 {
            return Err(anyhow!("sandbox.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    /// Location of the run snapshot inside the workspace.
    pub fn snapshot_path(&self) -> PathBuf {
        self.workspace_dir.join("task_state.json")
    }

    /// Location of the Markdown report inside the workspace.
    pub fn report_path(&self) -> PathBuf {
        self.workspace_dir.join("final_report.md")
    }
}

fn is_blank_command(command: &[String]) -> bool {
    command.first().is_none_or(|program| program.trim().is_empty())
}

/// Invalid or incomplete configuration, detected before any stage runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationError {
    pub message: String,
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl std::error::Error for ConfigurationError {}

/// Fail with [`ConfigurationError`] when a required variable is unset or blank.
pub fn check_credentials(cfg: &ReasoningConfig) -> Result<()> {
    check_credentials_with(cfg, |name| env::var(name).ok())
}

/// Like [`check_credentials`] with an injectable variable lookup.
pub fn check_credentials_with<F>(cfg: &ReasoningConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let missing: Vec<&str> = cfg
        .required_env
        .iter()
        .map(String::as_str)
        .filter(|name| lookup(name).is_none_or(|value| value.trim().is_empty()))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(ConfigurationError {
        message: format!("missing required environment variable(s): {}", missing.join(", ")),
    }
    .into())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CrewConfig::default()`. Parse and
/// validation failures surface as [`ConfigurationError`].
pub fn load_config(path: &Path) -> Result<CrewConfig> {
    if !path.exists() {
        return validated(CrewConfig::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CrewConfig = toml::from_str(&contents).map_err(|err| ConfigurationError {
        message: format!("parse {}: {err}", path.display()),
    })?;
    validated(cfg)
}

fn validated(cfg: CrewConfig) -> Result<CrewConfig> {
    cfg.validate().map_err(|err| ConfigurationError {
        message: err.to_string(),
    })?;
    Ok(cfg)
}

/// Replace `path` with `contents` via a sibling temp file.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}
