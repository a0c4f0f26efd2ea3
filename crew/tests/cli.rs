//! CLI tests for the `crew` binary.
//!
//! Spawns the binary and checks exit codes and the files a run leaves behind.

use std::fs;
use std::path::Path;
use std::process::Command;

use crew::exit_codes;

fn crew(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_crew"));
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

#[test]
fn examples_lists_builtin_requirements() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = crew(temp.path()).arg("examples").output().expect("crew examples");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    let numbered: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(numbered.len(), 3);
    assert!(numbered[0].starts_with("1. "));
    assert!(numbered[2].starts_with("3. "));
}

#[test]
fn missing_credentials_exit_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("crew.toml"),
        "[reasoning]\nrequired_env = [\"CREW_TEST_MISSING_KEY\"]\n",
    )
    .expect("write config");

    let output = crew(temp.path())
        .env_remove("CREW_TEST_MISSING_KEY")
        .args(["run", "build a calculator"])
        .output()
        .expect("crew run");

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("CREW_TEST_MISSING_KEY"), "stderr: {stderr}");
    assert!(!temp.path().join("workspace").exists());
}

#[test]
fn invalid_config_exits_with_config_code() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(temp.path().join("alt.toml"), "max_iterations = \"many\"\n").expect("write config");

    let status = crew(temp.path())
        .args(["run", "build a calculator", "--config", "alt.toml"])
        .status()
        .expect("crew run");

    assert_eq!(status.code(), Some(exit_codes::CONFIG));
}

#[cfg(unix)]
#[test]
fn run_with_shell_collaborators_writes_report() {
    let temp = tempfile::tempdir().expect("tempdir");
    let config = r#"
[reasoning]
required_env = []
command = ["sh", "-c", '''
cat > /dev/null
case "$CREW_OPERATION" in
  generate_code|improve_code|generate_test_code) printf '%s\n' '```python' 'x = 1' '```' ;;
  *) echo "Nothing to add." ;;
esac
''']

[sandbox]
command = ["true"]
"#;
    fs::write(temp.path().join("crew.toml"), config).expect("write config");

    let output = crew(temp.path())
        .args(["run", "print hello", "--workspace", "out"])
        .output()
        .expect("crew run");

    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = temp.path().join("out");
    assert_eq!(
        fs::read_to_string(out.join("module.py")).expect("artifact"),
        "x = 1"
    );
    assert!(out.join("test_module_1.py").exists());
    let report = fs::read_to_string(out.join("final_report.md")).expect("report");
    assert!(report.contains("# Code Generation Report"));
    let snapshot = fs::read_to_string(out.join("task_state.json")).expect("snapshot");
    assert!(snapshot.contains("\"completed\""));

    let status = crew(temp.path())
        .args(["status", "--workspace", "out"])
        .output()
        .expect("crew status");
    assert_eq!(status.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("status: completed"), "stdout: {stdout}");
    assert!(stdout.contains("artifacts: 1"), "stdout: {stdout}");
}

#[test]
fn status_without_previous_run_fails() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = crew(temp.path()).arg("status").output().expect("crew status");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("task_state.json"), "stderr: {stderr}");
}
