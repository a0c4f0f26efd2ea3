//! Run snapshot and report files written into the workspace.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{WorkflowStatus, WorkflowStep};
use crate::io::config::write_atomic;

/// Minimal persisted view of a run (`<workspace>/task_state.json`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateSnapshot {
    pub status: WorkflowStatus,
    pub current_step: Option<WorkflowStep>,
    pub iteration_count: u32,
    pub artifact_count: usize,
    /// RFC 3339 UTC time the snapshot was taken.
    pub timestamp: String,
}

impl StateSnapshot {
    /// Snapshot stamped with the current time.
    pub fn now(
        status: WorkflowStatus,
        current_step: Option<WorkflowStep>,
        iteration_count: u32,
        artifact_count: usize,
    ) -> Self {
        Self {
            status,
            current_step,
            iteration_count,
            artifact_count,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Load a snapshot from disk.
pub fn load_snapshot(path: &Path) -> Result<StateSnapshot> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read snapshot {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse snapshot {}", path.display()))
}

/// Atomically write a snapshot to disk (temp file + rename).
pub fn write_snapshot(path: &Path, snapshot: &StateSnapshot) -> Result<()> {
    debug!(
        path = %path.display(),
        status = %snapshot.status,
        iteration_count = snapshot.iteration_count,
        "writing snapshot"
    );
    let mut buf = serde_json::to_string_pretty(snapshot).context("serialize snapshot")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Atomically write the Markdown report.
pub fn write_report(path: &Path, markdown: &str) -> Result<()> {
    debug!(path = %path.display(), bytes = markdown.len(), "writing report");
    write_atomic(path, markdown)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_through_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("ws").join("task_state.json");
        let snapshot = StateSnapshot::now(
            WorkflowStatus::Completed,
            Some(WorkflowStep::Iteration),
            1,
            2,
        );

        write_snapshot(&path, &snapshot).expect("write");
        let loaded = load_snapshot(&path).expect("load");

        assert_eq!(loaded, snapshot);
        assert!(!temp.path().join("ws").join("task_state.json.tmp").exists());
    }

    #[test]
    fn snapshot_json_uses_wire_names() {
        let snapshot = StateSnapshot {
            status: WorkflowStatus::Error,
            current_step: Some(WorkflowStep::CodeReview),
            iteration_count: 0,
            artifact_count: 3,
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };
        let json: serde_json::Value = serde_json::to_value(&snapshot).expect("to json");
        assert_eq!(json["status"], "error");
        assert_eq!(json["current_step"], "code_review");
        assert_eq!(json["artifact_count"], 3);
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let snapshot = StateSnapshot::now(WorkflowStatus::Idle, None, 0, 0);
        chrono::DateTime::parse_from_rfc3339(&snapshot.timestamp).expect("rfc3339");
    }

    #[test]
    fn report_is_written_verbatim() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("final_report.md");
        write_report(&path, "# Report\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "# Report\n");
    }
}
