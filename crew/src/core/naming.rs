//! Workspace-relative file naming for generated artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::types::SubTask;

const ENTRY_KEYWORDS: &[&str] = &["main", "entry", "入口"];
const TEST_KEYWORDS: &[&str] = &["test", "测试"];
const UTILS_KEYWORDS: &[&str] = &["utils", "util", "工具"];

/// Pick the file stem for a subtask by keyword sniffing on its description.
///
/// Checked in order: entry point, test, utilities, then the `module` default.
/// Distinct subtasks can map to the same stem; see [`location_collisions`].
pub fn artifact_stem(description: &str) -> &'static str {
    let lower = description.to_lowercase();
    let mentions = |keywords: &[&str]| keywords.iter().any(|k| lower.contains(k));
    if mentions(ENTRY_KEYWORDS) {
        "main"
    } else if mentions(TEST_KEYWORDS) {
        "test"
    } else if mentions(UTILS_KEYWORDS) {
        "utils"
    } else {
        "module"
    }
}

/// Workspace-relative source location for a subtask, e.g. `main.py`.
pub fn artifact_location(subtask: &SubTask, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", artifact_stem(&subtask.description), extension))
}

/// Workspace-relative location of the generated tests for an artifact.
///
/// Includes the subtask id so two artifacts sharing a source location still
/// get distinct test files.
pub fn test_location(subtask_id: u32, artifact_location: &Path, extension: &str) -> PathBuf {
    let stem = artifact_location
        .file_stem()
        .map_or_else(|| "artifact".into(), |s| s.to_string_lossy());
    PathBuf::from(format!("test_{stem}_{subtask_id}.{extension}"))
}

/// Locations claimed by more than one subtask, with the ids claiming them.
pub fn location_collisions<'a, I>(locations: I) -> BTreeMap<PathBuf, Vec<u32>>
where
    I: IntoIterator<Item = (u32, &'a Path)>,
{
    let mut claims: BTreeMap<PathBuf, Vec<u32>> = BTreeMap::new();
    for (id, location) in locations {
        claims.entry(location.to_path_buf()).or_default().push(id);
    }
    claims.retain(|_, ids| ids.len() > 1);
    claims
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_point_keyword_wins_over_test() {
        assert_eq!(artifact_stem("Write the main loop and test it"), "main");
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(artifact_stem("Add Unit TESTS"), "test");
        assert_eq!(artifact_stem("Shared Utils for parsing"), "utils");
    }

    #[test]
    fn unmatched_descriptions_use_module_default() {
        assert_eq!(artifact_stem("Implement arithmetic operations"), "module");
    }

    #[test]
    fn location_appends_extension() {
        let task = SubTask::new(1, "CLI entry point");
        assert_eq!(artifact_location(&task, "py"), PathBuf::from("main.py"));
    }

    #[test]
    fn test_location_is_unique_per_subtask() {
        let a = test_location(1, Path::new("module.py"), "py");
        let b = test_location(2, Path::new("module.py"), "py");
        assert_eq!(a, PathBuf::from("test_module_1.py"));
        assert_ne!(a, b);
    }

    #[test]
    fn collisions_report_shared_default_names() {
        let module = PathBuf::from("module.py");
        let main = PathBuf::from("main.py");
        let claims = vec![
            (1, module.as_path()),
            (2, main.as_path()),
            (3, module.as_path()),
        ];
        let collisions = location_collisions(claims);
        assert_eq!(collisions.len(), 1);
        assert_eq!(collisions.get(&module), Some(&vec![1, 3]));
    }
}
