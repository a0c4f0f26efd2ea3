//! Best-effort parsers over free-form generated text.
//!
//! The reasoning service gives no format guarantees, so every parser here has
//! a documented fallback instead of an error path.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::{Issue, Severity, SubTask};

static LIST_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\s*[.):]?|[-*]+)\s*").expect("list marker regex"));

static SEVERITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(severe|critical|major|moderate|medium|minor|trivial|nit|suggestion)s?\b")
        .expect("severity regex")
});

/// A severity heading such as `Severe issues` once emphasis and colons are trimmed.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:severe|critical|major|moderate|medium|minor|trivial|nit)s?",
        r"(?:\s+(?:issues?|problems?|findings?))?$",
    ))
    .expect("severity heading regex")
});

/// Filler meaning "nothing here", e.g. `None` or `No issues found`.
static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:none|n/?a|nothing",
        r"|no\s+(?:issues?|problems?|findings?)(?:\s+(?:were\s+)?found)?)$",
    ))
    .expect("placeholder regex")
});

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[^\n]*\n(.*?)```").expect("code fence regex")
});

/// Split generated task-list text into ordered subtasks.
///
/// A trimmed line is a task iff it starts with a digit, `-` or `*`. The
/// leading marker is stripped and empty results are discarded. If nothing
/// parses, the whole `requirement` becomes the single subtask.
pub fn decompose(generated: &str, requirement: &str) -> Vec<SubTask> {
    let descriptions: Vec<String> = generated
        .lines()
        .map(str::trim)
        .filter(|line| starts_with_list_marker(line))
        .map(strip_list_marker)
        .filter(|task| !task.is_empty())
        .collect();

    if descriptions.is_empty() {
        return vec![SubTask::new(1, requirement)];
    }

    descriptions
        .into_iter()
        .zip(1u32..)
        .map(|(description, id)| SubTask::new(id, description))
        .collect()
}

/// Extract an issue list from review text.
///
/// A line mentioning a severity word switches the current severity (default
/// moderate). A line starting with a list marker is an issue at the current
/// severity, unless it is only a severity heading or a placeholder such as
/// `None`. Text with no headings or list lines becomes one moderate issue
/// carrying the whole text, except for a bare "No issues found." statement;
/// empty text yields none.
pub fn extract_issues(review_text: &str) -> Vec<Issue> {
    let mut current = Severity::Moderate;
    let mut issues = Vec::new();
    let mut structured = false;

    for line in review_text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(severity) = severity_in(line) {
            current = severity;
        }
        if starts_with_list_marker(line) {
            structured = true;
            let description = strip_list_marker(line);
            let bare = bare_text(&description);
            if bare.is_empty() || HEADING_RE.is_match(bare) || PLACEHOLDER_RE.is_match(bare) {
                continue;
            }
            issues.push(Issue::new(current, description));
        } else if HEADING_RE.is_match(bare_text(line)) {
            structured = true;
        }
    }

    let trimmed = review_text.trim();
    if issues.is_empty()
        && !structured
        && !trimmed.is_empty()
        && !PLACEHOLDER_RE.is_match(bare_text(trimmed))
    {
        issues.push(Issue::new(Severity::Moderate, trimmed));
    }
    issues
}

/// Reduce generated text to source code.
///
/// Prefers the first fenced block tagged `language`, then the first fenced
/// block of any tag, then the whole text. An unterminated opening fence is
/// dropped. The result is trimmed.
pub fn extract_code(generated: &str, language: &str) -> String {
    let mut first_block: Option<&str> = None;
    for caps in FENCE_RE.captures_iter(generated) {
        let tag = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str());
        if !language.is_empty() && tag.eq_ignore_ascii_case(language) {
            return body.trim().to_string();
        }
        first_block.get_or_insert(body);
    }
    if let Some(body) = first_block {
        return body.trim().to_string();
    }

    let trimmed = generated.trim();
    if trimmed.starts_with("```") {
        return trimmed
            .split_once('\n')
            .map_or("", |(_, rest)| rest)
            .trim()
            .to_string();
    }
    trimmed.to_string()
}

fn starts_with_list_marker(line: &str) -> bool {
    line.chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '*')
}

fn strip_list_marker(line: &str) -> String {
    LIST_MARKER_RE.replace(line, "").trim().to_string()
}

/// Line text without emphasis, heading hashes, or trailing punctuation.
fn bare_text(text: &str) -> &str {
    text.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, '*' | '_' | '#' | ':' | '.' | '`')
    })
}

fn severity_in(line: &str) -> Option<Severity> {
    let caps = SEVERITY_RE.captures(line)?;
    let word = caps.get(1)?.as_str().to_ascii_lowercase();
    match word.as_str() {
        "severe" | "critical" | "major" => Some(Severity::Severe),
        "moderate" | "medium" => Some(Severity::Moderate),
        _ => Some(Severity::Minor),
    }
}
