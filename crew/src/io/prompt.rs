//! Prompt builder rendering one template per [`Operation`].

use std::sync::LazyLock;

use anyhow::{Context, Result};
use minijinja::Environment;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::io::reasoning::{Operation, Prompt};

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").expect("section marker regex")
});

/// Droppable sections are removed in this order until the prompt fits.
const DROP_ORDER: &[&str] = &[
    "tech_stack",
    "interfaces",
    "analysis",
    "understanding",
    "subtasks",
    "requirements",
    "cases",
    "architecture",
    "subtask",
];

const TRUNCATION_MARKER: &str = "\n[truncated]";

fn template_source(operation: Operation) -> &'static str {
    match operation {
        Operation::Understand => include_str!("prompts/understand.md"),
        Operation::Decompose => include_str!("prompts/decompose.md"),
        Operation::DocumentRequirements => include_str!("prompts/document_requirements.md"),
        Operation::AnalyzeRequirements => include_str!("prompts/analyze_requirements.md"),
        Operation::DesignArchitecture => include_str!("prompts/design_architecture.md"),
        Operation::SelectTechStack => include_str!("prompts/select_tech_stack.md"),
        Operation::DefineInterfaces => include_str!("prompts/define_interfaces.md"),
        Operation::GenerateCode => include_str!("prompts/generate_code.md"),
        Operation::ImproveCode => include_str!("prompts/improve_code.md"),
        Operation::ReviewCode => include_str!("prompts/review_code.md"),
        Operation::SuggestImprovements => include_str!("prompts/suggest_improvements.md"),
        Operation::DesignTestCases => include_str!("prompts/design_test_cases.md"),
        Operation::GenerateTestCode => include_str!("prompts/generate_test_code.md"),
    }
}

/// Values available to every template. Blank values render as absent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptVars {
    /// The user's original requirement.
    pub requirement: String,
    /// Target language name, e.g. `python`.
    pub language: String,
    pub understanding: Option<String>,
    /// Numbered subtask list.
    pub subtasks: Option<String>,
    pub requirements_doc: Option<String>,
    pub analysis: Option<String>,
    pub architecture: Option<String>,
    pub tech_stack: Option<String>,
    pub interfaces: Option<String>,
    /// The subtask a per-artifact operation works on.
    pub subtask: Option<String>,
    pub code: Option<String>,
    pub feedback: Option<String>,
    pub review: Option<String>,
    pub test_cases: Option<String>,
    /// Import name of the module under test.
    pub module: Option<String>,
}

impl PromptVars {
    fn normalized(&self) -> Self {
        let clean = |value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            requirement: self.requirement.trim().to_string(),
            language: self.language.trim().to_string(),
            understanding: clean(&self.understanding),
            subtasks: clean(&self.subtasks),
            requirements_doc: clean(&self.requirements_doc),
            analysis: clean(&self.analysis),
            architecture: clean(&self.architecture),
            tech_stack: clean(&self.tech_stack),
            interfaces: clean(&self.interfaces),
            subtask: clean(&self.subtask),
            code: clean(&self.code),
            feedback: clean(&self.feedback),
            review: clean(&self.review),
            test_cases: clean(&self.test_cases),
            module: clean(&self.module),
        }
    }
}

/// Builds prompts within a byte budget, dropping less critical sections first.
pub struct PromptBuilder {
    env: Environment<'static>,
    budget_bytes: usize,
}

impl PromptBuilder {
    pub fn new(budget_bytes: usize) -> Result<Self> {
        let mut env = Environment::new();
        for operation in Operation::ALL {
            env.add_template(operation.as_str(), template_source(operation))
                .with_context(|| format!("load {operation} template"))?;
        }
        Ok(Self { env, budget_bytes })
    }

    /// Render the prompt for `operation`.
    pub fn build(&self, operation: Operation, vars: &PromptVars) -> Result<Prompt> {
        let template = self
            .env
            .get_template(operation.as_str())
            .with_context(|| format!("get {operation} template"))?;
        let rendered = template
            .render(vars.normalized())
            .with_context(|| format!("render {operation} template"))?;

        let mut sections = parse_sections(&rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        Ok(Prompt {
            operation,
            text: render_sections(&sections),
        })
    }
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    key: String,
    required: bool,
    /// Section content including its heading, marker excluded.
    content: String,
}

/// Split rendered output on `<!-- section:KEY required|droppable -->` markers.
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    let markers: Vec<_> = SECTION_RE.captures_iter(rendered).collect();
    let mut sections = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(key), Some(kind)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(rendered.len(), |m| m.start());
        let content = rendered[whole.end()..end].trim().to_string();
        let required = kind.as_str() == "required";
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key: key.as_str().to_string(),
                required,
                content,
            });
        }
    }
    sections
}

fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    for key in DROP_ORDER {
        if total_len(sections) <= budget {
            return;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == *key && !s.required) {
            debug!(
                section = key,
                bytes_dropped = sections[idx].content.len(),
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    if total_len(sections) <= budget {
        return;
    }
    // Still over budget: truncate the largest section.
    let Some(idx) = (0..sections.len()).max_by_key(|&i| sections[i].content.len()) else {
        return;
    };
    let other_len = total_len(sections) - sections[idx].content.len();
    let allowed = budget.saturating_sub(other_len);
    let section = &mut sections[idx];
    let before_len = section.content.len();
    if allowed > TRUNCATION_MARKER.len() {
        truncate_at_char_boundary(&mut section.content, allowed - TRUNCATION_MARKER.len());
        section.content.push_str(TRUNCATION_MARKER);
    } else {
        truncate_at_char_boundary(&mut section.content, allowed);
    }
    debug!(
        section = section.key,
        before_len,
        after_len = section.content.len(),
        "truncated section for budget"
    );
}

fn truncate_at_char_boundary(text: &mut String, max_len: usize) {
    if text.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
}

fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
