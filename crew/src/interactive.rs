//! Line-oriented interactive session for `crew interactive`.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::engine::WorkflowResult;

/// Built-in requirements selectable by number.
pub const EXAMPLE_REQUIREMENTS: [&str; 3] = [
    "Create a simple todo application that supports adding, deleting, listing, and marking items as done",
    "Implement a calculator that supports addition, subtraction, multiplication, and division",
    "Create a file manager that can list directories and read file contents",
];

const QUIT_WORDS: &[&str] = &["quit", "exit", "退出"];

/// What to do with one line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    /// Blank line.
    Skip,
    Quit,
    /// Run a requirement; `example` is the 1-based example number if one was picked.
    Run {
        requirement: String,
        example: Option<usize>,
    },
}

pub fn parse_input(line: &str) -> InputAction {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InputAction::Skip;
    }
    if QUIT_WORDS.iter().any(|word| trimmed.eq_ignore_ascii_case(word)) {
        return InputAction::Quit;
    }
    if let Ok(number) = trimmed.parse::<usize>()
        && let Some(requirement) = number
            .checked_sub(1)
            .and_then(|idx| EXAMPLE_REQUIREMENTS.get(idx))
    {
        return InputAction::Run {
            requirement: (*requirement).to_string(),
            example: Some(number),
        };
    }
    InputAction::Run {
        requirement: trimmed.to_string(),
        example: None,
    }
}

/// Short human summary of a finished run.
pub fn summary(result: &WorkflowResult) -> String {
    format!(
        "files generated: {}\naverage review score: {:.1}/100\niterations: {}\nartifacts passing: {}/{}",
        result.report.artifact_count,
        result.report.average_score,
        result.iterations(),
        result.report.passed_count,
        result.report.artifact_count,
    )
}

/// Read requirements from `input` until a quit word or end of input.
///
/// `run` executes one requirement and returns the text to print. A failed run
/// is reported and the session continues.
pub fn run_session<I, O, F>(mut input: I, out: &mut O, mut run: F) -> Result<()>
where
    I: BufRead,
    O: Write,
    F: FnMut(&str) -> Result<String>,
{
    writeln!(out, "crew: multi-stage code generation")?;
    writeln!(out, "Type a requirement, pick an example by number, or `quit` to leave.")?;
    writeln!(out, "Examples:")?;
    for (i, requirement) in EXAMPLE_REQUIREMENTS.iter().enumerate() {
        writeln!(out, "  {}. {requirement}", i + 1)?;
    }

    let mut line = String::new();
    loop {
        write!(out, "\nrequirement> ")?;
        out.flush().context("flush prompt")?;
        line.clear();
        if input.read_line(&mut line).context("read input")? == 0 {
            break;
        }
        match parse_input(&line) {
            InputAction::Skip => continue,
            InputAction::Quit => break,
            InputAction::Run {
                requirement,
                example,
            } => {
                if let Some(number) = example {
                    writeln!(out, "selected example {number}: {requirement}")?;
                }
                match run(&requirement) {
                    Ok(text) => writeln!(out, "{text}")?,
                    Err(err) => writeln!(out, "run failed: {err:#}")?,
                }
            }
        }
    }
    writeln!(out, "bye")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::io::Cursor;

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse_input("   \n"), InputAction::Skip);
    }

    #[test]
    fn quit_words_are_case_insensitive() {
        assert_eq!(parse_input("QUIT"), InputAction::Quit);
        assert_eq!(parse_input(" exit "), InputAction::Quit);
        assert_eq!(parse_input("退出"), InputAction::Quit);
    }

    #[test]
    fn numbers_select_examples() {
        assert_eq!(
            parse_input("2"),
            InputAction::Run {
                requirement: EXAMPLE_REQUIREMENTS[1].to_string(),
                example: Some(2),
            }
        );
    }

    #[test]
    fn out_of_range_numbers_are_requirements() {
        for text in ["0", "4"] {
            assert_eq!(
                parse_input(text),
                InputAction::Run {
                    requirement: text.to_string(),
                    example: None,
                }
            );
        }
    }

    #[test]
    fn session_runs_until_quit_and_survives_failures() {
        let input = Cursor::new("\nbuild a calculator\n1\nbreak things\nquit\nnever run\n");
        let mut out = Vec::new();
        let mut seen = Vec::new();

        run_session(input, &mut out, |requirement| {
            seen.push(requirement.to_string());
            if requirement == "break things" {
                Err(anyhow!("reasoning service unavailable"))
            } else {
                Ok(format!("done: {requirement}"))
            }
        })
        .expect("session");

        assert_eq!(
            seen,
            vec![
                "build a calculator".to_string(),
                EXAMPLE_REQUIREMENTS[0].to_string(),
                "break things".to_string(),
            ]
        );
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("done: build a calculator"));
        assert!(text.contains("selected example 1"));
        assert!(text.contains("run failed: reasoning service unavailable"));
        assert!(text.trim_end().ends_with("bye"));
    }

    #[test]
    fn session_ends_at_end_of_input() {
        let mut out = Vec::new();
        run_session(Cursor::new("a requirement"), &mut out, |_| Ok(String::new()))
            .expect("session");
        assert!(String::from_utf8(out).expect("utf8").contains("bye"));
    }
}
