//! Parser for the Lean verifier's diagnostic text.
//!
//! Lean prints human-oriented messages, not a machine format. The rules
//! here follow what the verifier actually emits:
//!
//! ```text
//! check.lean:4:14: error: unsolved goals      ← error (and context boundary)
//! case succ                                   ┐
//! n : Nat                                     │ context, read bottom-up
//! ih : n + 0 = n                              ┘
//! ⊢ n + 1 + 0 = n + 1                         ← goal marker
//! ```
//!
//! Context for a goal is collected by walking upward from the marker line
//! until a blank line (once something was collected), an `error:` or
//! `warning:` line, an `info:` line, or the start of the text.

use std::sync::OnceLock;

use regex::Regex;

use crate::verify::result::{Goal, VerificationResult};

/// Glyph that introduces a goal statement.
pub const GOAL_MARKER: char = '⊢';

/// Keyword Lean prints when a proof relies on a placeholder.
pub const ADMITTED_GAP_MARKER: &str = "sorry";

/// Goal text used when nothing follows the marker.
pub const EMPTY_GOAL_PLACEHOLDER: &str = "(empty goal)";

fn error_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\berror:\s*(.+)").expect("valid error regex"))
}

fn warning_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bwarning:\s*(.+)").expect("valid warning regex"))
}

/// Parses raw verifier output and its exit code into a [`VerificationResult`].
pub fn parse_output(raw_output: &str, exit_code: i64) -> VerificationResult {
    let lines: Vec<&str> = raw_output.lines().collect();

    let mut errors = extract_messages(&lines, error_re());
    let warnings = extract_messages(&lines, warning_re());
    let goals = extract_goals(&lines);
    let has_admitted_gap = raw_output.to_lowercase().contains(ADMITTED_GAP_MARKER);

    // A failing exit code must never go unreported because the message
    // format was not recognised.
    if exit_code != 0 && errors.is_empty() {
        let fallback = raw_output.trim();
        if fallback.is_empty() {
            errors.push(format!(
                "verifier exited with code {exit_code} and produced no output"
            ));
        } else {
            errors.push(fallback.to_string());
        }
    }

    let success = exit_code == 0 && errors.is_empty();
    let proof_complete = success && goals.is_empty() && !has_admitted_gap;

    VerificationResult {
        success,
        proof_complete,
        has_admitted_gap,
        goals,
        errors,
        warnings,
        raw_output: raw_output.to_string(),
    }
}

fn extract_messages(lines: &[&str], re: &Regex) -> Vec<String> {
    lines
        .iter()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// One goal per marker occurrence, in text order.
fn extract_goals(lines: &[&str]) -> Vec<Goal> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(idx, line)| {
            let marker = line.find(GOAL_MARKER)?;
            let text = line[marker + GOAL_MARKER.len_utf8()..].trim();
            let goal = if text.is_empty() {
                EMPTY_GOAL_PLACEHOLDER
            } else {
                text
            };
            Some(Goal::new(collect_context(&lines[..idx]), goal))
        })
        .collect()
}

/// Walks upward over `above` (the lines preceding a marker).
fn collect_context(above: &[&str]) -> Vec<String> {
    let mut context = Vec::new();

    for line in above.iter().rev() {
        let candidate = line.trim();
        if candidate.is_empty() {
            if context.is_empty() {
                continue;
            }
            break;
        }
        if is_diagnostic_boundary(candidate) {
            break;
        }
        context.push(candidate.to_string());
    }

    context.reverse();
    context
}

fn is_diagnostic_boundary(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("error:") || lower.contains("warning:") || line.starts_with("info:")
}
