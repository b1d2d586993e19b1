//! Renderers that turn a [`VerificationResult`] into tool output text.

use crate::verify::VerificationResult;

/// Pretty-printed JSON of the full result.
pub fn run_tool_output(result: &VerificationResult) -> String {
    result.to_json_pretty()
}

/// Compact JSON of the full result, for callers inspecting goal state.
pub fn state_tool_output(result: &VerificationResult) -> String {
    serde_json::to_string(result).unwrap_or_else(|e| {
        format!("{{\"success\": false, \"errors\": [\"serialization failed: {e}\"]}}")
    })
}

/// Plain-text rendering in the style of an interactive session.
pub fn repl_tool_output(result: &VerificationResult) -> String {
    if !result.success {
        let errors = if result.errors.is_empty() {
            "unknown error".to_string()
        } else {
            result.errors.join("\n")
        };
        return format!("LEAN ERROR:\n{errors}");
    }

    if result.proof_complete {
        return "SUCCESS: proof complete (no goals remaining).".to_string();
    }

    if result.has_open_goals() {
        let mut lines = vec!["INCOMPLETE PROOF:".to_string()];
        for (idx, goal) in result.goals.iter().enumerate() {
            lines.push(format!("Goal {}: {}", idx + 1, goal.goal));
            lines.extend(goal.context.iter().map(|ctx| format!("  {ctx}")));
        }
        return lines.join("\n");
    }

    "Proof compiled, but Lean reported a non-final state.".to_string()
}
