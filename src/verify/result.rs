//! Structured verification results.

use serde::{Deserialize, Serialize};

/// An open proof obligation and the hypotheses printed above it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    /// Local context lines in the order the verifier printed them.
    pub context: Vec<String>,
    /// The goal statement after the `⊢` marker.
    pub goal: String,
}

impl Goal {
    /// Creates a goal.
    pub fn new(context: Vec<String>, goal: impl Into<String>) -> Self {
        Self {
            context,
            goal: goal.into(),
        }
    }
}

/// Outcome of checking one source file.
///
/// `proof_complete` implies `success`; `success` is false whenever the
/// verifier exited non-zero or any error was extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Verifier exited 0 and no errors were reported.
    pub success: bool,
    /// Success with no open goals and no admitted gap.
    pub proof_complete: bool,
    /// The output mentions `sorry`.
    pub has_admitted_gap: bool,
    /// Open goals in output order.
    pub goals: Vec<Goal>,
    /// Error messages in output order.
    pub errors: Vec<String>,
    /// Warning messages in output order.
    pub warnings: Vec<String>,
    /// Verbatim verifier output.
    pub raw_output: String,
}

impl VerificationResult {
    /// A failed result carrying one error and no verifier output.
    ///
    /// Used when the source never reached the verifier.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            proof_complete: false,
            has_admitted_gap: false,
            goals: Vec::new(),
            errors: vec![error.into()],
            warnings: Vec::new(),
            raw_output: String::new(),
        }
    }

    /// Returns true if open goals remain.
    pub fn has_open_goals(&self) -> bool {
        !self.goals.is_empty()
    }

    /// Serializes the result as pretty-printed JSON.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!("{{\"success\": false, \"errors\": [\"serialization failed: {e}\"]}}")
        })
    }
}
