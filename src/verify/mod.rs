//! Proof checking: stage source, run the verifier, parse its diagnostics.
//!
//! # Architecture
//!
//! ```text
//! source text → Evaluator (stage file) → EnvironmentManager (container)
//!             → exit code + raw output → parser → VerificationResult
//! ```
//!
//! # Example
//!
//! ```ignore
//! use lean_forge::verify::default_evaluator;
//!
//! let evaluator = default_evaluator().await?;
//! let result = evaluator
//!     .evaluate_default("theorem t : 1 + 1 = 2 := by rfl")
//!     .await;
//! assert!(result.proof_complete);
//! ```

pub mod evaluator;
pub mod parser;
pub mod result;

pub use evaluator::{
    default_evaluator, evaluator_with_config, validate_file_name, Evaluator,
    DEFAULT_EVALUATION_TIMEOUT, DEFAULT_FILE_NAME,
};
pub use parser::parse_output;
pub use result::{Goal, VerificationResult};
