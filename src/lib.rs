//! lean-forge: sandboxed Lean 4 proof checking.
//!
//! Source text is staged into a persistent workspace, checked by the Lean
//! verifier inside a throwaway Docker container, and the verifier's
//! diagnostics are parsed into a structured [`VerificationResult`].

pub mod cli;
pub mod environment;
pub mod error;
pub mod execution;
pub mod tools;
pub mod verify;

pub use environment::{EnvironmentManager, RuntimeConfig};
pub use error::{DockerError, EnvironmentError, SearchError};
pub use execution::{ContainerRuntime, DockerClient};
pub use tools::{LemmaSearchClient, ToolKind, Toolkit};
pub use verify::{parse_output, Evaluator, Goal, VerificationResult};
