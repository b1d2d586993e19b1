//! Reproducible execution environment for the Lean verifier.
//!
//! The [`EnvironmentManager`] owns two persistent host directories and a
//! resolved image:
//!
//! ```text
//! <workspace>/            → /workspace       (lakefile.lean + staged sources)
//! <cache>/.cache/         → /root/.cache     (toolchain and dependency artifacts)
//! ```
//!
//! Image resolution order: local image with the project tool, then a local
//! build from `<build_context>/Dockerfile`, then the pulled fallback image.

pub mod config;
pub mod manager;

pub use config::{RuntimeConfig, DEFAULT_FALLBACK_IMAGE, DEFAULT_IMAGE};
pub use manager::{EnvironmentManager, DEFAULT_COMMAND_TIMEOUT};
