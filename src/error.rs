//! Error types for lean-forge operations.
//!
//! Only failures that prevent producing any verification result are
//! surfaced as errors:
//! - Docker daemon connection and container API failures
//! - Runtime image resolution (provisioning)
//! - Lemma search transport problems (folded into the response by the client)
//!
//! Everything that happens during a single evaluation is reported as data in
//! [`crate::verify::VerificationResult`] instead.

use thiserror::Error;

/// Errors that can occur during Docker operations.
#[derive(Debug, Error)]
pub enum DockerError {
    #[error("Docker daemon not available: {0}")]
    DaemonUnavailable(String),

    #[error("Docker build failed: {0}")]
    BuildFailed(String),

    #[error("Failed to pull image: {0}")]
    PullFailed(String),

    #[error("Docker run failed: {0}")]
    RunFailed(String),

    #[error("Container '{id}' not found")]
    ContainerNotFound { id: String },

    #[error("container timed out after {seconds}s")]
    Timeout { seconds: f64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while provisioning the execution environment.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("Failed to prepare directory '{path}': {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No usable runtime image: local image '{image}' unusable, no build succeeded, and pulling fallback '{fallback}' failed: {reason}")]
    ImageResolution {
        image: String,
        fallback: String,
        reason: String,
    },

    #[error(transparent)]
    Docker(#[from] DockerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while querying the lemma search index.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Search API returned status {status}")]
    Status { status: u16 },

    #[error("Failed to parse search response: {0}")]
    ParseError(String),
}
