//! Evaluator: stage Lean source, run the verifier, parse the result.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::environment::{EnvironmentManager, RuntimeConfig};
use crate::error::EnvironmentError;
use crate::execution::{ContainerRuntime, DockerClient};
use crate::verify::parser::parse_output;
use crate::verify::result::VerificationResult;

/// File name used when the caller does not choose one.
pub const DEFAULT_FILE_NAME: &str = "check.lean";

/// Verifier budget per evaluation. First runs may resolve dependencies.
pub const DEFAULT_EVALUATION_TIMEOUT: Duration = Duration::from_secs(240);

/// Turns source text into a [`VerificationResult`].
///
/// Evaluations through one evaluator share the workspace; concurrent calls
/// must use distinct file names.
pub struct Evaluator<R: ContainerRuntime> {
    env: Arc<EnvironmentManager<R>>,
    timeout: Duration,
}

impl<R: ContainerRuntime> Evaluator<R> {
    /// Creates an evaluator over an already provisioned environment.
    pub fn new(env: Arc<EnvironmentManager<R>>) -> Self {
        Self {
            env,
            timeout: DEFAULT_EVALUATION_TIMEOUT,
        }
    }

    /// Sets the verifier timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The environment this evaluator runs in.
    pub fn environment(&self) -> &Arc<EnvironmentManager<R>> {
        &self.env
    }

    /// Checks `source` as [`DEFAULT_FILE_NAME`].
    pub async fn evaluate_default(&self, source: &str) -> VerificationResult {
        self.evaluate(source, DEFAULT_FILE_NAME).await
    }

    /// Writes `source` to `<workspace>/<file_name>` (overwriting) and checks it.
    ///
    /// Never fails: staging problems, runtime failures and timeouts all come
    /// back as an unsuccessful result with at least one error.
    pub async fn evaluate(&self, source: &str, file_name: &str) -> VerificationResult {
        if let Err(reason) = validate_file_name(file_name) {
            warn!(file = file_name, reason = %reason, "Rejected source file name");
            return VerificationResult::failure(format!(
                "failed to write source file {file_name}: {reason}"
            ));
        }

        let path = self.env.workspace_path().join(file_name);
        if let Err(e) = tokio::fs::write(&path, source).await {
            warn!(path = %path.display(), error = %e, "Failed to stage source");
            return VerificationResult::failure(format!(
                "failed to write source file {file_name}: {e}"
            ));
        }

        let command = self.env.config().verifier_command(file_name);
        let outcome = self.env.run_command(&command, self.timeout).await;
        let result = parse_output(&outcome.output, outcome.exit_code);

        info!(
            file = file_name,
            exit_code = outcome.exit_code,
            success = result.success,
            proof_complete = result.proof_complete,
            goals = result.goals.len(),
            errors = result.errors.len(),
            "Evaluation finished"
        );

        result
    }
}

/// Connects to Docker, provisions the default environment, and wraps it.
pub async fn default_evaluator() -> Result<Evaluator<DockerClient>, EnvironmentError> {
    evaluator_with_config(RuntimeConfig::default()).await
}

/// Like [`default_evaluator`] with an explicit configuration.
pub async fn evaluator_with_config(
    config: RuntimeConfig,
) -> Result<Evaluator<DockerClient>, EnvironmentError> {
    let client = DockerClient::connect().await?;
    let env = EnvironmentManager::new(client, config)?;
    env.provision().await?;
    Ok(Evaluator::new(Arc::new(env)))
}

/// Checks that a staged file name stays inside the workspace and is safe to
/// splice into the verifier's shell command.
pub fn validate_file_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("file name is empty".to_string());
    }
    if name.len() > 255 {
        return Err(format!("file name too long ({} chars, max 255)", name.len()));
    }
    if name.starts_with('/') {
        return Err("file name must be relative".to_string());
    }
    if name.starts_with('-') {
        return Err("file name must not start with '-'".to_string());
    }
    if name.split('/').any(|part| part == ".." || part.is_empty()) {
        return Err("file name must not contain '..' or empty path segments".to_string());
    }
    if let Some(ch) = name.chars().find(|&ch| {
        ch.is_whitespace()
            || ch.is_control()
            || matches!(
                ch,
                '\'' | '"' | '`' | '$' | '!' | '&' | '|' | ';' | '(' | ')' | '{' | '}' | '<' | '>' | '\\' | '*' | '?' | '~' | '#'
            )
    }) {
        return Err(format!("invalid character {ch:?}: shell metacharacters not allowed"));
    }
    Ok(())
}
