//! Ephemeral container lifecycle.
//!
//! Every command runs in a container created for it alone. [`run_ephemeral`]
//! drives the lifecycle and force-removes the container on every exit path:
//! normal completion, non-zero exit, runtime error and timeout.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DockerError;
use crate::execution::docker_client::{ContainerConfig, ContainerRuntime};

/// Exit code reported when the runtime failed before the command produced one.
pub const RUNTIME_FAILURE_EXIT_CODE: i64 = -1;

/// Status of a managed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerStatus {
    /// Container is created but not started.
    Pending,
    /// Container is running.
    Running,
    /// Container exited with the given code.
    Exited(i64),
    /// Container failed with an error message.
    Failed(String),
    /// Container exceeded its timeout.
    Timeout,
    /// Container has been removed.
    Removed,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerStatus::Pending => write!(f, "pending"),
            ContainerStatus::Running => write!(f, "running"),
            ContainerStatus::Exited(code) => write!(f, "exited ({})", code),
            ContainerStatus::Failed(msg) => write!(f, "failed: {}", msg),
            ContainerStatus::Timeout => write!(f, "timeout"),
            ContainerStatus::Removed => write!(f, "removed"),
        }
    }
}

/// Exit code and combined output of one container run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    /// Exit code of the command, or [`RUNTIME_FAILURE_EXIT_CODE`].
    pub exit_code: i64,
    /// Interleaved stdout and stderr.
    pub output: String,
}

impl ExecutionOutcome {
    /// Creates an outcome from a finished command.
    pub fn new(exit_code: i64, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }

    /// Outcome for a failure of the container runtime itself.
    pub fn runtime_failure(error: &DockerError) -> Self {
        Self {
            exit_code: RUNTIME_FAILURE_EXIT_CODE,
            output: format!("Error Docker: {error}"),
        }
    }

    /// Returns true if the exit code is the runtime-failure sentinel.
    pub fn is_runtime_failure(&self) -> bool {
        self.exit_code == RUNTIME_FAILURE_EXIT_CODE
    }
}

/// A container that exists for exactly one command.
#[derive(Debug)]
pub struct EphemeralContainer {
    id: String,
    status: ContainerStatus,
    created_at: DateTime<Utc>,
}

impl EphemeralContainer {
    /// Creates the container in Docker without starting it.
    pub async fn create<R: ContainerRuntime + ?Sized>(
        runtime: &R,
        config: &ContainerConfig,
    ) -> Result<Self, DockerError> {
        let id = runtime.create_container(config).await?;
        debug!(container = %id, image = %config.image, "Container created");

        Ok(Self {
            id,
            status: ContainerStatus::Pending,
            created_at: Utc::now(),
        })
    }

    /// Starts the container, waits for it to stop, and collects its logs.
    pub async fn run<R: ContainerRuntime + ?Sized>(
        &mut self,
        runtime: &R,
    ) -> Result<ExecutionOutcome, DockerError> {
        if self.status != ContainerStatus::Pending {
            return Err(DockerError::RunFailed(format!(
                "Cannot start container in {} state",
                self.status
            )));
        }

        runtime.start_container(&self.id).await?;
        self.status = ContainerStatus::Running;

        let exit_code = runtime.wait_container(&self.id).await?;
        self.status = ContainerStatus::Exited(exit_code);

        let output = runtime.get_logs(&self.id).await?;
        Ok(ExecutionOutcome::new(exit_code, output))
    }

    /// Marks the container as timed out.
    pub fn mark_timeout(&mut self) {
        self.status = ContainerStatus::Timeout;
    }

    /// Marks the container as failed with a message.
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = ContainerStatus::Failed(message.into());
    }

    /// Force-removes the container whatever its state.
    pub async fn remove<R: ContainerRuntime + ?Sized>(
        &mut self,
        runtime: &R,
    ) -> Result<(), DockerError> {
        runtime.remove_container(&self.id, true).await?;
        debug!(
            container = %self.id,
            last_status = %self.status,
            lifetime_ms = (Utc::now() - self.created_at).num_milliseconds(),
            "Container removed"
        );
        self.status = ContainerStatus::Removed;
        Ok(())
    }

    /// Returns the container ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the current status.
    pub fn status(&self) -> &ContainerStatus {
        &self.status
    }
}

/// Runs one command in a fresh container with a bounded wait.
///
/// Never fails: runtime errors and timeouts come back as an outcome with
/// exit code [`RUNTIME_FAILURE_EXIT_CODE`]. The container is removed before
/// this returns; a removal failure is logged and does not change the outcome.
pub async fn run_ephemeral<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    config: &ContainerConfig,
    timeout: Duration,
) -> ExecutionOutcome {
    let mut container = match EphemeralContainer::create(runtime, config).await {
        Ok(container) => container,
        Err(e) => {
            warn!(image = %config.image, error = %e, "Failed to create container");
            return ExecutionOutcome::runtime_failure(&e);
        }
    };

    let result = tokio::time::timeout(timeout, container.run(runtime)).await;
    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            container.mark_failed(e.to_string());
            ExecutionOutcome::runtime_failure(&e)
        }
        Err(_) => {
            container.mark_timeout();
            warn!(
                container = %container.id(),
                timeout_secs = timeout.as_secs_f64(),
                "Container timed out"
            );
            ExecutionOutcome::runtime_failure(&DockerError::Timeout {
                seconds: timeout.as_secs_f64(),
            })
        }
    };

    if let Err(e) = container.remove(runtime).await {
        warn!(container = %container.id(), error = %e, "Failed to remove container");
    }

    outcome
}
