//! Docker execution layer for lean-forge.
//!
//! This module provides the container runtime boundary using the bollard
//! crate and the one-shot container lifecycle built on top of it.
//!
//! # Architecture
//!
//! Every command gets its own container:
//! ```text
//! CREATE → START → WAIT (bounded) → LOGS → FORCE REMOVE
//! ```
//! Removal happens on every path, including timeouts and runtime errors.
//!
//! # Example
//!
//! ```ignore
//! use lean_forge::execution::{run_ephemeral, ContainerConfig, DockerClient};
//!
//! let client = DockerClient::connect().await?;
//! let config = ContainerConfig::new("lean-forge-probe", "leanprover/lean4:v4.11.0")
//!     .with_cmd(vec!["bash".into(), "-lc".into(), "lean --version".into()]);
//! let outcome = run_ephemeral(&client, &config, Duration::from_secs(60)).await;
//! println!("{} {}", outcome.exit_code, outcome.output);
//! ```

pub mod container;
pub mod docker_client;
#[cfg(test)]
pub(crate) mod mock;

pub use container::{
    run_ephemeral, ContainerStatus, EphemeralContainer, ExecutionOutcome,
    RUNTIME_FAILURE_EXIT_CODE,
};
pub use docker_client::{ContainerConfig, ContainerRuntime, DockerClient, VolumeMount};
