//! Docker API wrapper using the bollard crate.
//!
//! [`ContainerRuntime`] is the narrow set of image and container operations
//! the environment manager needs; [`DockerClient`] implements it against the
//! local Docker daemon.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    StartContainerOptions, WaitContainerOptions,
};
use bollard::image::{BuildImageOptions, CreateImageOptions};
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tracing::debug;

use crate::error::DockerError;

/// A host directory bind-mounted into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    /// Host path.
    pub host_path: PathBuf,
    /// Container path.
    pub container_path: String,
    /// Whether the mount is read-only.
    pub readonly: bool,
}

impl VolumeMount {
    /// Creates a new read-write volume mount.
    pub fn read_write(host: impl Into<PathBuf>, container: impl Into<String>) -> Self {
        Self {
            host_path: host.into(),
            container_path: container.into(),
            readonly: false,
        }
    }

    /// Returns the Docker bind string (`host:container:rw`).
    pub fn to_bind(&self) -> String {
        let mode = if self.readonly { "ro" } else { "rw" };
        format!(
            "{}:{}:{}",
            self.host_path.display(),
            self.container_path,
            mode
        )
    }
}

/// Configuration for creating a new container.
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Unique name for the container.
    pub name: String,
    /// Docker image to use.
    pub image: String,
    /// Command to run in the container.
    pub cmd: Option<Vec<String>>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Volume mounts.
    pub volumes: Vec<VolumeMount>,
}

impl ContainerConfig {
    /// Creates a new container configuration with the given name and image.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            cmd: None,
            working_dir: None,
            volumes: Vec::new(),
        }
    }

    /// Sets the command to run in the container.
    pub fn with_cmd(mut self, cmd: Vec<String>) -> Self {
        self.cmd = Some(cmd);
        self
    }

    /// Sets the working directory.
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Adds volume mounts.
    pub fn with_volumes(mut self, volumes: Vec<VolumeMount>) -> Self {
        self.volumes = volumes;
        self
    }

    /// Bind strings in the form the Docker API expects.
    pub fn binds(&self) -> Option<Vec<String>> {
        if self.volumes.is_empty() {
            None
        } else {
            Some(self.volumes.iter().map(VolumeMount::to_bind).collect())
        }
    }
}

/// Image and container operations needed to run one-shot commands.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Checks if an image exists locally.
    async fn image_exists(&self, image: &str) -> bool;

    /// Builds an image from a directory containing a `Dockerfile` and tags it.
    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), DockerError>;

    /// Pulls an image from a registry.
    async fn pull_image(&self, image: &str) -> Result<(), DockerError>;

    /// Creates a container and returns its ID. The container is not started.
    async fn create_container(&self, config: &ContainerConfig) -> Result<String, DockerError>;

    /// Starts a created container.
    async fn start_container(&self, id: &str) -> Result<(), DockerError>;

    /// Blocks until the container stops and returns its exit code.
    async fn wait_container(&self, id: &str) -> Result<i64, DockerError>;

    /// Returns stdout and stderr in the order the daemon recorded them.
    async fn get_logs(&self, id: &str) -> Result<String, DockerError>;

    /// Removes a container, killing it first when `force` is set.
    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError>;
}

/// Docker client wrapper for container operations.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Creates a client for the local Docker daemon without contacting it.
    ///
    /// # Errors
    ///
    /// Returns `DockerError::DaemonUnavailable` if no local socket configuration is usable.
    pub fn new() -> Result<Self, DockerError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| DockerError::DaemonUnavailable(format!("Failed to connect: {e}")))?;

        Ok(Self { docker })
    }

    /// Creates a client and verifies the daemon answers a ping.
    pub async fn connect() -> Result<Self, DockerError> {
        let client = Self::new()?;
        client.ping().await?;
        Ok(client)
    }

    /// Creates a new Docker client from an existing bollard Docker instance.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }

    /// Pings the daemon.
    pub async fn ping(&self) -> Result<(), DockerError> {
        self.docker
            .ping()
            .await
            .map_err(|e| DockerError::DaemonUnavailable(format!("Ping failed: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for DockerClient {
    async fn image_exists(&self, image: &str) -> bool {
        self.docker.inspect_image(image).await.is_ok()
    }

    async fn build_image(&self, context_dir: &Path, tag: &str) -> Result<(), DockerError> {
        let dir = context_dir.to_path_buf();
        let context = tokio::task::spawn_blocking(move || pack_build_context(&dir))
            .await
            .map_err(|e| DockerError::BuildFailed(format!("Context packing aborted: {e}")))??;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: tag.to_string(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(options, None, Some(context.into()));

        while let Some(chunk) = stream.next().await {
            let info = chunk.map_err(|e| DockerError::BuildFailed(e.to_string()))?;
            if let Some(error) = info.error {
                return Err(DockerError::BuildFailed(error));
            }
            if let Some(line) = info.stream {
                let line = line.trim_end();
                if !line.is_empty() {
                    debug!(tag = tag, "{}", line);
                }
            }
        }

        Ok(())
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            result.map_err(|e| DockerError::PullFailed(format!("{image}: {e}")))?;
        }

        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String, DockerError> {
        let host_config = HostConfig {
            binds: config.binds(),
            ..Default::default()
        };

        let container_config = Config {
            image: Some(config.image.clone()),
            cmd: config.cmd.clone(),
            working_dir: config.working_dir.clone(),
            host_config: Some(host_config),
            tty: Some(false),
            attach_stdin: Some(false),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: config.name.clone(),
            platform: None,
        };

        let response = self
            .docker
            .create_container(Some(options), container_config)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to create container: {e}")))?;

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| DockerError::RunFailed(format!("Failed to start container: {e}")))?;

        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit status as an error carrying the code.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(DockerError::RunFailed(format!(
                "Error waiting for container: {e}"
            ))),
            None => Err(DockerError::ContainerNotFound { id: id.to_string() }),
        }
    }

    async fn get_logs(&self, id: &str) -> Result<String, DockerError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            timestamps: false,
            ..Default::default()
        };

        let mut logs = self.docker.logs(id, Some(options));
        let mut frames = Vec::new();

        while let Some(chunk) = logs.next().await {
            let frame =
                chunk.map_err(|e| DockerError::RunFailed(format!("Error reading logs: {e}")))?;
            frames.push(frame);
        }

        Ok(join_log_frames(frames))
    }

    async fn remove_container(&self, id: &str, force: bool) -> Result<(), DockerError> {
        let options = RemoveContainerOptions {
            force,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(id, Some(options))
            .await
            .map_err(|e| {
                if e.to_string().contains("No such container") {
                    DockerError::ContainerNotFound { id: id.to_string() }
                } else {
                    DockerError::RunFailed(format!("Failed to remove container: {e}"))
                }
            })?;

        Ok(())
    }
}

/// Concatenates output frames in arrival order and decodes them once.
///
/// Frames may split a multi-byte character, so bytes are joined before decoding.
fn join_log_frames(frames: Vec<LogOutput>) -> String {
    let mut bytes = Vec::new();
    for frame in frames {
        match frame {
            LogOutput::StdOut { message }
            | LogOutput::StdErr { message }
            | LogOutput::Console { message } => bytes.extend_from_slice(&message),
            LogOutput::StdIn { .. } => {}
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Packs a build context directory into an uncompressed tar archive.
fn pack_build_context(dir: &Path) -> Result<Vec<u8>, DockerError> {
    if !dir.join("Dockerfile").is_file() {
        return Err(DockerError::BuildFailed(format!(
            "No Dockerfile in {}",
            dir.display()
        )));
    }

    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(true);
    builder.append_dir_all(".", dir)?;
    Ok(builder.into_inner()?)
}
