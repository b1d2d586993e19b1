//! Provisioning and command execution for the Lean runtime.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::environment::config::{RuntimeConfig, CACHE_MOUNT, WORKSPACE_MOUNT};
use crate::error::EnvironmentError;
use crate::execution::{run_ephemeral, ContainerConfig, ContainerRuntime, ExecutionOutcome, VolumeMount};

/// Default timeout for [`EnvironmentManager::run_command`] callers without an opinion.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(180);

/// Timeout for the project-tool probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Owns the container runtime, the persistent directories and the resolved image.
pub struct EnvironmentManager<R: ContainerRuntime> {
    runtime: R,
    config: RuntimeConfig,
    runtime_image: OnceCell<String>,
}

impl<R: ContainerRuntime> EnvironmentManager<R> {
    /// Creates a manager over an already connected runtime.
    ///
    /// Relative paths in `config` are resolved against the current directory.
    /// Nothing is created on disk until [`provision`](Self::provision).
    pub fn new(runtime: R, config: RuntimeConfig) -> Result<Self, EnvironmentError> {
        Ok(Self {
            runtime,
            config: config.absolutized()?,
            runtime_image: OnceCell::new(),
        })
    }

    /// Prepares the workspace, the cache and a usable image.
    ///
    /// Idempotent: the manifest is never overwritten and image resolution
    /// runs at most once successfully per manager.
    pub async fn provision(&self) -> Result<(), EnvironmentError> {
        info!("Checking Lean environment");
        self.ensure_workspace().await?;
        self.ensure_cache().await?;

        let image = self
            .runtime_image
            .get_or_try_init(|| self.resolve_image())
            .await?;

        info!(image = %image, "Lean environment ready");
        Ok(())
    }

    /// Runs `command` through `bash -lc` in a fresh container with the
    /// workspace and cache mounted.
    ///
    /// Never fails; see [`run_ephemeral`].
    pub async fn run_command(&self, command: &str, timeout: Duration) -> ExecutionOutcome {
        let config = ContainerConfig::new(container_name(), self.image())
            .with_cmd(shell(command))
            .with_working_dir(WORKSPACE_MOUNT)
            .with_volumes(self.mounts());

        debug!(image = %config.image, command = command, timeout_secs = timeout.as_secs(), "Running command");
        let outcome = run_ephemeral(&self.runtime, &config, timeout).await;
        debug!(exit_code = outcome.exit_code, output_len = outcome.output.len(), "Command finished");

        outcome
    }

    /// Absolute path of the workspace directory.
    pub fn workspace_path(&self) -> &Path {
        &self.config.workspace_path
    }

    /// Absolute path of the cache directory.
    pub fn cache_path(&self) -> &Path {
        &self.config.cache_path
    }

    /// The image resolved by provisioning, if any.
    pub fn runtime_image(&self) -> Option<&str> {
        self.runtime_image.get().map(String::as_str)
    }

    /// The underlying container runtime.
    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// The configuration in use (with absolute paths).
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Deletes the whole workspace tree. Never called automatically.
    pub async fn cleanup(&self) -> Result<(), EnvironmentError> {
        let path = self.workspace_path();
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {
                info!(path = %path.display(), "Workspace removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(directory_error(path, e)),
        }
    }

    fn image(&self) -> String {
        self.runtime_image
            .get()
            .cloned()
            .unwrap_or_else(|| self.config.image_name.clone())
    }

    fn mounts(&self) -> Vec<VolumeMount> {
        vec![
            VolumeMount::read_write(&self.config.workspace_path, WORKSPACE_MOUNT),
            VolumeMount::read_write(self.config.dependency_cache_path(), CACHE_MOUNT),
        ]
    }

    async fn ensure_workspace(&self) -> Result<(), EnvironmentError> {
        let workspace = self.workspace_path();
        tokio::fs::create_dir_all(workspace)
            .await
            .map_err(|e| directory_error(workspace, e))?;

        let manifest = self.config.manifest_path();
        let created = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&manifest)
            .await;

        match created {
            Ok(file) => {
                fill_new_file(file, &manifest, self.config.manifest_contents().as_bytes())
                    .await
                    .map_err(|e| directory_error(&manifest, e))?;
                info!(path = %workspace.display(), "Lean workspace initialized");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(directory_error(&manifest, e)),
        }
    }

    async fn ensure_cache(&self) -> Result<(), EnvironmentError> {
        let nested = self.config.dependency_cache_path();
        tokio::fs::create_dir_all(&nested)
            .await
            .map_err(|e| directory_error(&nested, e))
    }

    async fn resolve_image(&self) -> Result<String, EnvironmentError> {
        let image = &self.config.image_name;
        let tool = &self.config.project_tool;

        if self.runtime.image_exists(image).await {
            info!(image = %image, "Local image found");
            if self.has_project_tool(image).await {
                return Ok(image.clone());
            }
            warn!(image = %image, tool = %tool, "Local image lacks project tool, trying alternatives");
        }

        let dockerfile = self.config.dockerfile_path();
        if tokio::fs::try_exists(&dockerfile).await.unwrap_or(false) {
            info!(image = %image, context = %self.config.build_context.display(), "Building local image");
            match self.runtime.build_image(&self.config.build_context, image).await {
                Ok(()) => {
                    if self.has_project_tool(image).await {
                        return Ok(image.clone());
                    }
                    warn!(image = %image, tool = %tool, "Built image lacks project tool, using fallback");
                }
                Err(e) => warn!(image = %image, error = %e, "Local build failed"),
            }
        }

        let fallback = &self.config.fallback_image;
        info!(image = %fallback, "Using fallback image");
        self.runtime.pull_image(fallback).await.map_err(|e| {
            EnvironmentError::ImageResolution {
                image: image.clone(),
                fallback: fallback.clone(),
                reason: e.to_string(),
            }
        })?;

        Ok(fallback.clone())
    }

    /// True if `command -v <tool>` succeeds with output in a throwaway container.
    async fn has_project_tool(&self, image: &str) -> bool {
        let config = ContainerConfig::new(container_name(), image)
            .with_cmd(shell(&self.config.probe_command()));
        let outcome = run_ephemeral(&self.runtime, &config, PROBE_TIMEOUT).await;
        let found = outcome.exit_code == 0 && !outcome.output.trim().is_empty();
        debug!(image = image, found = found, "Project tool probe");
        found
    }
}

fn shell(command: &str) -> Vec<String> {
    vec!["bash".to_string(), "-lc".to_string(), command.to_string()]
}

fn container_name() -> String {
    format!("lean-forge-{}", Uuid::new_v4())
}

/// Writes `contents` into a file this call just created.
///
/// On failure the partial file is removed, so the next attempt starts clean
/// instead of finding a truncated file that already exists.
async fn fill_new_file<W: AsyncWrite + Unpin>(
    mut file: W,
    path: &Path,
    contents: &[u8],
) -> std::io::Result<()> {
    let written = async {
        file.write_all(contents).await?;
        file.flush().await
    }
    .await;

    if written.is_err() {
        drop(file);
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
    }
    written
}

fn directory_error(path: &Path, source: std::io::Error) -> EnvironmentError {
    EnvironmentError::Directory {
        path: PathBuf::from(path).display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::mock::MockRuntime;
    use tempfile::TempDir;

    const IMAGE: &str = "lean-forge:test";
    const FALLBACK: &str = "leanprover/lean4:test";

    fn config(dir: &TempDir) -> RuntimeConfig {
        RuntimeConfig::new()
            .with_image(IMAGE)
            .with_fallback_image(FALLBACK)
            .with_workspace(dir.path().join("ws"))
            .with_cache(dir.path().join("cache"))
            .with_build_context(dir.path().join("docker"))
    }

    /// Accepts nothing: every write fails as on a full disk.
    struct FullDisk;

    impl AsyncWrite for FullDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("no space left on device")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    fn write_dockerfile(dir: &TempDir) {
        let docker = dir.path().join("docker");
        std::fs::create_dir_all(&docker).expect("mkdir");
        std::fs::write(docker.join("Dockerfile"), "FROM ubuntu:22.04\n").expect("write");
    }

    #[tokio::test]
    async fn test_provision_creates_directories_and_manifest() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new().with_local_image(IMAGE, true), config(&dir))
            .expect("manager");

        env.provision().await.expect("provision");

        assert!(dir.path().join("ws/lakefile.lean").is_file());
        assert!(dir.path().join("cache/.cache").is_dir());
        assert!(env.workspace_path().is_absolute());
    }

    #[tokio::test]
    async fn test_provision_never_overwrites_manifest() {
        let dir = TempDir::new().expect("tempdir");
        let ws = dir.path().join("ws");
        std::fs::create_dir_all(&ws).expect("mkdir");
        std::fs::write(ws.join("lakefile.lean"), "-- custom manifest\n").expect("write");

        let env = EnvironmentManager::new(MockRuntime::new().with_local_image(IMAGE, true), config(&dir))
            .expect("manager");
        env.provision().await.expect("provision");

        let manifest = std::fs::read_to_string(ws.join("lakefile.lean")).expect("read");
        assert_eq!(manifest, "-- custom manifest\n");
    }

    #[tokio::test]
    async fn test_local_image_with_tool_is_used() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new().with_local_image(IMAGE, true), config(&dir))
            .expect("manager");

        env.provision().await.expect("provision");

        assert_eq!(env.runtime_image(), Some(IMAGE));
        assert_eq!(env.runtime.count("build:"), 0);
        assert_eq!(env.runtime.count("pull:"), 0);
        // The probe container is removed like any other.
        assert_eq!(env.runtime.removed(), env.runtime.created());
    }

    #[tokio::test]
    async fn test_provision_twice_resolves_once() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new(), config(&dir)).expect("manager");

        env.provision().await.expect("first provision");
        env.provision().await.expect("second provision");

        assert_eq!(env.runtime_image(), Some(FALLBACK));
        assert_eq!(env.runtime.count("pull:"), 1);
        assert_eq!(env.runtime.count("inspect:"), 1);
    }

    #[tokio::test]
    async fn test_local_image_without_tool_falls_through_to_build() {
        let dir = TempDir::new().expect("tempdir");
        write_dockerfile(&dir);
        let runtime = MockRuntime::new().with_local_image(IMAGE, false).with_build(true);
        let env = EnvironmentManager::new(runtime, config(&dir)).expect("manager");

        env.provision().await.expect("provision");

        assert_eq!(env.runtime_image(), Some(IMAGE));
        assert_eq!(env.runtime.count("build:"), 1);
        assert_eq!(env.runtime.count("pull:"), 0);
    }

    #[tokio::test]
    async fn test_built_image_without_tool_uses_fallback() {
        let dir = TempDir::new().expect("tempdir");
        write_dockerfile(&dir);
        let env = EnvironmentManager::new(MockRuntime::new().with_build(false), config(&dir))
            .expect("manager");

        env.provision().await.expect("provision");

        assert_eq!(env.runtime_image(), Some(FALLBACK));
        assert_eq!(env.runtime.count("build:"), 1);
        assert_eq!(env.runtime.count("pull:"), 1);
    }

    #[tokio::test]
    async fn test_build_failure_uses_fallback() {
        let dir = TempDir::new().expect("tempdir");
        write_dockerfile(&dir);
        let env = EnvironmentManager::new(MockRuntime::new(), config(&dir)).expect("manager");

        env.provision().await.expect("provision");

        assert_eq!(env.runtime_image(), Some(FALLBACK));
    }

    #[tokio::test]
    async fn test_no_build_definition_skips_build() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new().with_build(true), config(&dir))
            .expect("manager");

        env.provision().await.expect("provision");

        assert_eq!(env.runtime.count("build:"), 0);
        assert_eq!(env.runtime_image(), Some(FALLBACK));
    }

    #[tokio::test]
    async fn test_exhausted_resolution_is_fatal_and_retryable() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new().with_pull_failure(), config(&dir))
            .expect("manager");

        let err = env.provision().await.expect_err("pull failure is fatal");
        assert!(matches!(err, EnvironmentError::ImageResolution { .. }));
        assert_eq!(env.runtime_image(), None);

        // A failed resolution leaves nothing cached, so the next call tries again.
        let _ = env.provision().await;
        assert_eq!(env.runtime.count("pull:"), 2);
    }

    #[tokio::test]
    async fn test_run_command_mounts_workspace_and_cache() {
        let dir = TempDir::new().expect("tempdir");
        let runtime = MockRuntime::new()
            .with_local_image(IMAGE, true)
            .with_run_result(0, "Lean (version 4.11.0)\n");
        let env = EnvironmentManager::new(runtime, config(&dir)).expect("manager");
        env.provision().await.expect("provision");

        let outcome = env.run_command("lean --version", DEFAULT_COMMAND_TIMEOUT).await;

        assert_eq!(outcome.exit_code, 0);
        let last = env.runtime.configs().pop().expect("container created");
        assert_eq!(last.image, IMAGE);
        assert_eq!(last.working_dir.as_deref(), Some(WORKSPACE_MOUNT));
        assert_eq!(
            last.cmd,
            Some(vec!["bash".to_string(), "-lc".to_string(), "lean --version".to_string()])
        );
        let binds = last.binds().expect("binds");
        assert_eq!(binds.len(), 2);
        assert!(binds[0].ends_with("/ws:/workspace:rw"));
        assert!(binds[1].ends_with("/cache/.cache:/root/.cache:rw"));
    }

    #[tokio::test]
    async fn test_run_command_timeout_is_data_and_removes_container() {
        let dir = TempDir::new().expect("tempdir");
        let runtime = MockRuntime::new().with_wait_delay(Duration::from_secs(30));
        let env = EnvironmentManager::new(runtime, config(&dir)).expect("manager");

        let outcome = env.run_command("lean check.lean", Duration::from_millis(50)).await;

        assert_eq!(outcome.exit_code, -1);
        assert!(outcome.output.contains("timed out"));
        assert_eq!(env.runtime.removed(), env.runtime.created());
    }

    #[tokio::test]
    async fn test_cleanup_removes_workspace() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new().with_local_image(IMAGE, true), config(&dir))
            .expect("manager");
        env.provision().await.expect("provision");

        env.cleanup().await.expect("cleanup");
        assert!(!dir.path().join("ws").exists());
        // Cleaning an absent workspace is fine.
        env.cleanup().await.expect("second cleanup");
        assert!(dir.path().join("cache").exists());
    }

    #[tokio::test]
    async fn test_failed_manifest_write_leaves_no_partial_file() {
        let dir = TempDir::new().expect("tempdir");
        let env = EnvironmentManager::new(MockRuntime::new().with_local_image(IMAGE, true), config(&dir))
            .expect("manager");
        let manifest = env.config().manifest_path();
        std::fs::create_dir_all(env.workspace_path()).expect("mkdir");
        std::fs::write(&manifest, "import La").expect("partial write");

        let err = fill_new_file(FullDisk, &manifest, env.config().manifest_contents().as_bytes())
            .await
            .expect_err("write must fail");
        assert!(err.to_string().contains("no space left"));
        assert!(!manifest.exists());

        env.provision().await.expect("provision");
        let seeded = std::fs::read_to_string(&manifest).expect("manifest");
        assert_eq!(seeded, env.config().manifest_contents());
    }
}
