//! In-memory container runtime used by unit tests.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::DockerError;
use crate::execution::docker_client::{ContainerConfig, ContainerRuntime};

/// Records every call and answers from canned behaviour.
///
/// Images map to whether they carry the project tool. A container whose
/// command starts with `command -v` is treated as a tool probe and answers
/// from that map; every other container returns the configured run result.
pub(crate) struct MockRuntime {
    images: Mutex<HashMap<String, bool>>,
    build_has_tool: Option<bool>,
    pull_fails: bool,
    run_exit_code: i64,
    run_output: String,
    wait_delay: Option<Duration>,
    fail_create: bool,
    fail_start: bool,
    fail_remove: bool,
    containers: Mutex<Vec<(String, ContainerConfig)>>,
    calls: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl MockRuntime {
    pub(crate) fn new() -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            build_has_tool: None,
            pull_fails: false,
            run_exit_code: 0,
            run_output: String::new(),
            wait_delay: None,
            fail_create: false,
            fail_start: false,
            fail_remove: false,
            containers: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub(crate) fn with_local_image(self, image: &str, has_tool: bool) -> Self {
        self.images
            .lock()
            .expect("lock poisoned")
            .insert(image.to_string(), has_tool);
        self
    }

    /// Builds succeed and produce an image with or without the tool.
    pub(crate) fn with_build(mut self, has_tool: bool) -> Self {
        self.build_has_tool = Some(has_tool);
        self
    }

    pub(crate) fn with_pull_failure(mut self) -> Self {
        self.pull_fails = true;
        self
    }

    pub(crate) fn with_run_result(mut self, exit_code: i64, output: &str) -> Self {
        self.run_exit_code = exit_code;
        self.run_output = output.to_string();
        self
    }

    pub(crate) fn with_wait_delay(mut self, delay: Duration) -> Self {
        self.wait_delay = Some(delay);
        self
    }

    pub(crate) fn with_create_failure(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub(crate) fn with_start_failure(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub(crate) fn with_remove_failure(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock poisoned").clone()
    }

    /// Number of recorded calls whose name starts with `prefix` (e.g. `"pull:"`).
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub(crate) fn created(&self) -> Vec<String> {
        self.ids_for("create:")
    }

    pub(crate) fn removed(&self) -> Vec<String> {
        self.ids_for("remove:")
    }

    /// Configurations of every created container, in creation order.
    pub(crate) fn configs(&self) -> Vec<ContainerConfig> {
        self.containers
            .lock()
            .expect("lock poisoned")
            .iter()
            .map(|(_, config)| config.clone())
            .collect()
    }

    fn ids_for(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|c| c.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("lock poisoned").push(call);
    }

    fn config_for(&self, id: &str) -> Option<ContainerConfig> {
        self.containers
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|(cid, _)| cid == id)
            .map(|(_, config)| config.clone())
    }

    /// `Some(has_tool)` if the container is a tool probe.
    fn probe_answer(&self, id: &str) -> Option<bool> {
        let config = self.config_for(id)?;
        let is_probe = config
            .cmd
            .as_ref()
            .and_then(|cmd| cmd.last())
            .is_some_and(|c| c.starts_with("command -v"));
        if !is_probe {
            return None;
        }
        let images = self.images.lock().expect("lock poisoned");
        Some(images.get(&config.image).copied().unwrap_or(false))
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn image_exists(&self, image: &str) -> bool {
        self.record(format!("inspect:{image}"));
        self.images
            .lock()
            .expect("lock poisoned")
            .contains_key(image)
    }

    async fn build_image(&self, _context_dir: &Path, tag: &str) -> Result<(), DockerError> {
        self.record(format!("build:{tag}"));
        match self.build_has_tool {
            Some(has_tool) => {
                self.images
                    .lock()
                    .expect("lock poisoned")
                    .insert(tag.to_string(), has_tool);
                Ok(())
            }
            None => Err(DockerError::BuildFailed("mock build failure".to_string())),
        }
    }

    async fn pull_image(&self, image: &str) -> Result<(), DockerError> {
        self.record(format!("pull:{image}"));
        if self.pull_fails {
            return Err(DockerError::PullFailed(format!("{image}: mock pull failure")));
        }
        self.images
            .lock()
            .expect("lock poisoned")
            .insert(image.to_string(), true);
        Ok(())
    }

    async fn create_container(&self, config: &ContainerConfig) -> Result<String, DockerError> {
        if self.fail_create {
            return Err(DockerError::RunFailed(
                "Failed to create container: mock".to_string(),
            ));
        }
        let id = format!("mock-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers
            .lock()
            .expect("lock poisoned")
            .push((id.clone(), config.clone()));
        self.record(format!("create:{id}"));
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), DockerError> {
        self.record(format!("start:{id}"));
        if self.fail_start {
            return Err(DockerError::RunFailed(
                "Failed to start container: mock".to_string(),
            ));
        }
        Ok(())
    }

    async fn wait_container(&self, id: &str) -> Result<i64, DockerError> {
        self.record(format!("wait:{id}"));
        if let Some(delay) = self.wait_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(match self.probe_answer(id) {
            Some(true) => 0,
            Some(false) => 1,
            None => self.run_exit_code,
        })
    }

    async fn get_logs(&self, id: &str) -> Result<String, DockerError> {
        self.record(format!("logs:{id}"));
        Ok(match self.probe_answer(id) {
            Some(true) => "/root/.elan/bin/lake\n".to_string(),
            Some(false) => String::new(),
            None => self.run_output.clone(),
        })
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<(), DockerError> {
        self.record(format!("remove:{id}"));
        if self.fail_remove {
            return Err(DockerError::RunFailed(
                "Failed to remove container: mock".to_string(),
            ));
        }
        Ok(())
    }
}
