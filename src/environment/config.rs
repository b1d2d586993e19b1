//! Configuration for the Lean execution environment.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Image built locally from the bundled Dockerfile.
pub const DEFAULT_IMAGE: &str = "lean-forge:lean4-v4.11.0";

/// Known-good upstream image used when no local image is usable.
pub const DEFAULT_FALLBACK_IMAGE: &str = "leanprover/lean4:v4.11.0";

/// Default workspace directory, relative to the current directory.
pub const DEFAULT_WORKSPACE: &str = "./lean_workspace";

/// Default directory holding the Dockerfile for local image builds.
pub const DEFAULT_BUILD_CONTEXT: &str = "./docker";

/// Mount point of the workspace inside every container.
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// Mount point of the dependency cache inside every container.
pub const CACHE_MOUNT: &str = "/root/.cache";

/// Name of the project manifest seeded into the workspace.
pub const MANIFEST_FILE: &str = "lakefile.lean";

/// Where the runtime lives on the host and which tools to call inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Preferred image tag (used if present locally or buildable).
    pub image_name: String,
    /// Image pulled when the preferred one is unusable.
    pub fallback_image: String,
    /// Persistent workspace holding the manifest and staged sources.
    pub workspace_path: PathBuf,
    /// Persistent cache holding downloaded and compiled dependencies.
    pub cache_path: PathBuf,
    /// Directory with a `Dockerfile` used to build `image_name`.
    pub build_context: PathBuf,
    /// Project-aware tool expected on the image's PATH.
    pub project_tool: String,
    /// Verifier binary used when the project tool is missing.
    pub verifier_binary: String,
    /// Package name written into the seeded manifest.
    pub package_name: String,
}

impl RuntimeConfig {
    /// Creates a configuration with the default images and tools.
    pub fn new() -> Self {
        Self {
            image_name: DEFAULT_IMAGE.to_string(),
            fallback_image: DEFAULT_FALLBACK_IMAGE.to_string(),
            workspace_path: PathBuf::from(DEFAULT_WORKSPACE),
            cache_path: default_cache_path(),
            build_context: PathBuf::from(DEFAULT_BUILD_CONTEXT),
            project_tool: "lake".to_string(),
            verifier_binary: "lean".to_string(),
            package_name: "lean_forge_workspace".to_string(),
        }
    }

    /// Sets the preferred image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image_name = image.into();
        self
    }

    /// Sets the fallback image.
    pub fn with_fallback_image(mut self, image: impl Into<String>) -> Self {
        self.fallback_image = image.into();
        self
    }

    /// Sets the workspace directory.
    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace_path = path.into();
        self
    }

    /// Sets the cache directory.
    pub fn with_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }

    /// Sets the build context directory.
    pub fn with_build_context(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_context = path.into();
        self
    }

    /// Sets the project tool and verifier binary.
    pub fn with_tools(mut self, project_tool: impl Into<String>, verifier: impl Into<String>) -> Self {
        self.project_tool = project_tool.into();
        self.verifier_binary = verifier.into();
        self
    }

    /// Gets the manifest path inside the workspace.
    pub fn manifest_path(&self) -> PathBuf {
        self.workspace_path.join(MANIFEST_FILE)
    }

    /// Gets the host side of the dependency-cache mount.
    pub fn dependency_cache_path(&self) -> PathBuf {
        self.cache_path.join(".cache")
    }

    /// Gets the Dockerfile path inside the build context.
    pub fn dockerfile_path(&self) -> PathBuf {
        self.build_context.join("Dockerfile")
    }

    /// Contents of the manifest seeded on first provisioning.
    pub fn manifest_contents(&self) -> String {
        format!(
            "import Lake\nopen Lake DSL\npackage \"{}\" {{}}\n",
            self.package_name
        )
    }

    /// Shell command checking whether the project tool is on PATH.
    pub fn probe_command(&self) -> String {
        format!("command -v {}", self.project_tool)
    }

    /// Shell command checking `file_name`, preferring the project tool.
    ///
    /// The fallback is inlined so a single container run covers both cases.
    pub fn verifier_command(&self, file_name: &str) -> String {
        let tool = &self.project_tool;
        let lean = &self.verifier_binary;
        format!(
            "if command -v {tool} >/dev/null 2>&1; then {tool} env {lean} {file_name}; else {lean} {file_name}; fi"
        )
    }

    /// Resolves relative paths against the current directory.
    pub fn absolutized(mut self) -> std::io::Result<Self> {
        self.workspace_path = absolute(&self.workspace_path)?;
        self.cache_path = absolute(&self.cache_path)?;
        self.build_context = absolute(&self.build_context)?;
        Ok(self)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        std::path::absolute(path)
    }
}

fn default_cache_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".cache").join("lean-forge")
}
