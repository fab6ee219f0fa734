//! Execution sandbox contract.
//!
//! The orchestrator only needs to build the shared scraper image once, run
//! a named container to completion, and stop or remove a named container.
//! Everything else about the container runtime stays behind this trait.

mod docker;

pub use docker::DockerCliSandbox;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to launch sandbox command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Sandbox command failed: {0}")]
    CommandFailed(String),
}

/// A host directory mounted inside the sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBind {
    pub host_path: PathBuf,
    pub sandbox_path: String,
}

impl VolumeBind {
    pub fn to_bind_spec(&self) -> String {
        format!("{}:{}", self.host_path.display(), self.sandbox_path)
    }
}

/// Where a run writes its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLocation {
    /// Path handed to the scraper, as seen from inside the sandbox, without
    /// extension. The scraper appends `.json`.
    pub sandbox_stem: String,
    /// The same file as seen from the host once the run is over.
    pub host_file: PathBuf,
}

/// Everything needed to start one sandboxed run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub image: String,
    pub name: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub binds: Vec<VolumeBind>,
    pub output: OutputLocation,
}

/// Result of a finished run. A run is successful only with exit code 0 and
/// no error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub error: Option<String>,
}

impl RunOutcome {
    pub fn success() -> Self {
        Self {
            exit_code: Some(0),
            error: None,
        }
    }

    pub fn failed(exit_code: Option<i32>, error: impl Into<String>) -> Self {
        Self {
            exit_code,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0) && self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
}

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait SandboxClient: Send + Sync {
    /// Build `image` from the given build context directory.
    async fn build_image(&self, image: &str, context: &Path) -> Result<(), SandboxError>;

    /// Run a container to completion.
    ///
    /// May take arbitrarily long. Failures to start the container are
    /// reported in the returned outcome, not as `Err`, so callers handle
    /// every unsuccessful run the same way.
    async fn run(&self, request: RunRequest) -> RunOutcome;

    /// Ask a running container to stop.
    async fn stop(&self, name: &str) -> Result<(), SandboxError>;

    /// Remove a container and its anonymous volumes.
    async fn remove(&self, name: &str) -> Result<RemoveOutcome, SandboxError>;
}

/// Make a string safe to use in container names and file paths.
pub fn sanitize_name(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
