use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;

use crate::history::RunHistoryStore;
use crate::notifications::NotificationPublisher;
use crate::sandbox::SandboxClient;

/// How scraper runs are laid out in the sandbox.
#[derive(Debug, Clone)]
pub struct SandboxSettings {
    /// Shared image every job runs.
    pub image: String,
    /// Directory the image is built from.
    pub build_context: PathBuf,
    /// Host directory holding one scratch directory per job.
    pub scratch_root: PathBuf,
    /// Where the scratch directory is mounted inside the sandbox.
    pub container_data_path: String,
    /// Where the scraper writes its logs inside the sandbox.
    pub container_log_path: String,
    pub env: Vec<(String, String)>,
}

impl SandboxSettings {
    /// Image identity for this process: `<prefix>_<unix timestamp>`.
    pub fn image_name(prefix: &str, now: DateTime<Utc>) -> String {
        format!("{}_{}", prefix, now.timestamp())
    }
}

/// Collaborators shared by every job of a registry.
#[derive(Clone)]
pub struct JobContext {
    pub sandbox: Arc<dyn SandboxClient>,
    pub history: Arc<dyn RunHistoryStore>,
    pub notifier: Arc<dyn NotificationPublisher>,
    pub settings: Arc<SandboxSettings>,
}

impl JobContext {
    pub fn new(
        sandbox: Arc<dyn SandboxClient>,
        history: Arc<dyn RunHistoryStore>,
        notifier: Arc<dyn NotificationPublisher>,
        settings: SandboxSettings,
    ) -> Self {
        Self {
            sandbox,
            history,
            notifier,
            settings: Arc::new(settings),
        }
    }
}
