//! Registry wired to in-process fakes

use super::constants::*;
use super::fakes::{FlakyHistoryStore, RecordingNotifier, ScriptedSandbox};
use scrape_orchestrator::jobs::{JobContext, JobRegistry, SandboxSettings};
use scrape_orchestrator::notifications::LiveChannel;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestHarness {
    pub registry: Arc<JobRegistry>,
    pub sandbox: Arc<ScriptedSandbox>,
    pub history: Arc<FlakyHistoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub live: Arc<LiveChannel>,
    pub scratch: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        let scratch = TempDir::new().expect("Failed to create scratch dir");
        let sandbox = Arc::new(ScriptedSandbox::default());
        let history = Arc::new(FlakyHistoryStore::default());
        let live = Arc::new(LiveChannel::new());
        let notifier = Arc::new(RecordingNotifier::new(live.clone()));

        let settings = SandboxSettings {
            image: TEST_IMAGE.to_string(),
            build_context: scratch.path().join("build"),
            scratch_root: scratch.path().join("scratch"),
            container_data_path: "/usr/app/data".to_string(),
            container_log_path: "/usr/app/log".to_string(),
            env: vec![("CONCURRENT_REQUESTS".to_string(), "32".to_string())],
        };

        let registry = Arc::new(JobRegistry::new(JobContext::new(
            sandbox.clone(),
            history.clone(),
            notifier.clone(),
            settings,
        )));

        Self {
            registry,
            sandbox,
            history,
            notifier,
            live,
            scratch,
        }
    }
}

/// Poll `condition` until it holds, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    let start = std::time::Instant::now();
    while !condition() {
        if start.elapsed() > WAIT_TIMEOUT {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
