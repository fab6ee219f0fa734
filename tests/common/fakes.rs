//! In-process stand-ins for the sandbox, the notifier and the history store

use async_trait::async_trait;
use scrape_orchestrator::history::{HistoryError, InMemoryRunHistoryStore, RunHistoryStore};
use scrape_orchestrator::notifications::{
    Digest, LiveChannel, NotificationPublisher, NotifyError,
};
use scrape_orchestrator::sandbox::{
    RemoveOutcome, RunOutcome, RunRequest, SandboxClient, SandboxError,
};
use scrape_orchestrator::ResultRecord;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::fixtures::record;

/// What the next sandbox run does.
#[derive(Debug, Clone)]
pub enum Step {
    /// Exit 0 after writing these records.
    Records(Vec<ResultRecord>),
    /// Exit 0 after writing one record never seen before.
    Fresh,
    /// Exit with a non-zero code, writing nothing.
    Exit(i32),
    /// Report an error instead of an exit code.
    Error(String),
    /// Exit 0 without writing any output.
    NoOutput,
}

/// Sandbox that plays a script instead of running containers.
pub struct ScriptedSandbox {
    script: Mutex<VecDeque<Step>>,
    default_step: Mutex<Step>,
    delay: Mutex<Duration>,
    fresh_counter: AtomicUsize,

    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight_per_name: AtomicUsize,
    completed_runs: AtomicUsize,

    pub requests: Mutex<Vec<RunRequest>>,
    pub stops: Mutex<Vec<String>>,
    pub removes: Mutex<Vec<String>>,
    pub builds: AtomicUsize,
    pub fail_build: AtomicBool,
    pub fail_remove: AtomicBool,
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default_step: Mutex::new(Step::Records(vec![])),
            delay: Mutex::new(Duration::ZERO),
            fresh_counter: AtomicUsize::new(0),
            in_flight: Mutex::new(HashMap::new()),
            max_in_flight_per_name: AtomicUsize::new(0),
            completed_runs: AtomicUsize::new(0),
            requests: Mutex::new(vec![]),
            stops: Mutex::new(vec![]),
            removes: Mutex::new(vec![]),
            builds: AtomicUsize::new(0),
            fail_build: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }
}

impl ScriptedSandbox {
    pub fn push(&self, step: Step) {
        self.script.lock().unwrap().push_back(step);
    }

    pub fn set_default(&self, step: Step) {
        *self.default_step.lock().unwrap() = step;
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Runs currently in flight, across every sandbox name.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().values().sum()
    }

    /// Highest number of simultaneous runs observed for a single name.
    pub fn max_in_flight_per_name(&self) -> usize {
        self.max_in_flight_per_name.load(Ordering::SeqCst)
    }

    pub fn started_runs(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn completed_runs(&self) -> usize {
        self.completed_runs.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let scripted = self.script.lock().unwrap().pop_front();
        let step = scripted.unwrap_or_else(|| self.default_step.lock().unwrap().clone());
        match step {
            Step::Fresh => {
                let n = self.fresh_counter.fetch_add(1, Ordering::SeqCst);
                Step::Records(vec![record(&format!("fresh-{}", n), 150.0)])
            }
            other => other,
        }
    }

    fn enter(&self, name: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(name.to_string()).or_insert(0);
        *count += 1;
        self.max_in_flight_per_name
            .fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, name: &str) {
        let mut in_flight = self.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(name) {
            *count -= 1;
        }
        self.completed_runs.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SandboxClient for ScriptedSandbox {
    async fn build_image(&self, _image: &str, _context: &Path) -> Result<(), SandboxError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self.fail_build.load(Ordering::SeqCst) {
            return Err(SandboxError::CommandFailed("build failed".to_string()));
        }
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> RunOutcome {
        self.requests.lock().unwrap().push(request.clone());
        self.enter(&request.name);

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = match self.next_step() {
            Step::Records(records) => {
                let file = &request.output.host_file;
                if let Some(parent) = file.parent() {
                    std::fs::create_dir_all(parent).unwrap();
                }
                std::fs::write(file, serde_json::to_vec(&records).unwrap()).unwrap();
                RunOutcome::success()
            }
            Step::Exit(code) => RunOutcome {
                exit_code: Some(code),
                error: None,
            },
            Step::Error(message) => RunOutcome::failed(None, message),
            Step::NoOutput => RunOutcome::success(),
            Step::Fresh => unreachable!("resolved by next_step"),
        };

        self.leave(&request.name);
        outcome
    }

    async fn stop(&self, name: &str) -> Result<(), SandboxError> {
        self.stops.lock().unwrap().push(name.to_string());
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<RemoveOutcome, SandboxError> {
        self.removes.lock().unwrap().push(name.to_string());
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(SandboxError::CommandFailed("daemon unavailable".to_string()));
        }
        Ok(RemoveOutcome::AlreadyAbsent)
    }
}

/// Notifier that records everything and forwards publishes to a live channel.
pub struct RecordingNotifier {
    live: Arc<LiveChannel>,
    pub published: Mutex<Vec<(String, Vec<ResultRecord>)>>,
    pub digests: Mutex<Vec<Digest>>,
    pub closed: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn new(live: Arc<LiveChannel>) -> Self {
        Self {
            live,
            published: Mutex::new(vec![]),
            digests: Mutex::new(vec![]),
            closed: Mutex::new(vec![]),
            fail: AtomicBool::new(false),
        }
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    fn check_failure(&self) -> Result<(), NotifyError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Rejected {
                status: 500,
                body: "notifier down".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationPublisher for RecordingNotifier {
    async fn publish(&self, job_id: &str, records: &[ResultRecord]) -> Result<usize, NotifyError> {
        self.check_failure()?;
        self.published
            .lock()
            .unwrap()
            .push((job_id.to_string(), records.to_vec()));
        let payload = serde_json::to_string(records)?;
        Ok(self
            .live
            .publish(&LiveChannel::topic_for_job(job_id), payload)
            .await)
    }

    async fn digest(&self, digest: Digest) -> Result<(), NotifyError> {
        self.check_failure()?;
        self.digests.lock().unwrap().push(digest);
        Ok(())
    }

    async fn close(&self, job_id: &str) {
        self.closed.lock().unwrap().push(job_id.to_string());
        self.live
            .close_topic(&LiveChannel::topic_for_job(job_id))
            .await;
    }
}

/// In-memory history whose writes can be made to fail or to lag.
#[derive(Default)]
pub struct FlakyHistoryStore {
    pub inner: InMemoryRunHistoryStore,
    pub cumulative_write_delay: Mutex<Duration>,
    pub fail_cumulative_write: AtomicBool,
    pub fail_artifact_write: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyHistoryStore {
    fn injected(&self, what: &str) -> HistoryError {
        HistoryError::Io {
            path: what.into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "injected failure"),
        }
    }
}

#[async_trait]
impl RunHistoryStore for FlakyHistoryStore {
    async fn read_cumulative(&self, job_id: &str) -> Result<Vec<ResultRecord>, HistoryError> {
        self.inner.read_cumulative(job_id).await
    }

    async fn write_cumulative(
        &self,
        job_id: &str,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        let delay = *self.cumulative_write_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_cumulative_write.load(Ordering::SeqCst) {
            return Err(self.injected("out.json"));
        }
        self.inner.write_cumulative(job_id, records).await
    }

    async fn write_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        if self.fail_artifact_write.load(Ordering::SeqCst) {
            return Err(self.injected("new.json"));
        }
        self.inner
            .write_run_artifact(job_id, run_number, records)
            .await
    }

    async fn read_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
    ) -> Result<Vec<ResultRecord>, HistoryError> {
        self.inner.read_run_artifact(job_id, run_number).await
    }

    async fn delete_all(&self, job_id: &str) -> Result<(), HistoryError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(self.injected(job_id));
        }
        self.inner.delete_all(job_id).await
    }
}
