use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::context::JobContext;
use super::error::JobError;
use super::events::{EventLog, JobEvent, JobEventKind};
use super::spec::JobSpec;
use super::state::{apply, JobState, Signal, Transition};
use crate::notifications::{Attachment, Digest};
use crate::records::{diff, records_to_csv, ResultRecord};
use crate::sandbox::{sanitize_name, OutputLocation, RemoveOutcome, RunRequest, VolumeBind};
use crate::server::metrics;

/// Result of looking up a past run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunLookup {
    /// The run has not completed with new records yet.
    NotYetRun,
    Completed(Vec<ResultRecord>),
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickReport {
    /// The job was not running or a run was already in flight.
    Skipped,
    /// The sandbox run failed or its output could not be read.
    Failed { run_number: u64, reason: String },
    NoNewRecords { run_number: u64 },
    NewRecords { run_number: u64, count: usize },
    PersistenceFailed { run_number: u64, reason: String },
    /// The job was removed while the sandbox was running.
    Discarded { run_number: u64 },
}

impl TickReport {
    fn outcome_label(&self) -> &'static str {
        match self {
            TickReport::Skipped => "skipped",
            TickReport::Failed { .. } => "failed",
            TickReport::NoNewRecords { .. } => "no_new_records",
            TickReport::NewRecords { .. } => "new_records",
            TickReport::PersistenceFailed { .. } => "persistence_failed",
            TickReport::Discarded { .. } => "discarded",
        }
    }
}

/// Point-in-time view of a job, as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: String,
    #[serde(flatten)]
    pub spec: JobSpec,
    pub sandbox_name: String,
    pub state: JobState,
    pub desired_running: bool,
    pub executing: bool,
    pub run_number: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

struct JobInner {
    state: JobState,
    run_number: u64,
    updated_at: DateTime<Utc>,
    cancel: Option<CancellationToken>,
    removed: bool,
}

pub struct Job {
    id: String,
    spec: JobSpec,
    sandbox_name: String,
    created_at: DateTime<Utc>,
    ctx: JobContext,
    inner: Mutex<JobInner>,
    events: EventLog,
    live_loops: AtomicUsize,
    /// Held for the whole of an executing tick; removal waits on it before
    /// deleting history.
    tick_guard: Arc<tokio::sync::Mutex<()>>,
}

/// Smallest period a scheduling loop will tick at.
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

/// Deterministic sandbox name for a job.
pub fn sandbox_name(image: &str, job_name: &str, job_id: &str) -> String {
    format!("img-{}.name-{}.id-{}", image, sanitize_name(job_name), job_id)
}

impl Job {
    pub fn new(spec: JobSpec, ctx: JobContext) -> Self {
        let id = Uuid::new_v4().to_string();
        let sandbox_name = sandbox_name(&ctx.settings.image, &spec.name, &id);
        let now = Utc::now();
        let events = EventLog::default();
        events.record(JobEventKind::Created);

        Self {
            id,
            spec,
            sandbox_name,
            created_at: now,
            ctx,
            inner: Mutex::new(JobInner {
                state: JobState::Idle,
                run_number: 1,
                updated_at: now,
                cancel: None,
                removed: false,
            }),
            events,
            live_loops: AtomicUsize::new(0),
            tick_guard: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    pub fn sandbox_name(&self) -> &str {
        &self.sandbox_name
    }

    pub fn state(&self) -> JobState {
        self.lock().state
    }

    pub fn run_number(&self) -> u64 {
        self.lock().run_number
    }

    /// Number of scheduling loops currently alive for this job.
    pub fn live_loops(&self) -> usize {
        self.live_loops.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.snapshot()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let inner = self.lock();
        JobSnapshot {
            id: self.id.clone(),
            spec: self.spec.clone(),
            sandbox_name: self.sandbox_name.clone(),
            state: inner.state,
            desired_running: inner.state.desired_running(),
            executing: inner.state.executing(),
            run_number: inner.run_number,
            created_at: self.created_at,
            updated_at: inner.updated_at,
        }
    }

    fn lock(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn scratch_dir(&self) -> PathBuf {
        self.ctx.settings.scratch_root.join(&self.sandbox_name)
    }

    /// Mark the job as desired and arm its scheduling loop.
    ///
    /// Returns `false` if the job was already desired.
    pub fn start(self: &Arc<Self>) -> bool {
        let token = {
            let mut inner = self.lock();
            if inner.removed {
                return false;
            }
            match apply(inner.state, Signal::Start) {
                Transition::To(next) => {
                    inner.state = next;
                    inner.updated_at = Utc::now();
                    let token = CancellationToken::new();
                    inner.cancel = Some(token.clone());
                    token
                }
                Transition::NoOp | Transition::Skip => {
                    drop(inner);
                    debug!("Job {} is already running", self.id);
                    self.events.record(JobEventKind::StartIgnored);
                    return false;
                }
            }
        };

        info!("Starting job {} ({})", self.id, self.spec.name);
        self.events.record(JobEventKind::Started);

        let job = Arc::clone(self);
        tokio::spawn(async move { job.run_loop(token).await });
        true
    }

    /// Mark the job as not desired and cancel its loop.
    ///
    /// A run in flight is asked to stop in the background; its outcome is
    /// still processed when it returns. Returns `false` if the job was not
    /// desired.
    pub fn stop(&self) -> bool {
        let (was_executing, token) = {
            let mut inner = self.lock();
            match apply(inner.state, Signal::Stop) {
                Transition::To(next) => {
                    inner.state = next;
                    inner.updated_at = Utc::now();
                    (next.executing(), inner.cancel.take())
                }
                Transition::NoOp | Transition::Skip => return false,
            }
        };

        if let Some(token) = token {
            token.cancel();
        }
        info!("Stopped job {} ({})", self.id, self.spec.name);
        self.events.record(JobEventKind::Stopped);

        if was_executing {
            let sandbox = Arc::clone(&self.ctx.sandbox);
            let name = self.sandbox_name.clone();
            tokio::spawn(async move {
                if let Err(e) = sandbox.stop(&name).await {
                    warn!("Failed to stop sandbox {}: {}", name, e);
                }
            });
        }
        true
    }

    /// Stop the job and delete everything it owns.
    ///
    /// Every cleanup step is attempted; failures are recorded in the event
    /// log. History is deleted only after a tick in flight has finished.
    /// Always resolves with the job id.
    pub async fn remove(&self) -> String {
        let token = {
            let mut inner = self.lock();
            inner.removed = true;
            inner.state = apply(inner.state, Signal::Stop).resulting(inner.state);
            inner.updated_at = Utc::now();
            inner.cancel.take()
        };
        if let Some(token) = token {
            token.cancel();
        }

        match self.ctx.sandbox.remove(&self.sandbox_name).await {
            Ok(RemoveOutcome::Removed) => debug!("Removed sandbox {}", self.sandbox_name),
            Ok(RemoveOutcome::AlreadyAbsent) => {}
            Err(e) => self.cleanup_failed("sandbox", e.to_string()),
        }

        // A tick in flight may still be persisting; let it finish first.
        let _idle = self.tick_guard.lock().await;

        if let Err(e) = self.ctx.history.delete_all(&self.id).await {
            self.cleanup_failed("history", e.to_string());
        }

        match tokio::fs::remove_dir_all(self.scratch_dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => self.cleanup_failed("scratch", e.to_string()),
        }

        self.ctx.notifier.close(&self.id).await;
        metrics::forget_job(&self.id);

        info!("Removed job {} ({})", self.id, self.spec.name);
        self.events.record(JobEventKind::Removed);
        self.id.clone()
    }

    fn cleanup_failed(&self, step: &str, reason: String) {
        warn!("Cleanup step '{}' failed for job {}: {}", step, self.id, reason);
        self.events.record(JobEventKind::CleanupFailed {
            step: step.to_string(),
            reason,
        });
    }

    /// Look up the records that run `run_number` reported as new.
    pub async fn run_lookup(&self, run_number: u64) -> Result<RunLookup, JobError> {
        let current = self.run_number();
        if run_number == 0 || run_number >= current {
            return Ok(RunLookup::NotYetRun);
        }
        let records = self
            .ctx
            .history
            .read_run_artifact(&self.id, run_number)
            .await?;
        Ok(RunLookup::Completed(records))
    }

    async fn run_loop(self: Arc<Self>, token: CancellationToken) {
        self.live_loops.fetch_add(1, Ordering::SeqCst);
        metrics::inc_scheduled_jobs();

        let mut interval = tokio::time::interval(self.spec.run_frequency.max(MIN_TICK_PERIOD));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let report = self.tick().await;
            debug!("Job {} tick: {:?}", self.id, report);

            if token.is_cancelled() {
                break;
            }
        }

        metrics::dec_scheduled_jobs();
        self.live_loops.fetch_sub(1, Ordering::SeqCst);
        debug!("Scheduling loop of job {} exited", self.id);
    }

    /// Run one scheduling tick.
    pub async fn tick(&self) -> TickReport {
        let report = self.tick_inner().await;
        metrics::record_tick(report.outcome_label());
        report
    }

    async fn tick_inner(&self) -> TickReport {
        let (run_number, _running) = {
            let mut inner = self.lock();
            // Outside a tick only removal holds the guard, and a removed job
            // never passes TickBegin.
            let guard = match apply(inner.state, Signal::TickBegin) {
                Transition::To(next) => Arc::clone(&self.tick_guard)
                    .try_lock_owned()
                    .ok()
                    .map(|guard| {
                        inner.state = next;
                        guard
                    }),
                Transition::NoOp | Transition::Skip => None,
            };
            match guard {
                Some(guard) => (inner.run_number, guard),
                None => {
                    drop(inner);
                    self.events.record(JobEventKind::TickSkipped);
                    return TickReport::Skipped;
                }
            }
        };

        let report = match self.execute(run_number).await {
            Ok(report) => report,
            Err(JobError::Persistence(e)) => {
                error!("Failed to persist run {} of job {}: {}", run_number, self.id, e);
                self.events.record(JobEventKind::PersistenceFailed {
                    run_number,
                    reason: e.to_string(),
                });
                TickReport::PersistenceFailed {
                    run_number,
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!("Run {} of job {} failed: {}", run_number, self.id, e);
                self.events.record(JobEventKind::RunFailed {
                    run_number,
                    reason: e.to_string(),
                });
                TickReport::Failed {
                    run_number,
                    reason: e.to_string(),
                }
            }
        };

        let mut inner = self.lock();
        if matches!(report, TickReport::NewRecords { .. }) {
            inner.run_number += 1;
        }
        inner.state = apply(inner.state, Signal::TickEnd).resulting(inner.state);
        report
    }

    fn discard_if_removed(&self, run_number: u64) -> Option<TickReport> {
        if !self.lock().removed {
            return None;
        }
        info!("Job {} was removed during run {}, discarding output", self.id, run_number);
        self.events.record(JobEventKind::OutputDiscarded { run_number });
        Some(TickReport::Discarded { run_number })
    }

    fn run_request(&self, run_number: u64) -> RunRequest {
        let settings = &self.ctx.settings;
        let scratch = self.scratch_dir();
        let stem = format!("out_{}", run_number);
        let sandbox_stem = format!(
            "{}/{}",
            settings.container_data_path.trim_end_matches('/'),
            stem
        );

        RunRequest {
            image: settings.image.clone(),
            name: self.sandbox_name.clone(),
            args: vec![
                sandbox_stem.clone(),
                self.spec.min_price.to_string(),
                self.spec.max_price.to_string(),
                self.spec.condition.clone().unwrap_or_default(),
                self.spec.keywords.clone(),
            ],
            env: settings.env.clone(),
            binds: vec![
                VolumeBind {
                    host_path: scratch.join("data"),
                    sandbox_path: settings.container_data_path.clone(),
                },
                VolumeBind {
                    host_path: scratch.join("log"),
                    sandbox_path: settings.container_log_path.clone(),
                },
            ],
            output: OutputLocation {
                sandbox_stem,
                host_file: scratch.join("data").join(format!("{}.json", stem)),
            },
        }
    }

    async fn execute(&self, run_number: u64) -> Result<TickReport, JobError> {
        let request = self.run_request(run_number);
        let output_file = request.output.host_file.clone();

        let started = std::time::Instant::now();
        let outcome = metrics::timed(
            "sandbox_run",
            &self.id,
            self.ctx.sandbox.run(request),
        )
        .await;
        metrics::record_sandbox_run(outcome.is_success(), started.elapsed());

        if let Some(report) = self.discard_if_removed(run_number) {
            return Ok(report);
        }

        if !outcome.is_success() {
            return Err(JobError::Execution(format!(
                "exit code {:?}: {}",
                outcome.exit_code,
                outcome.error.unwrap_or_default()
            )));
        }

        let current = read_run_output(&output_file).await?;

        let previous = if run_number == 1 {
            Vec::new()
        } else {
            self.ctx.history.read_cumulative(&self.id).await?
        };

        let new_records = diff(&current, &previous);
        if new_records.is_empty() {
            info!("Run {} of job {} found nothing new", run_number, self.id);
            self.events.record(JobEventKind::NoNewRecords { run_number });
            return Ok(TickReport::NoNewRecords { run_number });
        }

        if let Some(report) = self.discard_if_removed(run_number) {
            return Ok(report);
        }
        metrics::timed(
            "persist_run",
            &self.id,
            self.persist(run_number, &previous, &new_records),
        )
        .await?;

        // Removal deletes whatever was just written once this tick ends.
        if let Some(report) = self.discard_if_removed(run_number) {
            return Ok(report);
        }

        info!(
            "Run {} of job {} found {} new records",
            run_number,
            self.id,
            new_records.len()
        );
        metrics::record_new_records(&self.id, new_records.len());
        self.events.record(JobEventKind::NewRecords {
            run_number,
            count: new_records.len(),
        });

        self.notify(run_number, &new_records).await;

        Ok(TickReport::NewRecords {
            run_number,
            count: new_records.len(),
        })
    }

    /// Append the new records to the cumulative snapshot and write the run
    /// artifact. The snapshot is restored if the artifact cannot be written.
    async fn persist(
        &self,
        run_number: u64,
        previous: &[ResultRecord],
        new_records: &[ResultRecord],
    ) -> Result<(), JobError> {
        let history = &self.ctx.history;

        let mut cumulative = previous.to_vec();
        cumulative.extend_from_slice(new_records);
        history.write_cumulative(&self.id, &cumulative).await?;

        if let Err(e) = history
            .write_run_artifact(&self.id, run_number, new_records)
            .await
        {
            if let Err(rollback) = history.write_cumulative(&self.id, previous).await {
                error!(
                    "Failed to roll back cumulative snapshot of job {}: {}",
                    self.id, rollback
                );
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn notify(&self, run_number: u64, new_records: &[ResultRecord]) {
        let notifier = &self.ctx.notifier;

        if let Err(e) = notifier.publish(&self.id, new_records).await {
            self.notification_failed(JobError::from(e));
        }

        let digest = Digest {
            subject: format!(
                "New items for {} and run {} found!",
                self.spec.keywords, run_number
            ),
            summary: format!("Found {} new items.", new_records.len()),
            attachments: vec![Attachment::csv(
                format!("new_{}.csv", run_number),
                records_to_csv(new_records),
            )],
        };
        if let Err(e) = notifier.digest(digest).await {
            self.notification_failed(JobError::from(e));
        }
    }

    fn notification_failed(&self, e: JobError) {
        warn!("Notification for job {} failed: {}", self.id, e);
        self.events.record(JobEventKind::NotificationFailed {
            reason: e.to_string(),
        });
    }
}

async fn read_run_output(path: &Path) -> Result<Vec<ResultRecord>, JobError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| JobError::Execution(format!("Cannot read run output {:?}: {}", path, e)))?;

    let records = serde_json::from_slice(&bytes)
        .map_err(|e| JobError::Execution(format!("Malformed run output {:?}: {}", path, e)))?;

    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Could not remove run output {:?}: {}", path, e);
    }
    Ok(records)
}
