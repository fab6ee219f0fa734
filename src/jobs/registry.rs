use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::OnceCell;
use tracing::{error, info};

use super::context::JobContext;
use super::error::JobError;
use super::job::{Job, RunLookup};
use super::spec::JobSpec;
use crate::server::metrics;

/// Per-job result of a bulk operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    fn ok(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            ok: true,
            error: None,
        }
    }

    fn failed(job_id: &str, error: &JobError) -> Self {
        Self {
            job_id: job_id.to_string(),
            ok: false,
            error: Some(error.to_string()),
        }
    }

    fn from_result<T>(job_id: &str, result: Result<T, JobError>) -> Self {
        match result {
            Ok(_) => Self::ok(job_id),
            Err(e) => Self::failed(job_id, &e),
        }
    }
}

/// The collection of jobs of one orchestrator instance.
pub struct JobRegistry {
    ctx: JobContext,
    jobs: RwLock<Vec<Arc<Job>>>,
    image_ready: OnceCell<()>,
}

impl JobRegistry {
    pub fn new(ctx: JobContext) -> Self {
        Self {
            ctx,
            jobs: RwLock::new(Vec::new()),
            image_ready: OnceCell::new(),
        }
    }

    pub fn image(&self) -> &str {
        &self.ctx.settings.image
    }

    /// Build the shared sandbox image if it has not been built yet.
    ///
    /// A failed build is retried on the next call.
    pub async fn ensure_image(&self) -> Result<(), JobError> {
        let settings = &self.ctx.settings;
        self.image_ready
            .get_or_try_init(|| async {
                metrics::timed(
                    "build_image",
                    "-",
                    self.ctx
                        .sandbox
                        .build_image(&settings.image, &settings.build_context),
                )
                .await
                .map_err(|e| {
                    error!("Failed to build sandbox image {}: {}", settings.image, e);
                    JobError::ImageUnavailable(e.to_string())
                })
            })
            .await?;
        Ok(())
    }

    pub fn add_job(&self, spec: JobSpec) -> Arc<Job> {
        let job = Arc::new(Job::new(spec, self.ctx.clone()));
        info!("Created job {} ({})", job.id(), job.spec().name);
        self.write_jobs().push(Arc::clone(&job));
        job
    }

    pub fn get_job(&self, id: &str) -> Option<Arc<Job>> {
        self.read_jobs().iter().find(|j| j.id() == id).cloned()
    }

    /// All jobs, in creation order.
    pub fn list_jobs(&self) -> Vec<Arc<Job>> {
        self.read_jobs().clone()
    }

    fn resolve(&self, id: &str) -> Result<Arc<Job>, JobError> {
        self.get_job(id)
            .ok_or_else(|| JobError::JobNotFound(id.to_string()))
    }

    pub async fn start_job(&self, id: &str) -> Result<Arc<Job>, JobError> {
        let job = self.resolve(id)?;
        self.ensure_image().await?;
        job.start();
        Ok(job)
    }

    pub fn stop_job(&self, id: &str) -> Result<Arc<Job>, JobError> {
        let job = self.resolve(id)?;
        job.stop();
        Ok(job)
    }

    /// Remove the job from the registry and clean up after it.
    pub async fn remove_job(&self, id: &str) -> Result<String, JobError> {
        let job = {
            let mut jobs = self.write_jobs();
            let index = jobs
                .iter()
                .position(|j| j.id() == id)
                .ok_or_else(|| JobError::JobNotFound(id.to_string()))?;
            jobs.remove(index)
        };
        Ok(job.remove().await)
    }

    pub async fn start_all(&self) -> Vec<JobOutcome> {
        let jobs = self.list_jobs();
        if let Err(e) = self.ensure_image().await {
            return jobs
                .iter()
                .map(|job| JobOutcome::failed(job.id(), &e))
                .collect();
        }
        jobs.iter()
            .map(|job| {
                job.start();
                JobOutcome::ok(job.id())
            })
            .collect()
    }

    pub fn stop_all(&self) -> Vec<JobOutcome> {
        self.list_jobs()
            .iter()
            .map(|job| {
                job.stop();
                JobOutcome::ok(job.id())
            })
            .collect()
    }

    pub async fn remove_all(&self) -> Vec<JobOutcome> {
        let ids: Vec<String> = self
            .list_jobs()
            .iter()
            .map(|j| j.id().to_string())
            .collect();

        self.remove_jobs(&ids).await
    }

    /// Start the listed jobs. Unknown ids get a failed outcome of their own.
    pub async fn start_jobs(&self, ids: &[String]) -> Vec<JobOutcome> {
        let resolved: Vec<_> = ids.iter().map(|id| (id, self.resolve(id))).collect();

        let image = if resolved.iter().any(|(_, job)| job.is_ok()) {
            self.ensure_image().await
        } else {
            Ok(())
        };

        resolved
            .into_iter()
            .map(|(id, job)| match (job, &image) {
                (Err(e), _) => JobOutcome::failed(id, &e),
                (Ok(_), Err(e)) => JobOutcome::failed(id, e),
                (Ok(job), Ok(())) => {
                    job.start();
                    JobOutcome::ok(id)
                }
            })
            .collect()
    }

    pub fn stop_jobs(&self, ids: &[String]) -> Vec<JobOutcome> {
        ids.iter()
            .map(|id| JobOutcome::from_result(id, self.stop_job(id)))
            .collect()
    }

    pub async fn remove_jobs(&self, ids: &[String]) -> Vec<JobOutcome> {
        let removals = ids
            .iter()
            .map(|id| async move { JobOutcome::from_result(id, self.remove_job(id).await) });
        futures::future::join_all(removals).await
    }

    pub async fn fetch_run(&self, id: &str, run_number: u64) -> Result<RunLookup, JobError> {
        let job = self.resolve(id)?;
        job.run_lookup(run_number).await
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<Job>>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<Job>>> {
        self.jobs.write().unwrap_or_else(|e| e.into_inner())
    }
}
