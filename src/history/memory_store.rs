//! In-memory run history, for tests and throwaway deployments.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use super::{HistoryError, RunHistoryStore};
use crate::records::ResultRecord;

#[derive(Default)]
struct JobHistory {
    cumulative: Vec<ResultRecord>,
    runs: BTreeMap<u64, Vec<ResultRecord>>,
}

#[derive(Default)]
pub struct InMemoryRunHistoryStore {
    jobs: Mutex<HashMap<String, JobHistory>>,
}

impl InMemoryRunHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run numbers that have an artifact for the job, ascending.
    pub fn run_numbers(&self, job_id: &str) -> Vec<u64> {
        let jobs = self.jobs.lock().unwrap();
        jobs.get(job_id)
            .map(|h| h.runs.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.jobs.lock().unwrap().contains_key(job_id)
    }
}

#[async_trait]
impl RunHistoryStore for InMemoryRunHistoryStore {
    async fn read_cumulative(&self, job_id: &str) -> Result<Vec<ResultRecord>, HistoryError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .get(job_id)
            .map(|h| h.cumulative.clone())
            .unwrap_or_default())
    }

    async fn write_cumulative(
        &self,
        job_id: &str,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.entry(job_id.to_string()).or_default().cumulative = records.to_vec();
        Ok(())
    }

    async fn write_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        let mut jobs = self.jobs.lock().unwrap();
        let history = jobs.entry(job_id.to_string()).or_default();
        if history.runs.contains_key(&run_number) {
            return Err(HistoryError::ArtifactExists {
                job_id: job_id.to_string(),
                run_number,
            });
        }
        history.runs.insert(run_number, records.to_vec());
        Ok(())
    }

    async fn read_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
    ) -> Result<Vec<ResultRecord>, HistoryError> {
        let jobs = self.jobs.lock().unwrap();
        Ok(jobs
            .get(job_id)
            .and_then(|h| h.runs.get(&run_number).cloned())
            .unwrap_or_default())
    }

    async fn delete_all(&self, job_id: &str) -> Result<(), HistoryError> {
        self.jobs.lock().unwrap().remove(job_id);
        Ok(())
    }
}
