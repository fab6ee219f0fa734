//! Per-job run history: the cumulative snapshot of every record seen so far
//! and one artifact per run holding the records that were new in that run.

mod fs_store;
mod memory_store;

pub use fs_store::FsRunHistoryStore;
pub use memory_store::InMemoryRunHistoryStore;

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::records::ResultRecord;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed history file {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Run {run_number} of job {job_id} already has an artifact")]
    ArtifactExists { job_id: String, run_number: u64 },

    #[error("Invalid job id for history storage: {0:?}")]
    InvalidJobId(String),
}

/// Storage for job run history.
///
/// Only the owning job writes its history, one tick at a time. Readers
/// (historical run queries) may run concurrently with a write, so
/// implementations must never expose a partially written snapshot.
#[async_trait]
pub trait RunHistoryStore: Send + Sync {
    /// All records ever seen for the job, empty if nothing was stored yet.
    async fn read_cumulative(&self, job_id: &str) -> Result<Vec<ResultRecord>, HistoryError>;

    /// Replace the cumulative snapshot.
    async fn write_cumulative(
        &self,
        job_id: &str,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError>;

    /// Store the records that were new in `run_number`.
    ///
    /// Fails with [`HistoryError::ArtifactExists`] instead of overwriting.
    async fn write_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError>;

    /// Records stored for `run_number`, empty if that run has no artifact.
    async fn read_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
    ) -> Result<Vec<ResultRecord>, HistoryError>;

    /// Drop everything stored for the job.
    async fn delete_all(&self, job_id: &str) -> Result<(), HistoryError>;
}
