//! Filesystem-backed run history.
//!
//! Layout, one directory per job:
//!
//! ```text
//! <root>/<job_id>/out.json       cumulative snapshot
//! <root>/<job_id>/new_<n>.json   records new in run n
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{HistoryError, RunHistoryStore};
use crate::records::ResultRecord;

const CUMULATIVE_FILE: &str = "out.json";

pub struct FsRunHistoryStore {
    root: PathBuf,
}

impl FsRunHistoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn job_dir(&self, job_id: &str) -> Result<PathBuf, HistoryError> {
        let valid = !job_id.is_empty()
            && job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(HistoryError::InvalidJobId(job_id.to_string()));
        }
        Ok(self.root.join(job_id))
    }

    fn run_artifact_path(&self, job_id: &str, run_number: u64) -> Result<PathBuf, HistoryError> {
        Ok(self.job_dir(job_id)?.join(format!("new_{}.json", run_number)))
    }

    async fn read_records(path: &Path) -> Result<Vec<ResultRecord>, HistoryError> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(HistoryError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_slice(&content).map_err(|source| HistoryError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write via a temp file in the same directory, then rename over the target.
    async fn write_records_atomic(
        path: &Path,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        let io_err = |source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let encoded = serde_json::to_vec_pretty(records).map_err(|source| {
            HistoryError::Malformed {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

        let mut file = tokio::fs::File::create(&temp_path).await.map_err(io_err)?;
        file.write_all(&encoded).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        tokio::fs::rename(&temp_path, path).await.map_err(io_err)?;
        debug!("Wrote {} records to {:?}", records.len(), path);
        Ok(())
    }
}

#[async_trait]
impl RunHistoryStore for FsRunHistoryStore {
    async fn read_cumulative(&self, job_id: &str) -> Result<Vec<ResultRecord>, HistoryError> {
        let path = self.job_dir(job_id)?.join(CUMULATIVE_FILE);
        Self::read_records(&path).await
    }

    async fn write_cumulative(
        &self,
        job_id: &str,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        let path = self.job_dir(job_id)?.join(CUMULATIVE_FILE);
        Self::write_records_atomic(&path, records).await
    }

    async fn write_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
        records: &[ResultRecord],
    ) -> Result<(), HistoryError> {
        let path = self.run_artifact_path(job_id, run_number)?;
        match tokio::fs::try_exists(&path).await {
            Ok(true) => {
                return Err(HistoryError::ArtifactExists {
                    job_id: job_id.to_string(),
                    run_number,
                })
            }
            Ok(false) => {}
            Err(source) => return Err(HistoryError::Io { path, source }),
        }
        Self::write_records_atomic(&path, records).await
    }

    async fn read_run_artifact(
        &self,
        job_id: &str,
        run_number: u64,
    ) -> Result<Vec<ResultRecord>, HistoryError> {
        let path = self.run_artifact_path(job_id, run_number)?;
        Self::read_records(&path).await
    }

    async fn delete_all(&self, job_id: &str) -> Result<(), HistoryError> {
        let dir = self.job_dir(job_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Deleted history folder {:?}", dir);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(HistoryError::Io { path: dir, source }),
        }
    }
}
