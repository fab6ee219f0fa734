use thiserror::Error;

use crate::history::HistoryError;
use crate::notifications::NotifyError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    JobNotFound(String),

    #[error("Sandbox image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("Run failed: {0}")]
    Execution(String),

    #[error("Run history error: {0}")]
    Persistence(#[from] HistoryError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotifyError),
}
