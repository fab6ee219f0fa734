use super::RequestsLoggingLevel;
use crate::jobs::DEFAULT_MIN_RUN_FREQUENCY;
use std::time::Duration;

#[derive(Clone)]
pub struct ServerConfig {
    pub requests_logging_level: RequestsLoggingLevel,
    pub port: u16,
    /// Jobs created over HTTP must run at most this often.
    pub min_run_frequency: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            requests_logging_level: RequestsLoggingLevel::Path,
            port: 3001,
            min_run_frequency: DEFAULT_MIN_RUN_FREQUENCY,
        }
    }
}
