//! Scrape job orchestrator library
//!
//! Runs scraping jobs in sandboxed containers on a schedule, keeps the
//! history of what each job found and notifies subscribers about new items.

pub mod config;
pub mod history;
pub mod jobs;
pub mod notifications;
pub mod records;
pub mod sandbox;
pub mod server;

// Re-export commonly used types for convenience
pub use history::{FsRunHistoryStore, InMemoryRunHistoryStore, RunHistoryStore};
pub use jobs::{JobContext, JobRegistry, JobSpec};
pub use records::ResultRecord;
pub use sandbox::{DockerCliSandbox, SandboxClient};
pub use server::{make_app, run_server, RequestsLoggingLevel};
