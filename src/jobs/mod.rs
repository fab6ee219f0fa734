//! Job orchestration: scheduling loops, per-tick execution and the registry
//! that owns every job.

mod context;
mod error;
mod events;
mod job;
mod registry;
mod spec;
mod state;

pub use context::{JobContext, SandboxSettings};
pub use error::JobError;
pub use events::{EventLog, JobEvent, JobEventKind};
pub use job::{sandbox_name, Job, JobSnapshot, RunLookup, TickReport};
pub use registry::{JobOutcome, JobRegistry};
pub use spec::{JobSpec, SpecError, DEFAULT_MIN_RUN_FREQUENCY};
pub use state::{apply, JobState, Signal, Transition};
