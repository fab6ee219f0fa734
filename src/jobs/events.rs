//! Per-job structured event log.
//!
//! Things that go wrong inside a job's loop or during cleanup are not
//! surfaced to callers; they are recorded here instead.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Mutex;

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    Started,
    Stopped,
    StartIgnored,
    TickSkipped,
    RunFailed { run_number: u64, reason: String },
    NoNewRecords { run_number: u64 },
    NewRecords { run_number: u64, count: usize },
    PersistenceFailed { run_number: u64, reason: String },
    NotificationFailed { reason: String },
    OutputDiscarded { run_number: u64 },
    CleanupFailed { step: String, reason: String },
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEvent {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: JobEventKind,
}

/// Bounded log; the oldest events are dropped first.
pub struct EventLog {
    events: Mutex<VecDeque<JobEvent>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, kind: JobEventKind) {
        let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(JobEvent {
            at: Utc::now(),
            kind,
        });
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<JobEvent> {
        let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
        events.iter().cloned().collect()
    }
}
