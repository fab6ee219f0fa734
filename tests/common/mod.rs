//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{parked_spec, TestHarness};
//!
//! #[tokio::test]
//! async fn test_add_job() {
//!     let harness = TestHarness::new();
//!     let job = harness.registry.add_job(parked_spec("bottles"));
//!     assert_eq!(job.run_number(), 1);
//! }
//! ```

#![allow(dead_code)]

mod client;
mod constants;
mod fakes;
mod fixtures;
mod harness;
mod server;

pub use client::TestClient;
pub use constants::*;
pub use fakes::{FlakyHistoryStore, RecordingNotifier, ScriptedSandbox, Step};
pub use fixtures::{parked_spec, record, spec_with_frequency};
pub use harness::{wait_until, TestHarness};
pub use server::TestServer;
