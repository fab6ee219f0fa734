//! Shared constants for the integration tests

use std::time::Duration;

/// Image identity used by every test registry.
pub const TEST_IMAGE: &str = "scraper_bot_test";

/// Keywords of the default test job.
pub const TEST_KEYWORDS: &str = "water bottle";

/// Frequency long enough that only the immediate first tick happens.
pub const PARKED_FREQUENCY: Duration = Duration::from_secs(3600);

/// Frequency for tests that want the loop to keep ticking.
pub const FAST_FREQUENCY: Duration = Duration::from_millis(40);

/// How long `wait_until` polls before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub const SERVER_READY_TIMEOUT_MS: u64 = 2000;

pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

pub const REQUEST_TIMEOUT_SECS: u64 = 10;
