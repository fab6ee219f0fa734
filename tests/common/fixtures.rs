//! Builders for test data

use super::constants::*;
use scrape_orchestrator::jobs::JobSpec;
use scrape_orchestrator::ResultRecord;
use std::time::Duration;

pub fn record(name: &str, price: f64) -> ResultRecord {
    ResultRecord {
        condition: "New".to_string(),
        image_links: vec![format!("https://img.example.com/{}.jpg", name)],
        link: format!("https://shop.example.com/item/{}", name),
        name: name.to_string(),
        price,
        quantity_available: Some(1),
        shipping_price: Some(4.99),
    }
}

pub fn spec_with_frequency(name: &str, run_frequency: Duration) -> JobSpec {
    JobSpec {
        name: name.to_string(),
        min_price: 100.0,
        max_price: 300.0,
        condition: None,
        keywords: TEST_KEYWORDS.to_string(),
        run_frequency,
    }
}

/// A job that ticks once on start and then stays parked.
pub fn parked_spec(name: &str) -> JobSpec {
    spec_with_frequency(name, PARKED_FREQUENCY)
}
