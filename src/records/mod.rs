//! Scraped records and change detection.

mod csv_export;
mod diff;
mod models;

pub use csv_export::records_to_csv;
pub use diff::diff;
pub use models::{RecordKey, ResultRecord};
