//! Scraped result records.

use serde::{Deserialize, Serialize};

/// One item produced by a scraping run.
///
/// Field names follow the JSON written by the scraper container, so run
/// output files deserialize directly into this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub condition: String,
    #[serde(default)]
    pub image_links: Vec<String>,
    pub link: String,
    pub name: String,
    pub price: f64,
    #[serde(default)]
    pub quantity_available: Option<u32>,
    #[serde(default)]
    pub shipping_price: Option<f64>,
}

/// The identity of a record for change detection.
///
/// Only condition, name and price take part: the same listing re-scraped
/// with a different link, stock count or shipping price is not a new item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordKey<'a> {
    pub condition: &'a str,
    pub name: &'a str,
    pub price: f64,
}

impl ResultRecord {
    pub fn key(&self) -> RecordKey<'_> {
        RecordKey {
            condition: &self.condition,
            name: &self.name,
            price: self.price,
        }
    }

    /// Equality used by the diff engine.
    pub fn same_item(&self, other: &ResultRecord) -> bool {
        self.key() == other.key()
    }
}
