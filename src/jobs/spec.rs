use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Lowest run frequency accepted by default.
pub const DEFAULT_MIN_RUN_FREQUENCY: Duration = Duration::from_secs(60);

/// Immutable description of a scraping target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub name: String,
    pub min_price: f64,
    pub max_price: f64,
    #[serde(default)]
    pub condition: Option<String>,
    pub keywords: String,
    #[serde(with = "duration_secs")]
    pub run_frequency: Duration,
}

#[derive(Debug, Error, PartialEq)]
pub enum SpecError {
    #[error("Job name must not be empty")]
    EmptyName,

    #[error("Keywords must not be empty")]
    EmptyKeywords,

    #[error("Prices must be finite and non-negative")]
    InvalidPrice,

    #[error("Minimum price {min} is greater than maximum price {max}")]
    PriceRange { min: f64, max: f64 },

    #[error("Run frequency must be greater than zero")]
    ZeroFrequency,

    #[error("Run frequency of {actual:?} is below the minimum of {minimum:?}")]
    FrequencyTooLow { actual: Duration, minimum: Duration },
}

impl JobSpec {
    /// Check the spec before handing it to the registry. The registry itself
    /// accepts any spec.
    pub fn validate(&self, min_run_frequency: Duration) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyName);
        }
        if self.keywords.trim().is_empty() {
            return Err(SpecError::EmptyKeywords);
        }
        let valid_price = |p: f64| p.is_finite() && p >= 0.0;
        if !valid_price(self.min_price) || !valid_price(self.max_price) {
            return Err(SpecError::InvalidPrice);
        }
        if self.min_price > self.max_price {
            return Err(SpecError::PriceRange {
                min: self.min_price,
                max: self.max_price,
            });
        }
        if self.run_frequency.is_zero() {
            return Err(SpecError::ZeroFrequency);
        }
        if self.run_frequency < min_run_frequency {
            return Err(SpecError::FrequencyTooLow {
                actual: self.run_frequency,
                minimum: min_run_frequency,
            });
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
