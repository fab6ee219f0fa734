//! Change detection between two runs.

use super::models::ResultRecord;

/// Returns the records of `current` that have no matching item in `previous`.
///
/// Matching uses [`ResultRecord::same_item`]. The relative order of
/// `current` is preserved and duplicates inside `current` are kept as-is.
pub fn diff(current: &[ResultRecord], previous: &[ResultRecord]) -> Vec<ResultRecord> {
    if previous.is_empty() {
        return current.to_vec();
    }

    current
        .iter()
        .filter(|record| !previous.iter().any(|seen| seen.same_item(record)))
        .cloned()
        .collect()
}
