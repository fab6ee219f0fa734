//! CSV rendering of records, used as the digest attachment.

use super::models::ResultRecord;

const HEADINGS: [&str; 7] = [
    "condition",
    "image_links",
    "link",
    "name",
    "price",
    "quantity_available",
    "shipping_price",
];

/// Render records as CSV text with a heading row.
///
/// Image links are joined with `;`, absent values are written as `Null`,
/// and text containing a comma or a double quote is quoted.
pub fn records_to_csv(records: &[ResultRecord]) -> String {
    let mut lines = Vec::with_capacity(records.len() + 1);
    lines.push(HEADINGS.join(","));

    for record in records {
        let fields = [
            escape(&record.condition),
            escape(&record.image_links.join(";")),
            escape(&record.link),
            escape(&record.name),
            record.price.to_string(),
            optional(record.quantity_available),
            optional(record.shipping_price),
        ];
        lines.push(fields.join(","));
    }

    lines.join("\n")
}

fn escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "Null".to_string())
}
