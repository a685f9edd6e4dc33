//! Per-type validation and normalization of raw file content.

use serde_json::{Map, Value};

use scrapegraph_shared::{Result, ScrapeGraphError, SourceType};

/// Validate `raw` as `source_type` and return the text handed to the model.
///
/// JSON is re-serialized pretty, CSV becomes a JSON array of row objects,
/// XML and Markdown pass through trimmed.
pub fn normalize(source_type: SourceType, raw: &str) -> Result<String> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    match source_type {
        SourceType::Json => normalize_json(raw),
        SourceType::Csv => normalize_csv(raw),
        SourceType::Xml => normalize_xml(raw),
        SourceType::Markdown => Ok(raw.trim().to_string()),
    }
}

fn normalize_json(raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| ScrapeGraphError::parse(format!("invalid JSON: {e}")))?;
    serde_json::to_string_pretty(&value)
        .map_err(|e| ScrapeGraphError::parse(format!("cannot re-serialize JSON: {e}")))
}

fn normalize_csv(raw: &str) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(raw.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ScrapeGraphError::parse(format!("invalid CSV header: {e}")))?
        .clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ScrapeGraphError::parse(format!("invalid CSV: {e}")))?;
        let row: Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), Value::String(v.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }

    serde_json::to_string_pretty(&rows)
        .map_err(|e| ScrapeGraphError::parse(format!("cannot serialize CSV rows: {e}")))
}

fn normalize_xml(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if !trimmed.starts_with('<') {
        return Err(ScrapeGraphError::parse(
            "invalid XML: document does not start with '<'",
        ));
    }
    Ok(trimmed.to_string())
}
