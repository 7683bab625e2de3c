//! JSON and CSV renderings of the audit log

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::{AuditError, AuditResult};
use crate::event::SecurityEvent;

/// CSV columns, in field order of [`SecurityEvent`]
const CSV_COLUMNS: [&str; 8] = [
    "id",
    "timestamp",
    "event_type",
    "severity",
    "user_id",
    "user_email",
    "details",
    "environment",
];

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    /// File extension for saved exports
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// MIME type for download responses
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(AuditError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Render events in the requested format
pub fn render(events: &[SecurityEvent], format: ExportFormat) -> AuditResult<String> {
    match format {
        ExportFormat::Json => to_json(events),
        ExportFormat::Csv => to_csv(events),
    }
}

/// Pretty-printed JSON array
pub fn to_json(events: &[SecurityEvent]) -> AuditResult<String> {
    Ok(serde_json::to_string_pretty(events)?)
}

/// CSV with a header row; nested objects are JSON text in a quoted cell
pub fn to_csv(events: &[SecurityEvent]) -> AuditResult<String> {
    let mut out = CSV_COLUMNS.join(",");
    out.push('\n');

    for event in events {
        let row = serde_json::to_value(event)?;
        let cells: Vec<String> = CSV_COLUMNS
            .iter()
            .map(|column| csv_cell(row.get(*column)))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }

    Ok(out)
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => escape(s, false),
        Some(nested @ (Value::Object(_) | Value::Array(_))) => escape(&nested.to_string(), true),
        Some(other) => escape(&other.to_string(), false),
    }
}

/// RFC 4180 quoting: wrap in quotes and double embedded quotes
fn escape(raw: &str, always_quote: bool) -> String {
    let needs_quotes = always_quote || raw.contains([',', '"', '\n', '\r']);
    if needs_quotes {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
