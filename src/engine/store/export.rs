//! Export serialization for records

use std::str::FromStr;

use serde_json::Value;

use super::error::{Result, StoreError};
use super::record::{AuditRecord, TIMESTAMP_FORMAT};

/// Supported export formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Json,
    Csv,
    Xml,
}

impl FromStr for ExportFormat {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            "xml" => Ok(ExportFormat::Xml),
            other => Err(StoreError::InvalidInput(format!(
                "unsupported export format: {other}"
            ))),
        }
    }
}

/// Pretty-printed JSON array of record summaries
pub fn to_json(records: &[AuditRecord]) -> Result<String> {
    let summaries: Vec<Value> = records.iter().map(AuditRecord::to_summary).collect();
    Ok(serde_json::to_string_pretty(&summaries)?)
}

/// CSV with a header of `id,created_at,updated_at` plus the union of all
/// field names in first-seen order. Absent fields render as empty cells.
/// An empty store exports as an empty string.
pub fn to_csv(records: &[AuditRecord]) -> String {
    if records.is_empty() {
        return String::new();
    }

    let mut field_names: Vec<String> = Vec::new();
    for record in records {
        for name in record.fields().keys() {
            if !field_names.iter().any(|n| n == name) {
                field_names.push(name.clone());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<&str> = ["id", "created_at", "updated_at"]
        .into_iter()
        .chain(field_names.iter().map(String::as_str))
        .collect();
    write_csv_row(&header, &mut out);

    for record in records {
        let created = record.created_at().format(TIMESTAMP_FORMAT).to_string();
        let updated = record.updated_at().format(TIMESTAMP_FORMAT).to_string();
        let mut row: Vec<&str> = vec![record.id().unwrap_or(""), &created, &updated];
        for name in &field_names {
            row.push(record.get(name).unwrap_or(""));
        }
        write_csv_row(&row, &mut out);
    }

    out
}

fn write_csv_row(cells: &[&str], out: &mut String) {
    for (i, cell) in cells.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains(['"', ',', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}
