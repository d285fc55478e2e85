//! Reading candidate records from JSON files.
//!
//! Input files hold either a JSON array of records or a single record
//! object. Unknown fields are ignored and missing ones take defaults. An
//! array element that still cannot be read is rejected on its own; the rest
//! of the file goes through.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::core::TestCaseRecord;
use crate::error::{DedupError, Result};

/// Records parsed from one input file.
#[derive(Debug, Clone, Default)]
pub struct ParsedRecords {
    pub records: Vec<TestCaseRecord>,
    /// Array elements that could not be read as a record.
    pub rejected: usize,
}

impl ParsedRecords {
    /// Elements in the input, readable or not.
    pub fn total(&self) -> usize {
        self.records.len() + self.rejected
    }
}

/// Read every record in a file.
pub fn read_records(path: &Path) -> Result<ParsedRecords> {
    let content = fs::read_to_string(path).map_err(|e| DedupError::storage(path, e))?;
    parse_records(&content)
}

/// Read the first record in a file.
pub fn read_record(path: &Path) -> Result<TestCaseRecord> {
    read_records(path)?.records.into_iter().next().ok_or_else(|| {
        DedupError::invalid_input(format!("{} contains no records", path.display()))
    })
}

/// Parse a JSON array of records or a single record.
///
/// A single object that is not a record fails the whole parse.
pub fn parse_records(content: &str) -> Result<ParsedRecords> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    match value {
        serde_json::Value::Array(items) => {
            let mut parsed = ParsedRecords::default();
            for (index, item) in items.into_iter().enumerate() {
                match serde_json::from_value(item) {
                    Ok(record) => parsed.records.push(record),
                    Err(e) => {
                        warn!(index, error = %e, "Skipping unreadable record");
                        parsed.rejected += 1;
                    }
                }
            }
            Ok(parsed)
        }
        serde_json::Value::Object(_) => Ok(ParsedRecords {
            records: vec![serde_json::from_value(value)?],
            rejected: 0,
        }),
        other => Err(DedupError::invalid_input(format!(
            "expected a record or an array of records, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
