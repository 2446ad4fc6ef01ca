//! Schema-checked cache readback.
//!
//! Readers refuse version mismatches outright; there is no silent upgrade
//! path. Used by the inspection CLI and by round-trip tests.

use std::path::Path;

use crate::error::{ExtractError, Result};
use crate::model::{QuestionRecord, QUESTION_SCHEMA_VERSION};

pub use super::writer::RegionsDoc;
use super::writer::REGIONS_SCHEMA_VERSION;

/// Reads and validates one `regions.json`.
pub fn read_regions(path: &Path) -> Result<RegionsDoc> {
    let text = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        ExtractError::MalformedCache { path: path.to_path_buf(), msg: e.to_string() }
    })?;

    let found = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| ExtractError::MalformedCache {
            path: path.to_path_buf(),
            msg: "missing schema_version".to_string(),
        })? as u32;
    if found != REGIONS_SCHEMA_VERSION {
        return Err(ExtractError::SchemaVersionMismatch {
            found,
            expected: REGIONS_SCHEMA_VERSION,
        });
    }

    serde_json::from_value(value).map_err(|e| ExtractError::MalformedCache {
        path: path.to_path_buf(),
        msg: e.to_string(),
    })
}

/// Reads every record of a `questions.jsonl`, validating each line's
/// schema version.
pub fn read_questions_jsonl(path: &Path) -> Result<Vec<QuestionRecord>> {
    let text = std::fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
            ExtractError::MalformedCache {
                path: path.to_path_buf(),
                msg: format!("line {}: {e}", line_no + 1),
            }
        })?;
        let found = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .unwrap_or(0) as u32;
        if found != QUESTION_SCHEMA_VERSION {
            return Err(ExtractError::SchemaVersionMismatch {
                found,
                expected: QUESTION_SCHEMA_VERSION,
            });
        }
        let record: QuestionRecord = serde_json::from_value(value).map_err(|e| {
            ExtractError::MalformedCache {
                path: path.to_path_buf(),
                msg: format!("line {}: {e}", line_no + 1),
            }
        })?;
        records.push(record);
    }
    Ok(records)
}
