//! OS-level file locking for the process-shared cache files.
//!
//! `questions.jsonl` and `timing.json` are appended to / rewritten by every
//! parallel PDF extraction; both operations hold an exclusive lock for the
//! duration of the write so lines never interleave and updates never race.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use fs4::FileExt;
use serde::Serialize;

use crate::error::Result;

/// Appends one JSON line per record under an exclusive lock.
///
/// The lock is held across all records of one call, so a PDF's questions
/// land as one contiguous run even when other processes are appending.
pub fn locked_append_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new().create(true).append(true).open(path)?;
    file.lock_exclusive()?;
    let result = (|| -> Result<()> {
        let mut buffer = String::new();
        for record in records {
            buffer.push_str(&serde_json::to_string(record)?);
            buffer.push('\n');
        }
        let mut writer = &file;
        writer.write_all(buffer.as_bytes())?;
        writer.flush()?;
        Ok(())
    })();
    let _ = file.unlock();
    result
}

/// Read-modify-write of a JSON file under an exclusive lock.
///
/// The modifier receives the current content (an empty object when the file
/// is new) and returns the full replacement value.
pub fn locked_update_json(
    path: &Path,
    modifier: impl FnOnce(serde_json::Value) -> serde_json::Value,
) -> Result<serde_json::Value> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    let result = (|| -> Result<serde_json::Value> {
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        let existing = if content.trim().is_empty() {
            serde_json::Value::Object(Default::default())
        } else {
            serde_json::from_str(&content)?
        };

        let modified = modifier(existing);

        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(serde_json::to_string_pretty(&modified)?.as_bytes())?;
        file.flush()?;
        Ok(modified)
    })();
    let _ = file.unlock();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn append_creates_parents_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("_metadata/questions.jsonl");
        locked_append_jsonl(&path, &[json!({"id": 1})]).unwrap();
        locked_append_jsonl(&path, &[json!({"id": 2}), json!({"id": 3})]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn update_sees_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        locked_update_json(&path, |mut v| {
            v["count"] = json!(1);
            v
        })
        .unwrap();
        let out = locked_update_json(&path, |mut v| {
            let count = v["count"].as_i64().unwrap_or(0);
            v["count"] = json!(count + 10);
            v
        })
        .unwrap();
        assert_eq!(out["count"], json!(11));
    }
}
