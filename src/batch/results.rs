// src/batch/results.rs
//!
//! Result-stream flattening: the provider returns one JSON object per line;
//! this module normalizes that stream into a single ordered collection and
//! persists it as a JSON array so the merge step can re-run from disk.
//!
//! Flattening is lenient by design: one corrupt response line must not abort
//! reconciliation of the rest, so bad lines are logged and skipped.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::warn;

use crate::Result;

/// One element of the flattened result stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntry {
    pub custom_id: String,
    /// Absent on per-item failure, even within an overall-successful job.
    pub response_text: Option<String>,
}

/// Parse a downloaded result file line by line, preserving order. Lines that
/// are not valid JSON objects are skipped with a warning.
pub fn flatten_results_file(path: &Path) -> Result<Vec<Value>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut objects = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(&line) {
            Ok(value) => objects.push(value),
            Err(err) => warn!("skipping invalid JSON on result line {}: {err}", index + 1),
        }
    }
    Ok(objects)
}

/// Persist the flattened collection as `converted_{stem}.json` next to the
/// raw result file, and return the new path.
pub fn write_converted(objects: &[Value], results_path: &Path) -> Result<PathBuf> {
    let stem = results_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("batch_results");
    let dir = results_path.parent().unwrap_or_else(|| Path::new("."));
    let path = dir.join(format!("converted_{stem}.json"));
    std::fs::write(&path, serde_json::to_string_pretty(&objects)?)?;
    Ok(path)
}

/// Read a previously persisted converted file back as a flat collection.
pub fn read_converted(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Project the raw result objects down to correlation id + response text.
/// Objects without a `custom_id` are dropped with a warning; a missing or
/// non-text completion becomes an absent response, never a fabricated one.
pub fn response_entries(objects: &[Value]) -> Vec<ResponseEntry> {
    let mut entries = Vec::with_capacity(objects.len());
    for object in objects {
        let Some(custom_id) = object["custom_id"].as_str() else {
            warn!("result object without custom_id dropped: {object}");
            continue;
        };
        let response_text = object["response"]["body"]["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string);
        entries.push(ResponseEntry {
            custom_id: custom_id.to_string(),
            response_text,
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn result_line(custom_id: &str, content: &str) -> String {
        serde_json::json!({
            "custom_id": custom_id,
            "response": {
                "body": {
                    "choices": [{"message": {"content": content}}]
                }
            }
        })
        .to_string()
    }

    #[test]
    fn test_flatten_skips_corrupt_lines_and_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_results_0_3.jsonl");
        let contents = format!(
            "{}\nnot json at all\n{}\n",
            result_line("req-0", "A"),
            result_line("req-1", "B")
        );
        std::fs::write(&path, contents).unwrap();

        let objects = flatten_results_file(&path).unwrap();
        assert_eq!(objects.len(), 2);
        let entries = response_entries(&objects);
        assert_eq!(entries[0].custom_id, "req-0");
        assert_eq!(entries[1].response_text.as_deref(), Some("B"));
    }

    #[test]
    fn test_no_response_is_fabricated() {
        let objects = vec![
            serde_json::json!({"custom_id": "req-5", "error": {"message": "rate limited"}}),
            serde_json::json!({"no_id_here": true}),
        ];
        let entries = response_entries(&objects);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].custom_id, "req-5");
        assert_eq!(entries[0].response_text, None);
    }

    #[test]
    fn test_converted_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let results_path = dir.path().join("batch_results_10_12.jsonl");
        std::fs::write(&results_path, result_line("req-10", "A") + "\n").unwrap();

        let objects = flatten_results_file(&results_path).unwrap();
        let converted = write_converted(&objects, &results_path).unwrap();
        assert!(converted.ends_with("converted_batch_results_10_12.json"));

        let reread = read_converted(&converted).unwrap();
        assert_eq!(reread, objects);
    }
}
