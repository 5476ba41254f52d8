// src/batch/dataset.rs
//!
//! Dataset access for batch runs: named-field records sliced by a half-open
//! index range, plus the builder that turns a directory of converted `.txt`
//! documents into a CSV dataset.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::info;

use crate::prompts;
use crate::{Error, Result};

/// One external-source row. Immutable; created by a `DatasetSource` and only
/// read afterwards.
#[derive(Debug, Clone)]
pub struct DatasetRecord {
    fields: serde_json::Map<String, Value>,
}

impl DatasetRecord {
    pub fn new(fields: serde_json::Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Text content of a named field.
    pub fn field(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| Error::MissingField(name.to_string()))
    }
}

/// Source of dataset records, sliced by `[start, end)`.
pub trait DatasetSource {
    fn load_slice(&self, start: usize, end: usize) -> Result<Vec<DatasetRecord>>;
}

/// Local dataset file, JSON-lines or CSV with a header row (detected by
/// extension, defaulting to JSON-lines).
pub struct FileDataset {
    path: PathBuf,
}

impl FileDataset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn is_csv(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false)
    }

    fn load_csv_slice(&self, start: usize, end: usize) -> Result<Vec<DatasetRecord>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let mut records = Vec::new();
        for (index, row) in reader.records().enumerate() {
            if index >= end {
                break;
            }
            let row = row?;
            if index < start {
                continue;
            }
            let mut fields = serde_json::Map::new();
            for (header, value) in headers.iter().zip(row.iter()) {
                fields.insert(header.to_string(), Value::String(value.to_string()));
            }
            records.push(DatasetRecord::new(fields));
        }
        Ok(records)
    }

    fn load_jsonl_slice(&self, start: usize, end: usize) -> Result<Vec<DatasetRecord>> {
        let file = std::fs::File::open(&self.path)?;
        let reader = BufReader::new(file);
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            if index >= end {
                break;
            }
            let line = line?;
            if index < start || line.trim().is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(&line)?;
            match value {
                Value::Object(fields) => records.push(DatasetRecord::new(fields)),
                other => {
                    return Err(Error::Config(format!(
                        "dataset line {index} is not a JSON object: {other}"
                    )))
                }
            }
        }
        Ok(records)
    }
}

impl DatasetSource for FileDataset {
    fn load_slice(&self, start: usize, end: usize) -> Result<Vec<DatasetRecord>> {
        if self.is_csv() {
            self.load_csv_slice(start, end)
        } else {
            self.load_jsonl_slice(start, end)
        }
    }
}

/// Build a CSV dataset from a directory of converted `.txt` documents.
///
/// One row per file: `title` (file stem), the fixed system and human prompts,
/// and the file's trimmed content as `context`. Files are visited in name
/// order so rebuilding the dataset is deterministic. Returns the row count.
pub fn build_dataset_csv(txt_dir: &Path, output_csv: &Path) -> Result<usize> {
    let mut txt_files: Vec<PathBuf> = std::fs::read_dir(txt_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("txt"))
                .unwrap_or(false)
        })
        .collect();
    txt_files.sort();

    let mut writer = csv::Writer::from_path(output_csv)?;
    writer.write_record(["title", "system", "human", "context"])?;

    let mut count = 0;
    for path in &txt_files {
        let title = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        let context = std::fs::read_to_string(path)?;
        writer.write_record([
            title,
            prompts::LEGAL_EXTRACTION_SYSTEM_PROMPT.trim(),
            prompts::HUMAN_PROMPT,
            context.trim(),
        ])?;
        count += 1;
    }
    writer.flush()?;

    info!("dataset CSV written to {}: {count} rows", output_csv.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_jsonl_half_open_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("law.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();
        for i in 0..5 {
            writeln!(file, r#"{{"title": "vb-{i}", "context": "noi dung {i}"}}"#).unwrap();
        }

        let dataset = FileDataset::new(&path);
        let records = dataset.load_slice(1, 3).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].field("title").unwrap(), "vb-1");
        assert_eq!(records[1].field("context").unwrap(), "noi dung 2");
    }

    #[test]
    fn test_csv_slice_uses_header_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("law.csv");
        std::fs::write(&path, "title,context\nvb-a,noi dung a\nvb-b,noi dung b\n").unwrap();

        let dataset = FileDataset::new(&path);
        let records = dataset.load_slice(0, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].field("title").unwrap(), "vb-b");
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let mut fields = serde_json::Map::new();
        fields.insert("title".to_string(), Value::String("vb".to_string()));
        let record = DatasetRecord::new(fields);
        assert!(matches!(
            record.field("context"),
            Err(Error::MissingField(name)) if name == "context"
        ));
    }

    #[test]
    fn test_build_dataset_csv_from_txt_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01-2023-tt.txt"), "THONG TU so 01\n").unwrap();
        std::fs::write(dir.path().join("02-2023-nd.txt"), "NGHI DINH so 02\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let out = dir.path().join("dataset.csv");
        let count = build_dataset_csv(dir.path(), &out).unwrap();
        assert_eq!(count, 2);

        let dataset = FileDataset::new(&out);
        let records = dataset.load_slice(0, 2).unwrap();
        assert_eq!(records[0].field("title").unwrap(), "01-2023-tt");
        assert_eq!(records[0].field("human").unwrap(), prompts::HUMAN_PROMPT);
        assert_eq!(records[1].field("context").unwrap(), "NGHI DINH so 02");
    }
}
