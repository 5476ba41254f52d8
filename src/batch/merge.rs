// src/batch/merge.rs
//!
//! Reconciler: joins the submission stream back with the flattened response
//! stream and produces one merged record per original document.
//!
//! The submission file is re-read from disk rather than from memory, so the
//! merge is independently re-runnable long after the submitting process has
//! exited. Grouping is derived purely from request identifiers: entry
//! `req-<n>` belongs to unit `n / F`, whose anchor is `req-{(n/F)*F}`.
//! Response-stream order therefore only decides output order; a provider that
//! reorders or drops individual responses can no longer shift unit
//! boundaries.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::batch::request::{self, RequestEntry};
use crate::batch::results::ResponseEntry;
use crate::Result;

/// One logical unit of the submission stream: the `F` requests derived from a
/// single dataset record.
struct RequestGroup {
    anchor_id: String,
    /// `(field_key, user_content, member_custom_id)` in submission order.
    members: Vec<(String, String, String)>,
}

fn group_request_entries(entries: &[RequestEntry], keys: &[String]) -> Vec<RequestGroup> {
    let group_size = keys.len();
    if entries.len() % group_size != 0 {
        warn!(
            "submission stream length {} is not a multiple of group size {}; \
             trailing partial group ignored",
            entries.len(),
            group_size
        );
    }
    entries
        .chunks_exact(group_size)
        .map(|chunk| RequestGroup {
            anchor_id: chunk[0].custom_id.clone(),
            members: keys
                .iter()
                .zip(chunk)
                .map(|(key, entry)| {
                    (
                        key.clone(),
                        entry.user_content().to_string(),
                        entry.custom_id.clone(),
                    )
                })
                .collect(),
        })
        .collect()
}

/// Merge grouped request input with model responses, correlating on
/// `custom_id`. Returns one JSON object per unit whose anchor could be
/// located among the grouped inputs; units with no matching anchor are logged
/// and dropped.
pub fn merge_records(
    entries: &[RequestEntry],
    responses: &[ResponseEntry],
    keys: &[String],
) -> Vec<Value> {
    let group_size = keys.len() as u64;
    let groups = group_request_entries(entries, keys);
    let groups_by_anchor: HashMap<&str, &RequestGroup> = groups
        .iter()
        .map(|group| (group.anchor_id.as_str(), group))
        .collect();

    // Flat id -> text lookup across all responses; per-item failures stay
    // absent here and surface as empty strings in the merged record.
    let response_lookup: HashMap<&str, &str> = responses
        .iter()
        .filter_map(|entry| {
            entry
                .response_text
                .as_deref()
                .map(|text| (entry.custom_id.as_str(), text))
        })
        .collect();

    // Recover each response's unit ordinal from its id suffix; output order
    // is first-seen order in the response stream.
    let mut seen_units = HashSet::new();
    let mut unit_anchors = Vec::new();
    for entry in responses {
        let Some(suffix) = RequestEntry::id_suffix(&entry.custom_id) else {
            warn!("response with unrecognized id '{}' ignored", entry.custom_id);
            continue;
        };
        let unit = suffix / group_size;
        if seen_units.insert(unit) {
            unit_anchors.push(format!("req-{}", unit * group_size));
        }
    }

    let mut merged = Vec::new();
    for anchor in &unit_anchors {
        let Some(group) = groups_by_anchor.get(anchor.as_str()) else {
            warn!("no submitted group found for anchor {anchor}; unit dropped");
            continue;
        };
        let mut record = serde_json::Map::new();
        for (key, content, _) in &group.members {
            record.insert(key.clone(), Value::String(content.clone()));
        }
        record.insert(
            "custom_id".to_string(),
            Value::String(group.anchor_id.clone()),
        );
        for (key, _, member_id) in &group.members {
            let text = response_lookup
                .get(member_id.as_str())
                .copied()
                .unwrap_or_default();
            record.insert(format!("{key}_response"), Value::String(text.to_string()));
        }
        merged.push(Value::Object(record));
    }
    merged
}

/// File-level entry point: re-read the submission file, merge it with the
/// flattened responses, and write `merged_output_{input_stem}.json`.
pub fn merge_data(
    input_jsonl_path: &Path,
    responses: &[ResponseEntry],
    keys: &[String],
    output_dir: Option<&Path>,
) -> Result<PathBuf> {
    let entries = request::read_request_file(input_jsonl_path)?;
    let merged = merge_records(&entries, responses, keys);

    let stem = input_jsonl_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("batch_input");
    let dir = output_dir
        .or_else(|| input_jsonl_path.parent())
        .unwrap_or_else(|| Path::new("."));
    let output_path = dir.join(format!("merged_output_{stem}.json"));
    std::fs::write(&output_path, serde_json::to_string_pretty(&merged)?)?;

    info!(
        "merged output written to {}: {} records",
        output_path.display(),
        merged.len()
    );
    Ok(output_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::dataset::DatasetRecord;
    use crate::batch::request::build_request_file;
    use crate::config::BatchRunConfig;

    fn response(custom_id: &str, text: &str) -> ResponseEntry {
        ResponseEntry {
            custom_id: custom_id.to_string(),
            response_text: Some(text.to_string()),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> DatasetRecord {
        let mut fields = serde_json::Map::new();
        for (key, value) in pairs {
            fields.insert(key.to_string(), Value::String(value.to_string()));
        }
        DatasetRecord::new(fields)
    }

    fn write_request_file(
        dir: &Path,
        start: usize,
        columns: &[&str],
        records: &[DatasetRecord],
    ) -> PathBuf {
        let config = BatchRunConfig {
            model_name: "llama-3.3-70b-versatile".to_string(),
            endpoint: "/v1/chat/completions".to_string(),
            dataset_path: PathBuf::from("unused"),
            start,
            end: start + records.len(),
            column_names: columns.iter().map(|c| c.to_string()).collect(),
            system_prompt: Some("he thong".to_string()),
            output_dir: dir.to_path_buf(),
            generation: Default::default(),
            poll: Default::default(),
        };
        build_request_file(records, &config).unwrap()
    }

    fn keys(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_single_field_slice_with_start_offset() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(&[("title", "vb-a"), ("context", "noi dung a")]),
            record(&[("title", "vb-b"), ("context", "noi dung b")]),
        ];
        let input = write_request_file(dir.path(), 10, &["context"], &records);

        let responses = vec![response("req-10", "A"), response("req-11", "B")];
        let output = merge_data(&input, &responses, &keys(&["context"]), None).unwrap();
        assert!(output.ends_with("merged_output_batch_input_10_12.json"));

        let merged: Vec<Value> =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["custom_id"], "req-10");
        assert_eq!(merged[0]["context"], "context: noi dung a");
        assert_eq!(merged[0]["context_response"], "A");
        assert_eq!(merged[1]["custom_id"], "req-11");
        assert_eq!(merged[1]["context_response"], "B");
    }

    #[test]
    fn test_multi_field_groups_join_by_member_id() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(&[("title", "a"), ("context", "ca")]),
            record(&[("title", "b"), ("context", "cb")]),
        ];
        let input = write_request_file(dir.path(), 0, &["title", "context"], &records);
        let entries = request::read_request_file(&input).unwrap();

        let responses = vec![
            response("req-0", "TA"),
            response("req-1", "CA"),
            response("req-2", "TB"),
            response("req-3", "CB"),
        ];
        let merged = merge_records(&entries, &responses, &keys(&["title", "context"]));
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0]["title"], "title: a");
        assert_eq!(merged[0]["title_response"], "TA");
        assert_eq!(merged[0]["context_response"], "CA");
        assert_eq!(merged[1]["custom_id"], "req-2");
        assert_eq!(merged[1]["context_response"], "CB");
    }

    #[test]
    fn test_reordered_responses_do_not_shift_units() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(&[("title", "a"), ("context", "ca")]),
            record(&[("title", "b"), ("context", "cb")]),
        ];
        let input = write_request_file(dir.path(), 0, &["title", "context"], &records);
        let entries = request::read_request_file(&input).unwrap();

        // Second unit's responses arrive first, and within-unit order is
        // scrambled too.
        let responses = vec![
            response("req-3", "CB"),
            response("req-2", "TB"),
            response("req-1", "CA"),
            response("req-0", "TA"),
        ];
        let merged = merge_records(&entries, &responses, &keys(&["title", "context"]));
        assert_eq!(merged.len(), 2);
        // Output order follows the response stream's first-seen unit order.
        assert_eq!(merged[0]["custom_id"], "req-2");
        assert_eq!(merged[0]["title_response"], "TB");
        assert_eq!(merged[1]["custom_id"], "req-0");
        assert_eq!(merged[1]["context_response"], "CA");
    }

    #[test]
    fn test_missing_member_response_becomes_empty_string() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![record(&[("title", "a"), ("context", "ca")])];
        let input = write_request_file(dir.path(), 0, &["title", "context"], &records);
        let entries = request::read_request_file(&input).unwrap();

        let responses = vec![
            response("req-0", "TA"),
            ResponseEntry {
                custom_id: "req-1".to_string(),
                response_text: None,
            },
        ];
        let merged = merge_records(&entries, &responses, &keys(&["title", "context"]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["title_response"], "TA");
        assert_eq!(merged[0]["context_response"], "");
    }

    #[test]
    fn test_shorter_response_stream_yields_fewer_units() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(&[("context", "ca")]),
            record(&[("context", "cb")]),
            record(&[("context", "cc")]),
        ];
        let input = write_request_file(dir.path(), 0, &["context"], &records);
        let entries = request::read_request_file(&input).unwrap();

        let responses = vec![response("req-0", "A")];
        let merged = merge_records(&entries, &responses, &keys(&["context"]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["custom_id"], "req-0");
    }

    #[test]
    fn test_unmatched_anchor_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![record(&[("context", "ca")])];
        let input = write_request_file(dir.path(), 0, &["context"], &records);
        let entries = request::read_request_file(&input).unwrap();

        // req-7 belongs to a unit that was never submitted in this file.
        let responses = vec![response("req-0", "A"), response("req-7", "ghost")];
        let merged = merge_records(&entries, &responses, &keys(&["context"]));
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0]["custom_id"], "req-0");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            record(&[("context", "ca")]),
            record(&[("context", "cb")]),
        ];
        let input = write_request_file(dir.path(), 4, &["context"], &records);
        let responses = vec![response("req-4", "A"), response("req-5", "B")];

        let first = merge_data(&input, &responses, &keys(&["context"]), None).unwrap();
        let first_bytes = std::fs::read(&first).unwrap();
        let second = merge_data(&input, &responses, &keys(&["context"]), None).unwrap();
        let second_bytes = std::fs::read(&second).unwrap();
        assert_eq!(first, second);
        assert_eq!(first_bytes, second_bytes);
    }
}
