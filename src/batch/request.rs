// src/batch/request.rs
//!
//! Request-file builder: serializes a dataset slice into the one-request-per-
//! line JSONL submission format. Request identifiers are dense and position
//! derived, so the reconciler can regroup the stream later without any side
//! table: record `i`, field `j` of a slice starting at `start` with `F`
//! fields always gets `req-{start*F + i*F + j}`.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::batch::dataset::DatasetRecord;
use crate::config::BatchRunConfig;
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// One line of the submission file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEntry {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

impl RequestEntry {
    /// The user-turn content, i.e. the last message of the conversation.
    pub fn user_content(&self) -> &str {
        self.body
            .messages
            .last()
            .map(|message| message.content.as_str())
            .unwrap_or_default()
    }

    /// Numeric suffix of a `req-<n>` identifier.
    pub fn id_suffix(custom_id: &str) -> Option<u64> {
        custom_id.strip_prefix("req-")?.parse().ok()
    }
}

/// Write the submission file for a dataset slice.
///
/// Emits exactly `records.len() × column_names.len()` lines in row-major
/// order to `batch_input_{start}_{end}.jsonl` under the configured output
/// directory, and returns the file's path.
pub fn build_request_file(
    records: &[DatasetRecord],
    config: &BatchRunConfig,
) -> Result<PathBuf> {
    let path = config
        .output_dir
        .join(format!("batch_input_{}_{}.jsonl", config.start, config.end));
    let file = std::fs::File::create(&path)?;
    let mut writer = BufWriter::new(file);

    let mut req_id = config.start as u64 * config.column_names.len() as u64;
    for record in records {
        for column in &config.column_names {
            let prompt_text = format!("{column}: {}", record.field(column)?);
            let entry = RequestEntry {
                custom_id: format!("req-{req_id}"),
                method: "POST".to_string(),
                url: config.endpoint.clone(),
                body: RequestBody {
                    model: config.model_name.clone(),
                    messages: vec![
                        ChatMessage {
                            role: "system".to_string(),
                            content: config.system_prompt().to_string(),
                        },
                        ChatMessage {
                            role: "user".to_string(),
                            content: prompt_text,
                        },
                    ],
                    temperature: Some(config.generation.temperature),
                    top_p: Some(config.generation.top_p),
                    max_tokens: Some(config.generation.max_tokens),
                },
            };
            serde_json::to_writer(&mut writer, &entry)?;
            writer.write_all(b"\n")?;
            req_id += 1;
        }
    }
    writer.flush()?;

    info!(
        "submission file written to {}: {} requests",
        path.display(),
        records.len() * config.column_names.len()
    );
    Ok(path)
}

/// Re-read a submission file from disk. The reconciler derives its grouping
/// from this durable copy, never from in-memory state.
pub fn read_request_file(path: &Path) -> Result<Vec<RequestEntry>> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}
