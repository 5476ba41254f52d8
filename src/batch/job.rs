// src/batch/job.rs
//!
//! Provider-side batch job model and the client seam the pipeline talks
//! through. A job is only ever mutated by re-fetching it from the provider;
//! once a terminal status has been observed the job must not be queried again.

use std::path::Path;

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Lifecycle status reported by the provider. The set is non-exhaustive:
/// anything the provider invents beyond the three in-flight states is treated
/// as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Validating,
    InProgress,
    Finalizing,
    Completed,
    Failed,
    Expired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl BatchStatus {
    /// True once no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            BatchStatus::Validating | BatchStatus::InProgress | BatchStatus::Finalizing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Validating => "validating",
            BatchStatus::InProgress => "in_progress",
            BatchStatus::Finalizing => "finalizing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
            BatchStatus::Expired => "expired",
            BatchStatus::Cancelled => "cancelled",
            BatchStatus::Unknown => "unknown",
        }
    }
}

/// One provider-side asynchronous batch job, as returned by create/retrieve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: String,
    pub status: BatchStatus,
    #[serde(default)]
    pub input_file_id: Option<String>,
    #[serde(default)]
    pub output_file_id: Option<String>,
    #[serde(default)]
    pub error_file_id: Option<String>,
}

/// Operations the batch pipeline needs from an LLM provider. Implemented by
/// the HTTP clients in `providers`; tests inject in-memory fakes.
pub trait BatchApi {
    /// Upload a submission file as a batch-purpose artifact and return its
    /// provider file id.
    fn upload_file(&self, path: &Path) -> Result<String>;

    /// Create a batch job over a previously uploaded file. The completion
    /// window is fixed at 24 hours.
    fn create_batch(&self, endpoint: &str, input_file_id: &str) -> Result<BatchJob>;

    /// Re-fetch a job's current state.
    fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob>;

    /// Download a provider file (results or errors) to a local path.
    fn download_file(&self, file_id: &str, dest: &Path) -> Result<()>;
}

/// Durable audit record written right after job creation, before any polling.
/// If the process dies mid-poll this is what identifies the remote job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchMeta {
    pub batch_id: String,
    pub input_file_id: String,
    pub input_file_path: String,
    /// `YYYYMMDD_HHMMSS`, local to the submitting host.
    pub timestamp: String,
    pub status: String,
}

impl BatchMeta {
    pub fn submitted(batch_id: &str, input_file_id: &str, input_file_path: &Path) -> Self {
        Self {
            batch_id: batch_id.to_string(),
            input_file_id: input_file_id.to_string(),
            input_file_path: input_file_path.display().to_string(),
            timestamp: Local::now().format("%Y%m%d_%H%M%S").to_string(),
            status: "submitted".to_string(),
        }
    }

    /// Persist as `batch_meta_{batch_id}.json` under `dir`.
    pub fn write_to(&self, dir: &Path) -> Result<std::path::PathBuf> {
        let path = dir.join(format!("batch_meta_{}.json", self.batch_id));
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!BatchStatus::Validating.is_terminal());
        assert!(!BatchStatus::InProgress.is_terminal());
        assert!(!BatchStatus::Finalizing.is_terminal());
        assert!(BatchStatus::Completed.is_terminal());
        assert!(BatchStatus::Failed.is_terminal());
        assert!(BatchStatus::Expired.is_terminal());
        assert!(BatchStatus::Cancelled.is_terminal());
        assert!(BatchStatus::Unknown.is_terminal());
    }

    #[test]
    fn test_unrecognized_status_is_terminal() {
        let job: BatchJob =
            serde_json::from_str(r#"{"id": "batch_1", "status": "paused_for_review"}"#).unwrap();
        assert_eq!(job.status, BatchStatus::Unknown);
        assert!(job.status.is_terminal());
    }

    #[test]
    fn test_job_deserializes_optional_file_ids() {
        let job: BatchJob = serde_json::from_str(
            r#"{"id": "batch_2", "status": "completed", "output_file_id": "file-9"}"#,
        )
        .unwrap();
        assert_eq!(job.output_file_id.as_deref(), Some("file-9"));
        assert!(job.error_file_id.is_none());
    }

    #[test]
    fn test_meta_file_name_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let meta = BatchMeta::submitted("batch_9", "file-1", Path::new("batch_input_0_2.jsonl"));
        let path = meta.write_to(dir.path()).unwrap();
        assert!(path.ends_with("batch_meta_batch_9.json"));

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: BatchMeta = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.status, "submitted");
        chrono::NaiveDateTime::parse_from_str(&parsed.timestamp, "%Y%m%d_%H%M%S")
            .expect("timestamp should be YYYYMMDD_HHMMSS");
    }
}
