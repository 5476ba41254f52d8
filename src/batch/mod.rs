// src/batch/mod.rs
//!
//! Asynchronous batch extraction pipeline.
//!
//! One run packages a dataset slice into a JSONL submission file, hands it to
//! the provider's batch API, tracks the job until a terminal status, and
//! reconciles the flat request/response streams back into one merged record
//! per source document. Files are the sole handoff mechanism between steps,
//! so every later step can be re-run from durable state.
//!
//! Components:
//! - dataset: slice selection over local dataset files
//! - request: submission-file builder with position-derived request ids
//! - job: provider job model, client seam, metadata sidecar
//! - poller: lifecycle tracking with ceiling and cancellation
//! - results: result retrieval flattening
//! - merge: reconciliation into merged records

pub mod dataset;
pub mod job;
pub mod merge;
pub mod poller;
pub mod request;
pub mod results;

use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use tracing::{info, warn};

pub use dataset::{DatasetRecord, DatasetSource, FileDataset};
pub use job::{BatchApi, BatchJob, BatchMeta, BatchStatus};
pub use poller::CancelToken;
pub use results::ResponseEntry;

use crate::config::BatchRunConfig;
use crate::{Error, Result};

/// Terminal result of one batch run. Job-level failure is a non-exceptional
/// negative outcome; only transport and I/O problems surface as errors.
#[derive(Debug)]
pub enum BatchRunOutcome {
    Completed {
        batch_id: String,
        merged_output: PathBuf,
    },
    Failed {
        batch_id: String,
        status: BatchStatus,
        error_file: Option<PathBuf>,
    },
}

/// Execute one full batch run: build → upload → create → poll →
/// (recover | retrieve → flatten → merge).
///
/// Blocks the calling thread for the job's whole lifetime; `cancel` is the
/// only way to abandon the wait early (the remote job then keeps running).
pub fn run_batch(
    api: &dyn BatchApi,
    config: &BatchRunConfig,
    cancel: &CancelToken,
) -> Result<BatchRunOutcome> {
    config.validate()?;
    std::fs::create_dir_all(&config.output_dir)?;

    // Step 1: materialize the slice and write the submission file.
    let source = FileDataset::new(&config.dataset_path);
    let records = source.load_slice(config.start, config.end)?;
    info!(
        "selected {} records from {} [{}, {})",
        records.len(),
        config.dataset_path.display(),
        config.start,
        config.end
    );
    let input_file = request::build_request_file(&records, config)?;

    // Step 2: upload and create the job.
    let input_file_id = api.upload_file(&input_file)?;
    info!(
        "uploaded input file {} as {input_file_id}",
        input_file.display()
    );
    let job = api.create_batch(&config.endpoint, &input_file_id)?;
    info!("batch job created: {}", job.id);

    // Step 3: durable audit trail, written before any polling so a crash
    // mid-wait still leaves the job id on disk.
    let meta_path =
        BatchMeta::submitted(&job.id, &input_file_id, &input_file).write_to(&config.output_dir)?;
    info!("batch metadata saved to {}", meta_path.display());

    // Step 4: wait for a terminal status.
    let job = poller::poll_until_terminal(api, job, &config.poll, cancel)?;

    // Step 5: failure recovery path.
    if job.status != BatchStatus::Completed {
        warn!("batch {} ended with status {}", job.id, job.status.as_str());
        let mut error_file = None;
        if let Some(error_file_id) = &job.error_file_id {
            let path = config
                .output_dir
                .join(format!("batch_errors_{}_{}.jsonl", config.start, config.end));
            api.download_file(error_file_id, &path)?;
            info!("error file saved to {}", path.display());
            let reader = BufReader::new(std::fs::File::open(&path)?);
            if let Some(first_line) = reader.lines().next().transpose()? {
                info!("first error line: {first_line}");
            }
            error_file = Some(path);
        }
        return Ok(BatchRunOutcome::Failed {
            batch_id: job.id,
            status: job.status,
            error_file,
        });
    }

    // Step 6: retrieve results. A completed job without an output file is a
    // distinct failure mode, not a normal failed status.
    let output_file_id = job
        .output_file_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::MissingOutputFile {
            batch_id: job.id.clone(),
        })?;
    let results_path = config
        .output_dir
        .join(format!("batch_results_{}_{}.jsonl", config.start, config.end));
    api.download_file(output_file_id, &results_path)?;
    info!("result file saved to {}", results_path.display());

    // Step 7: flatten, persist the flat collection, reconcile.
    let objects = results::flatten_results_file(&results_path)?;
    let converted_path = results::write_converted(&objects, &results_path)?;
    info!("flattened results saved to {}", converted_path.display());
    let responses = results::response_entries(&objects);

    let merged_output = merge::merge_data(
        &input_file,
        &responses,
        &config.column_names,
        Some(&config.output_dir),
    )?;

    info!("batch {} completed successfully", job.id);
    Ok(BatchRunOutcome::Completed {
        batch_id: job.id,
        merged_output,
    })
}
