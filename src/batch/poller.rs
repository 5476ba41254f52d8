// src/batch/poller.rs
//!
//! Job lifecycle tracking: re-fetch status on a fixed interval until a
//! terminal state shows up. Status transitions are monotonic per job, so the
//! first terminal observation ends polling permanently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::batch::job::{BatchApi, BatchJob};
use crate::config::PollPolicy;
use crate::{Error, Result};

/// Cooperative cancellation for a multi-hour wait. Cancelling abandons the
/// wait locally only; the remote job keeps running and stays resumable by its
/// batch id.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Block until the job reaches a terminal status, then return it.
///
/// The ceiling in `policy.max_attempts` bounds the number of re-queries; once
/// exhausted the wait converts to `Error::PollTimeout` instead of looping
/// forever.
pub fn poll_until_terminal(
    api: &dyn BatchApi,
    mut job: BatchJob,
    policy: &PollPolicy,
    cancel: &CancelToken,
) -> Result<BatchJob> {
    let mut attempts: u32 = 0;
    while !job.status.is_terminal() {
        if cancel.is_cancelled() {
            return Err(Error::PollCancelled { batch_id: job.id });
        }
        if attempts >= policy.max_attempts {
            return Err(Error::PollTimeout {
                batch_id: job.id,
                attempts,
            });
        }
        info!("batch {} status: {}", job.id, job.status.as_str());
        std::thread::sleep(policy.interval());
        job = api.retrieve_batch(&job.id)?;
        attempts += 1;
    }
    info!("batch {} final status: {}", job.id, job.status.as_str());
    Ok(job)
}
