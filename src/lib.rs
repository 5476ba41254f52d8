// src/lib.rs

use serde::Serialize;

/// Crate-wide error type. Transport and I/O failures are transparent wrappers
/// around their source errors; domain failures carry enough context to be
/// actionable from a log line alone.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("HTTP transport error: {0}")]
    Http(#[from] Box<ureq::Error>),
    #[error("{provider} API error (HTTP {status}): {message}")]
    Provider {
        provider: &'static str,
        status: u16,
        message: String,
    },
    #[error("configuration error: {0}")]
    Config(String),
    #[error("document extraction failed: {0}")]
    Extraction(String),
    #[error("dataset record has no field named '{0}'")]
    MissingField(String),
    #[error("batch {batch_id} still not terminal after {attempts} status checks")]
    PollTimeout { batch_id: String, attempts: u32 },
    #[error("polling for batch {batch_id} was cancelled; the job keeps running remotely")]
    PollCancelled { batch_id: String },
    #[error("batch {batch_id} reports completed but returned no output file id")]
    MissingOutputFile { batch_id: String },
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        Error::Http(Box::new(err))
    }
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod api_keys;
pub mod batch;
pub mod config;
pub mod document;
pub mod logging;
pub mod prompts;
pub mod providers;
