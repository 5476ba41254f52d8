// src/config.rs
//!
//! Configuration value objects for the extraction pipeline.
//!
//! Every config type here is immutable once constructed: all fields are known
//! up front and nothing is attached after the fact. Paths produced while a
//! run executes (e.g. the submission file) travel through return values, not
//! through config mutation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Sampling parameters forwarded to the model on every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 4096,
        }
    }
}

/// Settings for the single-request chat path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    pub model_name: String,
    /// Override for OpenAI-compatible providers with a non-default base URL
    /// (OpenRouter, DeepSeek, self-hosted gateways).
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Polling behavior for batch job lifecycle tracking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Seconds between status checks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Ceiling on status checks before the wait is abandoned locally.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_secs() -> u64 {
    5
}

fn default_max_attempts() -> u32 {
    // 4 hours at the default interval; batch completion windows are long.
    2880
}

impl PollPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Full configuration for one batch run, constructed once and never mutated.
///
/// Loaded from a TOML profile:
///
/// ```toml
/// model_name = "llama-3.3-70b-versatile"
/// endpoint = "/v1/chat/completions"
/// dataset_path = "data/law_extract.csv"
/// start = 2001
/// end = 2101
/// column_names = ["context"]
/// output_dir = "runs/2026-08"
///
/// [generation]
/// temperature = 0.7
/// top_p = 0.95
/// max_tokens = 10000
///
/// [poll]
/// interval_secs = 5
/// max_attempts = 2880
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRunConfig {
    pub model_name: String,
    /// Endpoint path referenced by every submission line and the batch job.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub dataset_path: PathBuf,
    /// Half-open record range `[start, end)` within the dataset.
    pub start: usize,
    pub end: usize,
    /// Dataset fields sent as one request each, in submission order.
    pub column_names: Vec<String>,
    /// System prompt; defaults to the legal extraction prompt.
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub poll: PollPolicy,
}

fn default_endpoint() -> String {
    "/v1/chat/completions".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

impl BatchRunConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: BatchRunConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid profile {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(Error::Config(format!(
                "empty record range [{}, {})",
                self.start, self.end
            )));
        }
        if self.column_names.is_empty() {
            return Err(Error::Config("column_names must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn system_prompt(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or(crate::prompts::LEGAL_EXTRACTION_SYSTEM_PROMPT)
    }
}
