// src/providers.rs
//!
//! Provider clients for LLM completions.
//!
//! One `ChatClient` trait for the synchronous single-request path, with one
//! constructor-injected variant per provider family:
//! - `OpenAiCompatibleClient`: OpenAI, Groq, and any gateway speaking the
//!   OpenAI chat-completions dialect. Also implements the batch file/job API.
//! - `GeminiClient`: Google's generateContent API (no batch support here).

use std::path::Path;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::api_keys::{self, ApiKeyProvider};
use crate::batch::job::{BatchApi, BatchJob};
use crate::config::{ChatSettings, GenerationConfig};
use crate::{Error, Result};

const HTTP_TIMEOUT: Duration = Duration::from_secs(120);
const COMPLETION_WINDOW: &str = "24h";
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Common interface for single-request chat completions.
pub trait ChatClient: Send + Sync {
    /// Send one message and return the model's text response.
    fn send(&self, message: &str, config: &GenerationConfig) -> Result<String>;

    /// Get the provider name.
    fn provider_name(&self) -> &'static str;
}

fn http_client() -> ureq::Agent {
    ureq::builder().timeout(HTTP_TIMEOUT).build()
}

/// Map a ureq error to the crate error type, extracting the provider's error
/// message from the response body when one is present.
fn provider_error(provider: &'static str, err: ureq::Error) -> Error {
    match err {
        ureq::Error::Status(code, resp) => {
            let message = resp
                .into_json::<Value>()
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {code} error"));
            Error::Provider {
                provider,
                status: code,
                message,
            }
        }
        other => Error::Http(Box::new(other)),
    }
}

fn is_transient(err: &ureq::Error) -> bool {
    match err {
        ureq::Error::Status(code, _) => *code >= 500,
        ureq::Error::Transport(_) => true,
    }
}

/// Run one provider call with bounded retry on transient failures (transport
/// errors and 5xx). The closure must be safe to repeat; callers never retry
/// across a partially-completed multi-step operation.
fn retry_transient<T>(
    provider: &'static str,
    what: &str,
    call: impl FnMut() -> std::result::Result<T, ureq::Error>,
) -> Result<T> {
    retry_with_backoff(provider, what, RETRY_BASE_DELAY, call)
}

fn retry_with_backoff<T>(
    provider: &'static str,
    what: &str,
    base_delay: Duration,
    mut call: impl FnMut() -> std::result::Result<T, ureq::Error>,
) -> Result<T> {
    let mut delay = base_delay;
    let mut attempt = 1;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(err) if attempt < RETRY_ATTEMPTS && is_transient(&err) => {
                warn!(
                    "{provider} {what} failed (attempt {attempt}/{RETRY_ATTEMPTS}), \
                     retrying in {delay:?}: {err}"
                );
                std::thread::sleep(delay);
                delay *= 2;
                attempt += 1;
            }
            Err(err) => return Err(provider_error(provider, err)),
        }
    }
}

// ============================================================================
// OpenAI-Compatible Client (OpenAI, Groq, custom gateways)
// ============================================================================

pub struct OpenAiCompatibleClient {
    provider: &'static str,
    api_base: String,
    api_key: String,
    model_name: String,
}

impl OpenAiCompatibleClient {
    pub fn new_openai(settings: &ChatSettings) -> Result<Self> {
        Self::with_provider(ApiKeyProvider::OpenAI, "https://api.openai.com/v1", settings)
    }

    pub fn new_groq(settings: &ChatSettings) -> Result<Self> {
        Self::with_provider(
            ApiKeyProvider::Groq,
            "https://api.groq.com/openai/v1",
            settings,
        )
    }

    fn with_provider(
        provider: ApiKeyProvider,
        default_base: &str,
        settings: &ChatSettings,
    ) -> Result<Self> {
        let api_key = api_keys::load_api_key(provider)?;
        let api_base = settings
            .base_url
            .clone()
            .unwrap_or_else(|| default_base.to_string());
        Ok(Self {
            provider: match provider {
                ApiKeyProvider::OpenAI => "OpenAI",
                ApiKeyProvider::Groq => "Groq",
                ApiKeyProvider::Gemini => "OpenAI-Compatible",
            },
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model_name: settings.model_name.clone(),
        })
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }
}

impl ChatClient for OpenAiCompatibleClient {
    fn send(&self, message: &str, config: &GenerationConfig) -> Result<String> {
        let payload = serde_json::json!({
            "model": self.model_name,
            "messages": [{
                "role": "user",
                "content": message
            }],
            "temperature": config.temperature,
            "top_p": config.top_p,
            "max_tokens": config.max_tokens,
        });

        let url = format!("{}/chat/completions", self.api_base);
        let response = http_client()
            .post(&url)
            .set("Authorization", &self.bearer())
            .set("Content-Type", "application/json")
            .send_json(&payload)
            .map_err(|e| provider_error(self.provider, e))?;

        let response_json: Value = response.into_json()?;
        let text = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| Error::Provider {
                provider: self.provider,
                status: 200,
                message: "no content in chat response".to_string(),
            })?
            .to_string();

        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        self.provider
    }
}

impl BatchApi for OpenAiCompatibleClient {
    fn upload_file(&self, path: &Path) -> Result<String> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("batch_input.jsonl");
        let bytes = std::fs::read(path)?;
        let boundary = multipart_boundary();
        let body = multipart_batch_body(&boundary, file_name, &bytes);

        let url = format!("{}/files", self.api_base);
        let response = retry_transient(self.provider, "file upload", || {
            http_client()
                .post(&url)
                .set("Authorization", &self.bearer())
                .set(
                    "Content-Type",
                    &format!("multipart/form-data; boundary={boundary}"),
                )
                .send_bytes(&body)
        })?;

        let response_json: Value = response.into_json()?;
        response_json["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::Provider {
                provider: self.provider,
                status: 200,
                message: "file upload response carried no id".to_string(),
            })
    }

    fn create_batch(&self, endpoint: &str, input_file_id: &str) -> Result<BatchJob> {
        let payload = serde_json::json!({
            "input_file_id": input_file_id,
            "endpoint": endpoint,
            "completion_window": COMPLETION_WINDOW,
        });

        let url = format!("{}/batches", self.api_base);
        // Safe to repeat: the upload already finished and we reference its id.
        let response = retry_transient(self.provider, "batch create", || {
            http_client()
                .post(&url)
                .set("Authorization", &self.bearer())
                .set("Content-Type", "application/json")
                .send_json(&payload)
        })?;

        Ok(response.into_json()?)
    }

    fn retrieve_batch(&self, batch_id: &str) -> Result<BatchJob> {
        let url = format!("{}/batches/{batch_id}", self.api_base);
        let response = http_client()
            .get(&url)
            .set("Authorization", &self.bearer())
            .call()
            .map_err(|e| provider_error(self.provider, e))?;
        Ok(response.into_json()?)
    }

    fn download_file(&self, file_id: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/files/{file_id}/content", self.api_base);
        let response = http_client()
            .get(&url)
            .set("Authorization", &self.bearer())
            .call()
            .map_err(|e| provider_error(self.provider, e))?;

        let mut reader = response.into_reader();
        let mut file = std::fs::File::create(dest)?;
        std::io::copy(&mut reader, &mut file)?;
        Ok(())
    }
}

fn multipart_boundary() -> String {
    // Unique enough per process invocation; the payload is JSONL text that
    // never contains the marker.
    format!(
        "----lexviet-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_micros()
    )
}

fn multipart_batch_body(boundary: &str, file_name: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"purpose\"\r\n\r\nbatch\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{file_name}\"\r\nContent-Type: application/jsonl\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

// ============================================================================
// Google Gemini Client
// ============================================================================

pub struct GeminiClient {
    api_key: String,
    model_name: String,
}

impl GeminiClient {
    pub fn new(settings: &ChatSettings) -> Result<Self> {
        let api_key = api_keys::load_api_key(ApiKeyProvider::Gemini)?;
        Ok(Self {
            api_key,
            model_name: settings.model_name.clone(),
        })
    }
}

impl ChatClient for GeminiClient {
    fn send(&self, message: &str, config: &GenerationConfig) -> Result<String> {
        let payload = serde_json::json!({
            "contents": [{
                "parts": [{
                    "text": message
                }]
            }],
            "generationConfig": {
                "temperature": config.temperature,
                "topP": config.top_p,
                "maxOutputTokens": config.max_tokens,
            }
        });

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model_name, self.api_key
        );

        let response = http_client()
            .post(&url)
            .set("Content-Type", "application/json")
            .send_json(&payload)
            .map_err(|e| provider_error("Google", e))?;

        let response_json: Value = response.into_json()?;
        let text = response_json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| Error::Provider {
                provider: "Google",
                status: 200,
                message: "no text in Gemini response".to_string(),
            })?
            .to_string();

        Ok(text)
    }

    fn provider_name(&self) -> &'static str {
        "Google"
    }
}

/// Build a chat client for the named provider.
pub fn chat_client_for(
    provider: ApiKeyProvider,
    settings: &ChatSettings,
) -> Result<Box<dyn ChatClient>> {
    Ok(match provider {
        ApiKeyProvider::OpenAI => Box::new(OpenAiCompatibleClient::new_openai(settings)?),
        ApiKeyProvider::Groq => Box::new(OpenAiCompatibleClient::new_groq(settings)?),
        ApiKeyProvider::Gemini => Box::new(GeminiClient::new(settings)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_body_layout() {
        let body = multipart_batch_body("----b", "batch_input_0_2.jsonl", b"{\"a\":1}\n");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("------b\r\n"));
        assert!(text.contains("name=\"purpose\"\r\n\r\nbatch\r\n"));
        assert!(text.contains("filename=\"batch_input_0_2.jsonl\""));
        assert!(text.contains("{\"a\":1}\n"));
        assert!(text.ends_with("\r\n------b--\r\n"));
    }

    #[test]
    fn test_transient_classification() {
        let status = ureq::Error::Status(503, ureq::Response::new(503, "Service Unavailable", "").unwrap());
        assert!(is_transient(&status));
        let client_err = ureq::Error::Status(401, ureq::Response::new(401, "Unauthorized", "").unwrap());
        assert!(!is_transient(&client_err));
    }

    fn unavailable() -> ureq::Error {
        ureq::Error::Status(503, ureq::Response::new(503, "Service Unavailable", "").unwrap())
    }

    #[test]
    fn test_retry_recovers_from_transient_failures() {
        let mut calls = 0;
        let value = retry_with_backoff("Groq", "file upload", Duration::ZERO, || {
            calls += 1;
            if calls < 3 {
                Err(unavailable())
            } else {
                Ok("file-1")
            }
        })
        .unwrap();
        assert_eq!(value, "file-1");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_retry_gives_up_after_attempt_ceiling() {
        let mut calls = 0;
        let err = retry_with_backoff(
            "Groq",
            "file upload",
            Duration::ZERO,
            || -> std::result::Result<(), ureq::Error> {
                calls += 1;
                Err(unavailable())
            },
        )
        .unwrap_err();
        assert_eq!(calls, RETRY_ATTEMPTS);
        assert!(matches!(err, Error::Provider { status: 503, .. }));
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let mut calls = 0;
        let err = retry_with_backoff(
            "Groq",
            "batch create",
            Duration::ZERO,
            || -> std::result::Result<(), ureq::Error> {
                calls += 1;
                Err(ureq::Error::Status(
                    401,
                    ureq::Response::new(401, "Unauthorized", "").unwrap(),
                ))
            },
        )
        .unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(err, Error::Provider { status: 401, .. }));
    }
}
