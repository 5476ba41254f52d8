// src/api_keys.rs
//!
//! API key resolution for LLM providers.
//!
//! Keys are read from the environment. The pipeline runs on headless servers,
//! so there is no interactive credential store; deployments export the
//! variables before invoking the binary.

use crate::{Error, Result};

/// Supported LLM providers that require API keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyProvider {
    OpenAI,
    Groq,
    Gemini,
}

impl ApiKeyProvider {
    /// Environment variable holding the key for this provider.
    pub fn env_var(&self) -> &'static str {
        match self {
            ApiKeyProvider::OpenAI => "OPENAI_API_KEY",
            ApiKeyProvider::Groq => "GROQ_API_KEY",
            ApiKeyProvider::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Get the display name for this provider.
    pub fn display_name(&self) -> &'static str {
        match self {
            ApiKeyProvider::OpenAI => "OpenAI",
            ApiKeyProvider::Groq => "Groq",
            ApiKeyProvider::Gemini => "Google (Gemini)",
        }
    }

    /// Parse provider from string (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Some(ApiKeyProvider::OpenAI),
            "groq" => Some(ApiKeyProvider::Groq),
            "gemini" | "google" => Some(ApiKeyProvider::Gemini),
            _ => None,
        }
    }
}

/// Load an API key for a provider.
pub fn load_api_key(provider: ApiKeyProvider) -> Result<String> {
    std::env::var(provider.env_var()).map_err(|_| {
        Error::Config(format!(
            "{} API key not configured; set {}",
            provider.display_name(),
            provider.env_var()
        ))
    })
}
