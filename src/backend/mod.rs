//! LLM backend clients.
//!
//! Two interchangeable providers sit behind the [`Backend`] trait:
//!
//! | Kind | Type | Endpoint | Credential |
//! |------|------|----------|------------|
//! | `local` | [`OllamaBackend`] | `{base}/api/generate` | none |
//! | `remote` | [`OpenRouterBackend`] | `{base}/chat/completions` | `OPENROUTER_API_KEY` |
//!
//! Both issue exactly one blocking request per call and return the raw
//! generated text. There are no internal retries; a failed call surfaces as a
//! [`BackendError`] and the caller decides what to do with it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use parley::backend::{connect, GenerateRequest};
//! use parley::config::BackendConfig;
//!
//! let backend = connect(&BackendConfig::default())?;
//! let text = backend.generate(&GenerateRequest::new("Say hi", "phi3:mini"))?;
//! ```

mod error;
mod ollama;
mod openrouter;

pub use error::BackendError;
pub use ollama::OllamaBackend;
pub use openrouter::OpenRouterBackend;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::BackendConfig;
use crate::error::{ParleyError, Result};

/// Default base URL of a local Ollama server.
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";

/// Default base URL of the OpenRouter API.
pub const DEFAULT_REMOTE_URL: &str = "https://openrouter.ai/api/v1";

/// Default model served by the local backend.
pub const DEFAULT_LOCAL_MODEL: &str = "phi3:mini";

/// Default model requested from the remote backend.
pub const DEFAULT_REMOTE_MODEL: &str = "meta-llama/llama-3.2-3b-instruct:free";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local Ollama server (default)
    #[default]
    Local,
    /// Remote OpenRouter API
    Remote,
}

impl BackendKind {
    /// Get descriptive name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }

    /// Model used when the configuration does not name one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Local => DEFAULT_LOCAL_MODEL,
            Self::Remote => DEFAULT_REMOTE_MODEL,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "ollama" => Ok(Self::Local),
            "remote" | "openrouter" => Ok(Self::Remote),
            _ => Err(format!("Unknown backend kind: {}", s)),
        }
    }
}

/// One text-completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Full prompt text
    pub prompt: String,
    /// Model identifier understood by the backend
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Request timeout
    pub timeout: Duration,
}

impl GenerateRequest {
    /// Request with conversational defaults (300 tokens, temperature 0.8, 120s).
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: 300,
            temperature: 0.8,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the token budget.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Uniform interface over LLM providers.
///
/// Implementations must be synchronous: `generate` blocks until the backend
/// answers, fails, or the request timeout elapses.
pub trait Backend: Send + Sync {
    /// Issue one completion request and return the generated text.
    fn generate(&self, request: &GenerateRequest) -> std::result::Result<String, BackendError>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Build the backend selected by the configuration.
///
/// Selecting `remote` without an API key is a configuration error.
pub fn connect(config: &BackendConfig) -> Result<Box<dyn Backend>> {
    let timeout = Duration::from_secs(config.timeout_secs);
    match config.kind {
        BackendKind::Local => Ok(Box::new(OllamaBackend::new(&config.local_url, timeout)?)),
        BackendKind::Remote => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| {
                    ParleyError::Config(
                        "OPENROUTER_API_KEY must be set when the remote backend is selected"
                            .to_string(),
                    )
                })?;
            Ok(Box::new(OpenRouterBackend::new(
                &config.remote_url,
                api_key,
                timeout,
            )?))
        },
    }
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ParleyError::Config(format!("Failed to create HTTP client: {e}")))
}
