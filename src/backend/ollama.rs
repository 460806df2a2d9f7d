//! Local Ollama backend (`POST /api/generate`, non-streaming).

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::error::truncate_body;
use super::{build_client, Backend, BackendError, GenerateRequest};
use crate::error::Result;

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Client for a local Ollama server.
pub struct OllamaBackend {
    base_url: String,
    client: Client,
}

impl OllamaBackend {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(timeout)?,
        })
    }

    /// Full URL of the generate endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url)
    }
}

impl Backend for OllamaBackend {
    fn generate(&self, request: &GenerateRequest) -> std::result::Result<String, BackendError> {
        let body = OllamaRequest {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(request.timeout)
            .json(&body)
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body: truncate_body(&text),
            });
        }

        let text = response.text()?;
        let parsed: OllamaResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedResponse(format!("{e}: {}", truncate_body(&text))))?;

        tracing::debug!(model = %request.model, chars = parsed.response.len(), "ollama response");
        Ok(parsed.response.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
