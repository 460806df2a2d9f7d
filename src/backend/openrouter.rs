//! Remote OpenRouter backend (OpenAI-compatible chat completions).

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use super::error::truncate_body;
use super::{build_client, Backend, BackendError, GenerateRequest};
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

/// Client for the OpenRouter chat completions API.
pub struct OpenRouterBackend {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenRouterBackend {
    /// Create a client for `base_url` authenticated with `api_key`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: build_client(timeout)?,
        })
    }

    /// Full URL of the chat completions endpoint.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

impl Backend for OpenRouterBackend {
    fn generate(&self, request: &GenerateRequest) -> std::result::Result<String, BackendError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![Message {
                role: "user".to_string(),
                content: Some(request.prompt.clone()),
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(request.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("X-Title", "Parley Opinion Simulation")
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
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::MalformedResponse(format!("{e}: {}", truncate_body(&text))))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BackendError::MalformedResponse("response has no message content".to_string()))?;

        tracing::debug!(model = %request.model, chars = content.len(), "openrouter response");
        Ok(content.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}
