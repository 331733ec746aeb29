//! Gemini `generateContent` client used as a [`PatchSource`].
//!
//! Endpoint, model and credential are passed in explicitly; nothing here is
//! global. Requests run on a private single-threaded tokio runtime so the
//! client can be driven from the synchronous patch worker thread.

use serde_json::json;

use super::{PatchSource, extract_response_text, system_prompt};
use crate::error::PatchError;

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub const DEFAULT_MODEL: &str = "gemini-flash-latest";

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub model: String,
    pub api_key: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        GeminiConfig {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: api_key.into(),
        }
    }

    fn url(&self) -> String {
        format!("{}/{}:generateContent", self.endpoint.trim_end_matches('/'), self.model)
    }
}

pub struct GeminiClient {
    config: GeminiConfig,
    http: reqwest::Client,
    runtime: tokio::runtime::Runtime,
}

impl GeminiClient {
    /// Fails fast when no credential is configured.
    pub fn new(config: GeminiConfig) -> Result<Self, PatchError> {
        if config.api_key.trim().is_empty() {
            return Err(PatchError::MissingApiKey);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| PatchError::Transport(e.to_string()))?;
        Ok(GeminiClient {
            config,
            http: reqwest::Client::new(),
            runtime,
        })
    }

    async fn request(&self, prompt: &str) -> Result<String, PatchError> {
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": format!("{}\n\nUser Request: {}", system_prompt(), prompt) }],
            }],
        });

        let response = self
            .http
            .post(self.config.url())
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| PatchError::Transport(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PatchError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(PatchError::Response(format!("HTTP {status}")));
        }

        extract_response_text(&text)
    }
}

impl PatchSource for GeminiClient {
    fn generate(&self, prompt: &str) -> Result<String, PatchError> {
        self.runtime.block_on(self.request(prompt))
    }
}
