use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::LlmConfig;

#[derive(Debug, Error)]
pub enum ModelInvocationError {
    #[error("Gemini API key is missing. Set GEMINI_API_KEY or [llm].api_key")]
    MissingCredential,

    #[error("Gemini rejected the API key: {0}")]
    Credential(String),

    #[error("Gemini request failed: {0}")]
    Request(String),
}

impl ModelInvocationError {
    /// True when the failure is about the API key rather than the call itself.
    pub fn is_credential(&self) -> bool {
        matches!(
            self,
            ModelInvocationError::MissingCredential | ModelInvocationError::Credential(_)
        )
    }
}

/// Raw reply from the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub text: String,
    pub tokens_used: Option<u32>,
}

/// Sends one prompt to a generative model and returns its text.
///
/// A single attempt per call; no retry or rate-limit backoff.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Model identifier recorded on each review.
    fn model(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<ModelOutput, ModelInvocationError>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Fails immediately when no API key is configured, so a missing key
    /// stops the process at startup rather than on the first analysis.
    pub fn new(config: &LlmConfig) -> Result<Self, ModelInvocationError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(ModelInvocationError::MissingCredential)?
            .to_string();

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ModelInvocationError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.api_base().trim_end_matches('/').to_string(),
            api_key,
            model: config.model().to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    total_token_count: Option<u32>,
}

fn mentions_api_key(body: &str) -> bool {
    body.contains("API_KEY") || body.contains("API key")
}

#[async_trait]
impl ModelInvoker for GeminiClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip(self, prompt), fields(model = %self.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<ModelOutput, ModelInvocationError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&json!({
                "contents": [
                    {
                        "role": "user",
                        "parts": [{"text": prompt}]
                    }
                ]
            }))
            .send()
            .await
            .map_err(|e| ModelInvocationError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let credential = matches!(status.as_u16(), 401 | 403)
                || (status.as_u16() == 400 && mentions_api_key(&body));
            let message = format!("HTTP {status}");
            return Err(if credential {
                ModelInvocationError::Credential(message)
            } else {
                ModelInvocationError::Request(message)
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ModelInvocationError::Request(format!("undecodable response: {}", e.without_url())))?;

        let tokens_used = parsed.usage_metadata.and_then(|u| u.total_token_count);
        let text = parsed
            .candidates
            .unwrap_or_default()
            .into_iter()
            .flat_map(|candidate| {
                candidate
                    .content
                    .and_then(|content| content.parts)
                    .unwrap_or_default()
            })
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(ModelInvocationError::Request("empty response from model".to_string()));
        }

        debug!(response_chars = text.len(), tokens_used, "received model response");
        Ok(ModelOutput { text, tokens_used })
    }
}
