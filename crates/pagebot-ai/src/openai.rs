//! OpenAI-compatible chat completions provider.
//!
//! Works against any endpoint exposing `POST {base}/chat/completions`,
//! including Gemini's OpenAI compatibility layer.

use std::time::Duration;

use async_trait::async_trait;
use pagebot_core::{CompletionRequest, CompletionResponse, Usage};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::provider::{CompletionProvider, ProviderError};

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    endpoint: String,
}

impl OpenAiCompatProvider {
    /// `base_url` like `https://api.openai.com/v1` (trailing slash optional).
    pub fn new(api_key: &str, base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Other("missing LLM API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ProviderError::Other("invalid LLM API key".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body: options first so `model`/`messages` cannot be overridden.
fn request_body(request: &CompletionRequest) -> Result<Value, ProviderError> {
    let mut body = Map::new();
    for (key, value) in request.sorted_options() {
        body.insert(key.to_string(), value.clone());
    }
    body.insert("model".into(), Value::String(request.model.clone()));
    let messages = serde_json::to_value(&request.messages)
        .map_err(|e| ProviderError::Other(format!("encode messages: {e}")))?;
    body.insert("messages".into(), messages);
    Ok(Value::Object(body))
}

#[async_trait]
impl CompletionProvider for OpenAiCompatProvider {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        let body = request_body(request)?;
        debug!(endpoint = %self.endpoint, model = %request.model, "sending chat completion");
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Other(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(classify_failure(status, text));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("failed to parse completion response: {e}")))?;
        parsed.into_response(&request.model)
    }
}

fn classify_failure(status: StatusCode, body: String) -> ProviderError {
    let message = format!("provider returned {status}: {body}");
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::RateLimited {
            message,
            payload: serde_json::from_str(&body).ok(),
        }
    } else {
        ProviderError::Other(message)
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    model: Option<String>,
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

impl ChatResponse {
    fn into_response(self, requested_model: &str) -> Result<CompletionResponse, ProviderError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::Other("completion response missing content".into()))?;
        Ok(CompletionResponse {
            id: self.id,
            model: self.model.unwrap_or_else(|| requested_model.to_string()),
            content,
            usage: self.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
        })
    }
}
