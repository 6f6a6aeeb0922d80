//! Chat-completion backend trait and the OpenAI-compatible HTTP implementation.
//!
//! The gate talks to a single hosted endpoint (SiliconFlow by default) that
//! speaks the OpenAI `/chat/completions` dialect. Critics and revisers only
//! see the `ChatBackend` trait, so tests substitute scripted backends.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use ideagate_common::config::{LoggingConfig, ProviderConfig};

use crate::call_log::{record_best_effort, CallKind, CallLog, ProviderCall, TracingCallLog};

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system" | "user" | "assistant"
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages, model: None, max_tokens: None, temperature: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError>;
    fn model_id(&self) -> &str;
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> Result<LlmResponse, LlmError> {
    let content = json["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| LlmError::Unavailable("response has no choices[0].message.content".into()))?;
    Ok(LlmResponse {
        content: content.to_string(),
        model: json["model"].as_str().unwrap_or(fallback_model).to_string(),
        prompt_tokens: json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    })
}

pub(crate) async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, LlmError> {
    let status = resp.status().as_u16();
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(LlmError::ApiError { status, message: msg });
    }
    Ok(body)
}

pub(crate) fn build_client(timeout_secs: u64) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
}

// ── OpenAI-compatible endpoint ───────────────────────────────────────────────

pub struct OpenAiCompatibleBackend {
    provider: String,
    url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
    max_preview_chars: usize,
    call_log: Arc<dyn CallLog>,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    /// `url` is the full chat-completions endpoint.
    pub fn new(
        provider: impl Into<String>,
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<SecretString>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            provider: provider.into(),
            url: url.into(),
            model: model.into(),
            api_key,
            timeout_secs,
            max_preview_chars: 20_000,
            call_log: Arc::new(TracingCallLog),
            client: build_client(timeout_secs)?,
        })
    }

    pub fn from_config(provider: &ProviderConfig, logging: &LoggingConfig) -> Result<Self, LlmError> {
        let key = provider.api_key.clone().map(SecretString::from);
        Ok(Self::new(
            provider.name.clone(),
            provider.llm_api_url.clone(),
            provider.llm_model.clone(),
            key,
            provider.chat_timeout_secs,
        )?
        .with_max_preview_chars(logging.log_max_text_chars))
    }

    pub fn with_call_log(mut self, log: Arc<dyn CallLog>) -> Self {
        self.call_log = log;
        self
    }

    pub fn with_max_preview_chars(mut self, n: usize) -> Self {
        self.max_preview_chars = n;
        self
    }

    fn preview(req: &LlmRequest) -> String {
        req.messages
            .iter()
            .map(|m| format!("[{}] {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl ChatBackend for OpenAiCompatibleBackend {
    #[tracing::instrument(skip(self, req), fields(provider = %self.provider, model = %self.model))]
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, LlmError> {
        let call = ProviderCall::new(
            CallKind::Chat,
            &self.provider,
            &self.url,
            &self.model,
            &Self::preview(&req),
            self.max_preview_chars,
            self.timeout_secs,
            self.api_key.is_none(),
        );

        let Some(key) = &self.api_key else {
            record_best_effort(self.call_log.as_ref(), &call.failed(0, "API key not configured"));
            return Err(LlmError::Unavailable("API key not configured".into()));
        };

        let body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(2048),
            "temperature": req.temperature.unwrap_or(0.2),
        });

        let started = Instant::now();
        let result = async {
            let resp = self
                .client
                .post(&self.url)
                .bearer_auth(key.expose_secret())
                .json(&body)
                .send()
                .await?;
            let json = check_response_status(resp).await?;
            parse_openai_response(&json, &self.model)
        }
        .await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(resp) => record_best_effort(self.call_log.as_ref(), &call.succeeded(latency_ms, &resp.content)),
            Err(e) => record_best_effort(self.call_log.as_ref(), &call.failed(latency_ms, e.to_string())),
        }
        result
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_log::MemoryCallLog;

    #[test]
    fn test_parse_openai_response() {
        let json = serde_json::json!({
            "model": "glm",
            "choices": [{"message": {"content": "{\"score\": 7}"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 4}
        });
        let resp = parse_openai_response(&json, "fallback").unwrap();
        assert_eq!(resp.content, "{\"score\": 7}");
        assert_eq!(resp.model, "glm");
        assert_eq!(resp.completion_tokens, 4);
    }

    #[test]
    fn test_parse_openai_response_without_content_fails() {
        let json = serde_json::json!({"choices": []});
        assert!(parse_openai_response(&json, "m").is_err());
    }

    #[tokio::test]
    async fn test_missing_key_is_unavailable_and_logged() {
        let log = Arc::new(MemoryCallLog::new());
        let backend = OpenAiCompatibleBackend::new("test", "http://127.0.0.1:9/v1/chat/completions", "m", None, 5)
            .unwrap()
            .with_call_log(log.clone());
        let err = backend
            .complete(LlmRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(_)));
        let calls = log.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].simulated);
        assert!(!calls[0].ok);
    }
}
