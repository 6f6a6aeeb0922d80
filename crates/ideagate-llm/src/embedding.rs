//! Embedding provider — turns idea and story text into vectors for the
//! novelty index.
//!
//! Embedding failure is never an error for callers: a missing key, timeout,
//! bad status or malformed body all come back as `EmbeddingOutcome::Unavailable`
//! so the novelty check can degrade instead of aborting the session.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, warn};

use ideagate_common::config::{LoggingConfig, ProviderConfig};

use crate::backend::{build_client, check_response_status, LlmError};
use crate::call_log::{record_best_effort, CallKind, CallLog, ProviderCall, TracingCallLog};

#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddingOutcome {
    Embedded(Vec<f32>),
    Unavailable { reason: String },
}

impl EmbeddingOutcome {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable { reason: reason.into() }
    }

    pub fn into_vector(self) -> Option<Vec<f32>> {
        match self {
            Self::Embedded(v) => Some(v),
            Self::Unavailable { .. } => None,
        }
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> EmbeddingOutcome;
    fn model_id(&self) -> &str;
}

pub struct HttpEmbeddingProvider {
    provider: String,
    url: String,
    model: String,
    api_key: Option<SecretString>,
    timeout_secs: u64,
    max_preview_chars: usize,
    call_log: Arc<dyn CallLog>,
    client: reqwest::Client,
}

impl HttpEmbeddingProvider {
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
            provider.embedding_url.clone(),
            provider.embedding_model.clone(),
            key,
            provider.embedding_timeout_secs,
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

    async fn request(&self, key: &SecretString, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = serde_json::json!({ "model": &self.model, "input": text });
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key.expose_secret())
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;
        parse_embedding_response(&json)
    }
}

/// Extract `data[0].embedding`; rejects empty or non-finite vectors.
pub fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<f32>, LlmError> {
    let raw = json["data"][0]["embedding"].clone();
    if raw.is_null() {
        return Err(LlmError::Unavailable("response has no data[0].embedding".into()));
    }
    let vector: Vec<f32> = serde_json::from_value(raw)?;
    if vector.is_empty() {
        return Err(LlmError::Unavailable("empty embedding".into()));
    }
    if vector.iter().any(|x| !x.is_finite()) {
        return Err(LlmError::Unavailable("embedding contains non-finite values".into()));
    }
    Ok(vector)
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[instrument(skip(self, text), fields(provider = %self.provider, model = %self.model, chars = text.len()))]
    async fn embed(&self, text: &str) -> EmbeddingOutcome {
        let call = ProviderCall::new(
            CallKind::Embedding,
            &self.provider,
            &self.url,
            &self.model,
            text,
            self.max_preview_chars,
            self.timeout_secs,
            self.api_key.is_none(),
        );

        let Some(key) = &self.api_key else {
            record_best_effort(self.call_log.as_ref(), &call.failed(0, "API key not configured"));
            return EmbeddingOutcome::unavailable("API key not configured");
        };

        let started = Instant::now();
        let result = self.request(key, text).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(vector) => {
                let call = call.succeeded(latency_ms, &format!("dim={}", vector.len()));
                record_best_effort(self.call_log.as_ref(), &call);
                EmbeddingOutcome::Embedded(vector)
            }
            Err(e) => {
                warn!(error = %e, latency_ms, "Embedding request failed");
                record_best_effort(self.call_log.as_ref(), &call.failed(latency_ms, e.to_string()));
                EmbeddingOutcome::unavailable(e.to_string())
            }
        }
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
    fn test_parse_embedding_response() {
        let json = serde_json::json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]});
        assert_eq!(parse_embedding_response(&json).unwrap(), vec![0.1f32, 0.2, 0.3]);
    }

    #[test]
    fn test_parse_embedding_response_rejects_malformed() {
        assert!(parse_embedding_response(&serde_json::json!({"data": []})).is_err());
        assert!(parse_embedding_response(&serde_json::json!({"data": [{"embedding": []}]})).is_err());
        assert!(parse_embedding_response(&serde_json::json!({"data": [{"embedding": ["x"]}]})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_degrades_without_request() {
        let log = Arc::new(MemoryCallLog::new());
        let provider = HttpEmbeddingProvider::new("test", "http://127.0.0.1:9/v1/embeddings", "emb", None, 5)
            .unwrap()
            .with_call_log(log.clone());
        let outcome = provider.embed("a new idea").await;
        assert!(matches!(outcome, EmbeddingOutcome::Unavailable { .. }));
        assert_eq!(log.calls().len(), 1);
        assert!(log.calls()[0].simulated);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_degrades() {
        let log = Arc::new(MemoryCallLog::new());
        let provider = HttpEmbeddingProvider::new(
            "test",
            "http://127.0.0.1:9/v1/embeddings",
            "emb",
            Some(SecretString::from("sk-test".to_string())),
            2,
        )
        .unwrap()
        .with_call_log(log.clone());
        let outcome = provider.embed("a new idea").await;
        assert!(outcome.into_vector().is_none());
        let calls = log.calls();
        assert_eq!(calls.len(), 1);
        assert!(!calls[0].simulated);
        assert!(calls[0].error.is_some());
    }
}
