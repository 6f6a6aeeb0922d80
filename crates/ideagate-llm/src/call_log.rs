//! Provider call log.
//!
//! Every chat and embedding call produces a `ProviderCall` entry for
//! observability. Sinks are a side channel: `record_best_effort` swallows
//! sink failures so logging can never change the outcome of a call.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Chat,
    Embedding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCall {
    pub id: Uuid,
    pub kind: CallKind,
    pub provider: String,
    pub url: String,
    pub model: String,
    pub input_preview: String,
    pub timeout_secs: u64,
    /// True when no request was sent (provider unconfigured).
    pub simulated: bool,
    pub ok: bool,
    pub latency_ms: u64,
    pub error: Option<String>,
    /// SHA-256 of the response body, when there was one.
    pub output_hash: Option<String>,
    pub called_at: chrono::DateTime<Utc>,
}

impl ProviderCall {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: CallKind,
        provider: &str,
        url: &str,
        model: &str,
        input: &str,
        max_preview_chars: usize,
        timeout_secs: u64,
        simulated: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            provider: provider.to_string(),
            url: url.to_string(),
            model: model.to_string(),
            input_preview: truncate_chars(input, max_preview_chars),
            timeout_secs,
            simulated,
            ok: false,
            latency_ms: 0,
            error: None,
            output_hash: None,
            called_at: Utc::now(),
        }
    }

    pub fn succeeded(mut self, latency_ms: u64, output: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(output.as_bytes());
        self.ok = true;
        self.latency_ms = latency_ms;
        self.output_hash = Some(format!("{:x}", hasher.finalize()));
        self
    }

    pub fn failed(mut self, latency_ms: u64, error: impl Into<String>) -> Self {
        self.ok = false;
        self.latency_ms = latency_ms;
        self.error = Some(error.into());
        self
    }
}

/// Truncate on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub trait CallLog: Send + Sync {
    fn record(&self, call: &ProviderCall) -> anyhow::Result<()>;
}

/// Record a call, discarding any sink failure.
pub fn record_best_effort(log: &dyn CallLog, call: &ProviderCall) {
    if let Err(e) = log.record(call) {
        tracing::debug!(error = %e, call_id = %call.id, "Call log write failed; ignored");
    }
}

/// Emits each call as a structured tracing event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCallLog;

impl CallLog for TracingCallLog {
    fn record(&self, call: &ProviderCall) -> anyhow::Result<()> {
        tracing::info!(
            kind = ?call.kind,
            provider = %call.provider,
            model = %call.model,
            ok = call.ok,
            simulated = call.simulated,
            latency_ms = call.latency_ms,
            error = call.error.as_deref().unwrap_or(""),
            "Provider call"
        );
        Ok(())
    }
}

/// Drops every call; used when the call log is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallLog;

impl CallLog for NoopCallLog {
    fn record(&self, _call: &ProviderCall) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
#[derive(Debug)]
pub struct JsonlCallLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlCallLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl CallLog for JsonlCallLog {
    fn record(&self, call: &ProviderCall) -> anyhow::Result<()> {
        let line = serde_json::to_string(call)?;
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("call log lock poisoned"))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

/// Keeps calls in memory; used by tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryCallLog {
    calls: Mutex<Vec<ProviderCall>>,
}

impl MemoryCallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CallLog for MemoryCallLog {
    fn record(&self, call: &ProviderCall) -> anyhow::Result<()> {
        self.calls
            .lock()
            .map_err(|_| anyhow::anyhow!("call log lock poisoned"))?
            .push(call.clone());
        Ok(())
    }
}
