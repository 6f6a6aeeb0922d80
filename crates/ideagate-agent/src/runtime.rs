//! Wiring from `GateConfig` to concrete providers, sinks and corpora.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use ideagate_common::config::LoggingConfig;
use ideagate_common::{corpus, GateConfig, NoveltyRecord, Pattern};
use ideagate_llm::{CallLog, JsonlCallLog, NoopCallLog, TracingCallLog};

pub const CALL_LOG_FILE: &str = "provider_calls.jsonl";

/// JSON-lines file when a log directory is configured, tracing otherwise.
pub fn build_call_log(cfg: &LoggingConfig) -> Arc<dyn CallLog> {
    if !cfg.enable_call_log {
        return Arc::new(NoopCallLog);
    }
    match &cfg.log_dir {
        Some(dir) => {
            let path = Path::new(dir).join(CALL_LOG_FILE);
            info!(path = %path.display(), "Provider call log enabled");
            Arc::new(JsonlCallLog::new(path))
        }
        None => Arc::new(TracingCallLog),
    }
}

fn resolve(cli: Option<&Path>, configured: Option<&str>, what: &str) -> Result<PathBuf> {
    cli.map(Path::to_path_buf)
        .or_else(|| configured.map(PathBuf::from))
        .with_context(|| format!("no {what} path: pass --{what} or set corpus.{what}_path"))
}

pub fn load_patterns(config: &GateConfig, cli: Option<&Path>) -> Result<Vec<Pattern>> {
    let path = resolve(cli, config.corpus.patterns_path.as_deref(), "patterns")?;
    corpus::load_patterns(&path).with_context(|| format!("loading patterns from {}", path.display()))
}

pub fn load_records(config: &GateConfig, cli: Option<&Path>) -> Result<Vec<NoveltyRecord>> {
    let path = resolve(cli, config.corpus.records_path.as_deref(), "records")?;
    corpus::load_records(&path).with_context(|| format!("loading novelty records from {}", path.display()))
}
