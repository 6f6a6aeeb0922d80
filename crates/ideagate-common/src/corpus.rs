//! Reference corpus loading.
//!
//! Patterns and novelty records are read once per run from JSON arrays,
//! JSON-lines or YAML files, chosen by file extension.

use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::info;

use crate::entities::{NoveltyRecord, Pattern};
use crate::error::{GateError, Result};

pub fn load_patterns(path: impl AsRef<Path>) -> Result<Vec<Pattern>> {
    let patterns: Vec<Pattern> = load_collection(path.as_ref())?;
    if let Some(dup) = first_duplicate(patterns.iter().map(|p| p.id.as_str())) {
        return Err(GateError::Config(format!("duplicate pattern id '{dup}'")));
    }
    info!(path = %path.as_ref().display(), count = patterns.len(), "Loaded patterns");
    Ok(patterns)
}

pub fn load_records(path: impl AsRef<Path>) -> Result<Vec<NoveltyRecord>> {
    let records: Vec<NoveltyRecord> = load_collection(path.as_ref())?;
    info!(path = %path.as_ref().display(), count = records.len(), "Loaded novelty records");
    Ok(records)
}

fn load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = std::fs::read_to_string(path)?;
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "json" => Ok(serde_json::from_str(&content)?),
        "jsonl" | "ndjson" => content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(GateError::from))
            .collect(),
        "yaml" | "yml" => Ok(serde_yaml::from_str(&content)?),
        other => Err(GateError::Config(format!(
            "unsupported corpus file extension '{other}' for {}",
            path.display()
        ))),
    }
}

fn first_duplicate<'a>(ids: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().find(|id| !seen.insert(*id))
}
