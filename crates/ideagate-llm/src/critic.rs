//! Critics score a story draft against a pattern on the 0–10 scale.
//!
//! `LlmCritic` asks a chat backend for a single JSON object
//! `{"score": <0-10>, "rationale": "<text>"}`. In strict mode the reply must be
//! exactly that object (a surrounding ```json fence is tolerated); otherwise
//! the first balanced `{...}` in the reply is used and numeric strings are
//! accepted. A malformed reply is retried up to `json_retries` extra times
//! with a corrective message appended to the conversation.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, warn};

use ideagate_common::config::CriticConfig;
use ideagate_common::{CriticScore, GateError, Pattern, StoryDraft};

use crate::backend::{ChatBackend, LlmError, LlmRequest, Message};

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 10.0;

#[derive(Debug, Error)]
pub enum CriticError {
    #[error("critic {critic_id} unavailable: {reason}")]
    Unavailable { critic_id: String, reason: String },
    #[error("critic {critic_id} returned malformed output after {attempts} attempt(s): {detail}")]
    Malformed { critic_id: String, attempts: u32, detail: String },
}

impl From<CriticError> for GateError {
    fn from(e: CriticError) -> Self {
        match e {
            CriticError::Unavailable { critic_id, reason } => {
                GateError::Unavailable(format!("critic {critic_id}: {reason}"))
            }
            CriticError::Malformed { critic_id, attempts, detail } => {
                GateError::MalformedResponse { source_id: critic_id, attempts, detail }
            }
        }
    }
}

#[async_trait]
pub trait Critic: Send + Sync {
    fn id(&self) -> &str;
    async fn score(&self, draft: &StoryDraft, pattern: &Pattern) -> Result<CriticScore, CriticError>;
}

// ── Reply parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Critique {
    pub score: f64,
    pub rationale: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictCritique {
    score: f64,
    rationale: String,
}

#[derive(Deserialize)]
struct LenientCritique {
    score: serde_json::Value,
    #[serde(default)]
    rationale: Option<String>,
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^```(?:json)?\s*(.*?)\s*```$").expect("fence regex"))
}

fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    match fence_re().captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

/// First balanced `{...}` in `raw`, if any.
fn extract_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let rest = &raw[start..];
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        if in_string {
            match c {
                '\\' if !escaped => escaped = true,
                '"' if !escaped => in_string = false,
                _ => escaped = false,
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&rest[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn check_range(score: f64) -> Result<f64, String> {
    if !score.is_finite() || !(SCORE_MIN..=SCORE_MAX).contains(&score) {
        return Err(format!("score out of range [{SCORE_MIN}, {SCORE_MAX}]: {score}"));
    }
    Ok(score)
}

pub fn parse_critique(raw: &str, strict: bool) -> Result<Critique, String> {
    if strict {
        let parsed: StrictCritique = serde_json::from_str(strip_fence(raw)).map_err(|e| e.to_string())?;
        if parsed.rationale.trim().is_empty() {
            return Err("empty 'rationale'".into());
        }
        return Ok(Critique { score: check_range(parsed.score)?, rationale: parsed.rationale });
    }

    let object = extract_object(raw).ok_or_else(|| "no JSON object in reply".to_string())?;
    let parsed: LenientCritique = serde_json::from_str(object).map_err(|e| e.to_string())?;
    let score = match &parsed.score {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("'score' is not numeric: {}", parsed.score))?;
    Ok(Critique { score: check_range(score)?, rationale: parsed.rationale.unwrap_or_default() })
}

// ── LLM critic ───────────────────────────────────────────────────────────────

const CRITIC_INSTRUCTION: &str = "You review research idea stories. Judge the story below against the \
named writing pattern from your assigned perspective. Reply with exactly one JSON object and nothing \
else: {\"score\": <number from 0 to 10>, \"rationale\": \"<one short paragraph>\"}";

pub struct LlmCritic {
    id: String,
    perspective: String,
    backend: Arc<dyn ChatBackend>,
    strict_json: bool,
    json_retries: u32,
}

impl LlmCritic {
    pub fn new(
        id: impl Into<String>,
        perspective: impl Into<String>,
        backend: Arc<dyn ChatBackend>,
        cfg: &CriticConfig,
    ) -> Self {
        Self {
            id: id.into(),
            perspective: perspective.into(),
            backend,
            strict_json: cfg.strict_json,
            json_retries: cfg.json_retries,
        }
    }

    /// The default panel: novelty, rigor and clarity reviewers, truncated or
    /// cycled to `critic_count`.
    pub fn panel(backend: Arc<dyn ChatBackend>, cfg: &CriticConfig) -> Vec<Arc<dyn Critic>> {
        const PERSPECTIVES: [(&str, &str); 3] = [
            ("novelty", "novelty and significance of the contribution"),
            ("rigor", "soundness of the method and experiment plan"),
            ("clarity", "clarity of problem framing and fit to the pattern"),
        ];
        (0..cfg.critic_count)
            .map(|i| {
                let (name, perspective) = PERSPECTIVES[i % PERSPECTIVES.len()];
                let id = if i < PERSPECTIVES.len() { name.to_string() } else { format!("{name}-{i}") };
                Arc::new(LlmCritic::new(id, perspective, backend.clone(), cfg)) as Arc<dyn Critic>
            })
            .collect()
    }

    fn prompt(&self, draft: &StoryDraft, pattern: &Pattern) -> Vec<Message> {
        let story = serde_json::to_string_pretty(&draft.story).unwrap_or_default();
        vec![
            Message::system(format!("{CRITIC_INSTRUCTION}\nPerspective: {}", self.perspective)),
            Message::user(format!(
                "Pattern: {} (id {}, rank {})\n\nStory:\n{story}",
                pattern.display_name(),
                pattern.id,
                pattern.rank
            )),
        ]
    }

    fn unavailable(&self, e: LlmError) -> CriticError {
        CriticError::Unavailable { critic_id: self.id.clone(), reason: e.to_string() }
    }
}

#[async_trait]
impl Critic for LlmCritic {
    fn id(&self) -> &str {
        &self.id
    }

    #[tracing::instrument(skip(self, draft, pattern), fields(critic = %self.id, pattern = %pattern.id))]
    async fn score(&self, draft: &StoryDraft, pattern: &Pattern) -> Result<CriticScore, CriticError> {
        let mut messages = self.prompt(draft, pattern);
        let max_attempts = self.json_retries.saturating_add(1);
        let mut last_detail = String::new();

        for attempt in 1..=max_attempts {
            let reply = self
                .backend
                .complete(LlmRequest::new(messages.clone()))
                .await
                .map_err(|e| self.unavailable(e))?;

            match parse_critique(&reply.content, self.strict_json) {
                Ok(c) => {
                    debug!(attempt, score = c.score, "Critic reply accepted");
                    return Ok(CriticScore::new(self.id.clone(), c.score, c.rationale));
                }
                Err(detail) => {
                    warn!(attempt, max_attempts, %detail, "Critic reply malformed");
                    messages.push(Message::assistant(reply.content));
                    messages.push(Message::user(format!(
                        "Your reply was rejected ({detail}). Reply again with only the JSON object."
                    )));
                    last_detail = detail;
                }
            }
        }

        Err(CriticError::Malformed { critic_id: self.id.clone(), attempts: max_attempts, detail: last_detail })
    }
}
