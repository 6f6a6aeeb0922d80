//! Novelty check: embed the idea, query the index, classify collision risk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use ideagate_common::config::NoveltyConfig;
use ideagate_common::{Result, Story};
use ideagate_llm::{EmbeddingOutcome, EmbeddingProvider};

use crate::index::{NoveltyCandidate, NoveltyIndex};
use crate::text::build_story_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    /// No embedding was available, so risk could not be assessed.
    Unknown,
}

impl RiskLevel {
    pub fn classify(max_similarity: f64, cfg: &NoveltyConfig) -> Self {
        if max_similarity <= cfg.low_risk_threshold {
            RiskLevel::Low
        } else if max_similarity <= cfg.collision_threshold {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

/// Field order is part of the output contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyReport {
    pub risk_level: RiskLevel,
    pub max_similarity: f64,
    pub embedding_model: String,
    pub top_k: usize,
    pub user_idea: String,
    pub run_id: Uuid,
    pub candidates: Vec<NoveltyCandidate>,
    /// True when the report was produced without an embedding.
    pub simulated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unavailable_reason: Option<String>,
    pub generated_at: DateTime<Utc>,
    /// Similarity above which a candidate counts as a collision.
    #[serde(default = "default_collision_threshold")]
    pub collision_threshold: f64,
}

fn default_collision_threshold() -> f64 {
    NoveltyConfig::default().collision_threshold
}

impl NoveltyReport {
    /// Candidates whose similarity exceeds the collision threshold.
    pub fn collisions(&self) -> impl Iterator<Item = &NoveltyCandidate> {
        let threshold = self.collision_threshold;
        self.candidates.iter().filter(move |c| c.cosine > threshold)
    }

    pub fn is_degraded(&self) -> bool {
        self.simulated
    }
}

pub struct NoveltyChecker {
    provider: Arc<dyn EmbeddingProvider>,
    index: Arc<NoveltyIndex>,
    cfg: NoveltyConfig,
}

impl NoveltyChecker {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index: Arc<NoveltyIndex>, cfg: &NoveltyConfig) -> Self {
        Self { provider, index, cfg: cfg.clone() }
    }

    pub fn index(&self) -> &NoveltyIndex {
        &self.index
    }

    /// Degrades to a simulated report when no embedding is available.
    /// Index preconditions (`EmptyIndex`, `DimensionMismatch`) are errors.
    #[instrument(skip(self, idea), fields(model = %self.provider.model_id(), top_k = self.cfg.top_k))]
    pub async fn check(&self, idea: &str) -> Result<NoveltyReport> {
        let run_id = Uuid::new_v4();
        let model = self.provider.model_id().to_string();

        let vector = match self.provider.embed(idea).await {
            EmbeddingOutcome::Embedded(v) => v,
            EmbeddingOutcome::Unavailable { reason } => {
                warn!(%run_id, %reason, "Embedding unavailable; novelty report degraded");
                return Ok(NoveltyReport {
                    risk_level: RiskLevel::Unknown,
                    max_similarity: 0.0,
                    embedding_model: model,
                    top_k: self.cfg.top_k,
                    user_idea: idea.to_string(),
                    run_id,
                    candidates: Vec::new(),
                    simulated: true,
                    unavailable_reason: Some(reason),
                    generated_at: Utc::now(),
                    collision_threshold: self.cfg.collision_threshold,
                });
            }
        };

        let candidates = self.index.query(&vector, self.cfg.top_k)?;
        let max_similarity = candidates.first().map(|c| c.cosine).unwrap_or(0.0);
        let risk_level = RiskLevel::classify(max_similarity, &self.cfg);
        info!(%run_id, max_similarity, risk = ?risk_level, n = candidates.len(), "Novelty check complete");

        Ok(NoveltyReport {
            risk_level,
            max_similarity,
            embedding_model: model,
            top_k: self.cfg.top_k,
            user_idea: idea.to_string(),
            run_id,
            candidates,
            simulated: false,
            unavailable_reason: None,
            generated_at: Utc::now(),
            collision_threshold: self.cfg.collision_threshold,
        })
    }

    pub async fn check_story(&self, story: &Story) -> Result<NoveltyReport> {
        self.check(&build_story_text(story)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        let cfg = NoveltyConfig::default();
        assert_eq!(RiskLevel::classify(0.42, &cfg), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.5, &cfg), RiskLevel::Low);
        assert_eq!(RiskLevel::classify(0.63, &cfg), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.75, &cfg), RiskLevel::Medium);
        assert_eq!(RiskLevel::classify(0.91, &cfg), RiskLevel::High);
    }

    #[test]
    fn test_risk_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RiskLevel::Unknown).unwrap(), "\"unknown\"");
    }
}
