//! Novelty mode: what to do when refinement on the chosen pattern runs out.
//!
//! The story is retried on other selected patterns. A pass on any of them
//! wins outright. Otherwise the draft the novelty critic rated highest is
//! accepted when its score clears the configured threshold.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use ideagate_calibrate::{PatternCatalog, PatternSelector};
use ideagate_common::config::{NoveltyModeConfig, SelectionConfig};
use ideagate_common::{Result, Story, StoryDraft};

use crate::engine::{RefinementEngine, RefinementOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoveltyModeDecision {
    /// Some attempt passed the regular decision rule.
    Passed,
    /// No attempt passed; the best novelty-rated draft cleared the threshold.
    AcceptedOnNovelty,
    GaveUp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternAttempt {
    pub pattern_id: String,
    pub outcome: RefinementOutcome,
    /// Raw score of the novelty critic on the last scored draft.
    pub novelty_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyModeOutcome {
    pub decision: NoveltyModeDecision,
    /// In the order tried; the first is the requested pattern.
    pub attempts: Vec<PatternAttempt>,
    /// Index into `attempts` of the accepted draft.
    pub selected: Option<usize>,
}

impl NoveltyModeOutcome {
    pub fn accepted(&self) -> Option<&PatternAttempt> {
        self.selected.and_then(|i| self.attempts.get(i))
    }
}

pub struct NoveltyModeRunner {
    cfg: NoveltyModeConfig,
    engine: Arc<RefinementEngine>,
    catalog: Arc<PatternCatalog>,
    selector: PatternSelector,
}

impl NoveltyModeRunner {
    pub fn new(
        cfg: &NoveltyModeConfig,
        selection: &SelectionConfig,
        engine: Arc<RefinementEngine>,
        catalog: Arc<PatternCatalog>,
    ) -> Self {
        // One slot more than the retry budget, since the requested pattern may be among them.
        let selection = SelectionConfig {
            select_pattern_count: cfg.max_patterns + 1,
            ..selection.clone()
        };
        Self {
            cfg: cfg.clone(),
            engine,
            catalog,
            selector: PatternSelector::new(&selection),
        }
    }

    #[instrument(skip(self, story), fields(max_patterns = self.cfg.max_patterns, threshold = self.cfg.score_threshold))]
    pub async fn run(&self, story: Story, pattern_id: &str) -> Result<NoveltyModeOutcome> {
        let first = self.attempt(story.clone(), pattern_id).await?;
        if first.outcome.passed() {
            return Ok(NoveltyModeOutcome {
                decision: NoveltyModeDecision::Passed,
                attempts: vec![first],
                selected: Some(0),
            });
        }

        let mut attempts = vec![first];
        let retries: Vec<String> = self
            .selector
            .select(self.catalog.patterns())
            .into_iter()
            .map(|s| s.pattern_id)
            .filter(|id| id != pattern_id)
            .take(self.cfg.max_patterns)
            .collect();
        info!(exhausted = pattern_id, retries = ?retries, "Entering novelty mode");

        for id in &retries {
            let attempt = self.attempt(story.clone(), id).await?;
            let passed = attempt.outcome.passed();
            attempts.push(attempt);
            if passed {
                info!(pattern = %id, "Novelty mode retry passed");
                return Ok(NoveltyModeOutcome {
                    decision: NoveltyModeDecision::Passed,
                    selected: Some(attempts.len() - 1),
                    attempts,
                });
            }
        }

        let best = attempts
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.novelty_score.map(|s| (i, s)))
            .fold(None, |best: Option<(usize, f64)>, (i, s)| match best {
                Some((_, b)) if b >= s => best,
                _ => Some((i, s)),
            });

        match best {
            Some((i, score)) if score >= self.cfg.score_threshold => {
                info!(pattern = %attempts[i].pattern_id, score, "Accepted on novelty");
                Ok(NoveltyModeOutcome {
                    decision: NoveltyModeDecision::AcceptedOnNovelty,
                    attempts,
                    selected: Some(i),
                })
            }
            _ => {
                warn!(
                    tried = attempts.len(),
                    best = ?best.map(|(_, s)| s),
                    "No draft cleared the novelty threshold"
                );
                Ok(NoveltyModeOutcome {
                    decision: NoveltyModeDecision::GaveUp,
                    attempts,
                    selected: None,
                })
            }
        }
    }

    async fn attempt(&self, story: Story, pattern_id: &str) -> Result<PatternAttempt> {
        let outcome = self.engine.run(StoryDraft::new(story, pattern_id)).await?;
        let novelty_score = outcome
            .last_verdict()
            .and_then(|v| v.samples.iter().find(|s| s.critic_id == self.cfg.critic_id))
            .map(|s| s.raw_score);
        Ok(PatternAttempt { pattern_id: pattern_id.to_string(), outcome, novelty_score })
    }
}
