//! Refinement loop.
//!
//! `Drafted → Scored → (Passed | Revising) → Scored → … → (Passed | Exhausted)`.
//! Each round scores the draft with every critic concurrently, calibrates and
//! decides. The iteration bound is the only cancellation: after
//! `max_iterations` failed rounds the session ends `Exhausted`.

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use ideagate_calibrate::{PassDecisionEngine, PatternCatalog, Verdict};
use ideagate_common::config::RefineConfig;
use ideagate_common::{CriticScore, GateError, Pattern, Result, Story, StoryDraft};
use ideagate_llm::{Critic, CriticError};

use crate::heuristic::RevisionGuidance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefineState {
    Drafted,
    Scored,
    Revising,
    Passed,
    Exhausted,
}

/// Produces the next story from a failed draft. Text generation lives
/// outside the engine.
#[async_trait]
pub trait StoryReviser: Send + Sync {
    async fn revise(&self, draft: &StoryDraft, guidance: &RevisionGuidance) -> Result<Story>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub final_state: RefineState,
    /// Scoring rounds run.
    pub iterations: usize,
    /// Every state entered, in order, starting with `Drafted`.
    pub transitions: Vec<RefineState>,
    pub verdicts: Vec<Verdict>,
    pub guidance: Vec<RevisionGuidance>,
    /// The last draft scored.
    pub draft: StoryDraft,
}

impl RefinementOutcome {
    pub fn passed(&self) -> bool {
        self.final_state == RefineState::Passed
    }

    pub fn last_verdict(&self) -> Option<&Verdict> {
        self.verdicts.last()
    }

    fn enter(&mut self, state: RefineState) {
        self.final_state = state;
        self.transitions.push(state);
    }
}

pub struct RefinementEngine {
    cfg: RefineConfig,
    decision: Arc<PassDecisionEngine>,
    catalog: Arc<PatternCatalog>,
    critics: Vec<Arc<dyn Critic>>,
    reviser: Arc<dyn StoryReviser>,
}

impl RefinementEngine {
    pub fn new(
        cfg: &RefineConfig,
        decision: Arc<PassDecisionEngine>,
        catalog: Arc<PatternCatalog>,
        critics: Vec<Arc<dyn Critic>>,
        reviser: Arc<dyn StoryReviser>,
    ) -> Self {
        Self { cfg: cfg.clone(), decision, catalog, critics, reviser }
    }

    #[instrument(skip(self, draft), fields(pattern = %draft.pattern_id, max = self.cfg.max_iterations))]
    pub async fn run(&self, draft: StoryDraft) -> Result<RefinementOutcome> {
        let pattern = self
            .catalog
            .get(&draft.pattern_id)
            .ok_or_else(|| GateError::Config(format!("unknown pattern '{}'", draft.pattern_id)))?;

        let mut outcome = RefinementOutcome {
            final_state: RefineState::Drafted,
            iterations: 0,
            transitions: vec![RefineState::Drafted],
            verdicts: Vec::new(),
            guidance: Vec::new(),
            draft,
        };

        while outcome.iterations < self.cfg.max_iterations {
            let scores = score_panel(&self.critics, &outcome.draft, pattern).await?;
            let verdict = self.decision.evaluate(pattern, &scores);
            outcome.iterations += 1;
            outcome.enter(RefineState::Scored);
            info!(
                round = outcome.iterations,
                passed = verdict.passed,
                samples = verdict.samples.len(),
                rationale = %verdict.rationale,
                "Round scored"
            );

            if verdict.passed {
                outcome.verdicts.push(verdict);
                outcome.enter(RefineState::Passed);
                return Ok(outcome);
            }
            if outcome.iterations >= self.cfg.max_iterations {
                outcome.verdicts.push(verdict);
                break;
            }

            outcome.enter(RefineState::Revising);
            let guidance =
                RevisionGuidance::from_verdict(pattern, &verdict, outcome.iterations, &self.catalog, &self.cfg);
            outcome.verdicts.push(verdict);
            let story = self.reviser.revise(&outcome.draft, &guidance).await?;
            outcome.draft = outcome.draft.revised(story, outcome.iterations);
            outcome.guidance.push(guidance);
        }

        outcome.enter(RefineState::Exhausted);
        Ok(outcome)
    }
}

/// One scoring barrier: every critic scores `draft` concurrently.
/// Unavailable critics are skipped; a malformed response ends the session.
pub async fn score_panel(
    critics: &[Arc<dyn Critic>],
    draft: &StoryDraft,
    pattern: &Pattern,
) -> Result<Vec<CriticScore>> {
    let results = join_all(critics.iter().map(|c| c.score(draft, pattern))).await;
    let mut scores = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(score) => scores.push(score),
            Err(CriticError::Unavailable { critic_id, reason }) => {
                warn!(critic = %critic_id, %reason, "Critic unavailable; skipped this round");
            }
            Err(e @ CriticError::Malformed { .. }) => return Err(e.into()),
        }
    }
    Ok(scores)
}
