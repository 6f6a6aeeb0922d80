use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Arc;

use ideagate_calibrate::{PassDecisionEngine, PatternCatalog};
use ideagate_common::{CriticScore, GateConfig, Pattern, Result, Story, StoryDraft};
use ideagate_llm::{Critic, CriticError};
use ideagate_refine::{
    NoveltyModeDecision, NoveltyModeRunner, RefineState, RefinementEngine, RevisionGuidance, StoryReviser,
};

/// Scores every draft on a pattern with the same raw value.
struct PerPatternCritic {
    id: String,
    scores: HashMap<String, f64>,
}

#[async_trait]
impl Critic for PerPatternCritic {
    fn id(&self) -> &str {
        &self.id
    }

    async fn score(&self, draft: &StoryDraft, _pattern: &Pattern) -> std::result::Result<CriticScore, CriticError> {
        let raw = self.scores.get(&draft.pattern_id).copied().unwrap_or(0.0);
        Ok(CriticScore::new(self.id.clone(), raw, format!("{} on {}", self.id, draft.pattern_id)))
    }
}

struct KeepStory;

#[async_trait]
impl StoryReviser for KeepStory {
    async fn revise(&self, draft: &StoryDraft, _guidance: &RevisionGuidance) -> Result<Story> {
        Ok(draft.story.clone())
    }
}

fn critic(id: &str, scores: &[(&str, f64)]) -> Arc<dyn Critic> {
    Arc::new(PerPatternCritic {
        id: id.into(),
        scores: scores.iter().map(|(p, s)| (p.to_string(), *s)).collect(),
    })
}

fn runner(config: &GateConfig, critics: Vec<Arc<dyn Critic>>) -> NoveltyModeRunner {
    let spread: Vec<f64> = (0..30).map(|i| 4.0 + i as f64 * 0.17).collect();
    let patterns = vec![
        Pattern::new("head", 1, 40, spread.clone()),
        Pattern::new("tail", 6, 4, spread.clone()),
        Pattern::new("tail-peer", 7, 3, spread),
    ];
    let decision = PassDecisionEngine::new(config, &patterns).unwrap();
    let catalog = Arc::new(PatternCatalog::new(patterns));
    let engine = RefinementEngine::new(
        &config.refine,
        Arc::new(decision),
        catalog.clone(),
        critics,
        Arc::new(KeepStory),
    );
    NoveltyModeRunner::new(&config.novelty_mode, &config.selection, Arc::new(engine), catalog)
}

fn fixed_config() -> GateConfig {
    let mut config = GateConfig::default();
    config.pass.mode = "fixed".into();
    config
}

fn story() -> Story {
    Story { title: "Sparse probes".into(), ..Default::default() }
}

#[tokio::test]
async fn test_best_novelty_draft_is_accepted_after_exhaustion() {
    let config = fixed_config();
    let critics = vec![
        critic("rigor", &[("head", 3.0), ("tail", 3.0), ("tail-peer", 3.0)]),
        critic("novelty", &[("head", 6.5), ("tail", 5.0), ("tail-peer", 4.0)]),
    ];
    let outcome = runner(&config, critics).run(story(), "tail").await.unwrap();

    assert_eq!(outcome.decision, NoveltyModeDecision::AcceptedOnNovelty);
    let tried: Vec<&str> = outcome.attempts.iter().map(|a| a.pattern_id.as_str()).collect();
    assert_eq!(tried, vec!["tail", "head", "tail-peer"]);
    assert!(outcome.attempts.iter().all(|a| a.outcome.final_state == RefineState::Exhausted));
    let accepted = outcome.accepted().unwrap();
    assert_eq!(accepted.pattern_id, "head");
    assert_eq!(accepted.novelty_score, Some(6.5));
    assert_eq!(accepted.outcome.draft.pattern_id, "head");
}

#[tokio::test]
async fn test_gives_up_when_no_draft_clears_threshold() {
    let config = fixed_config();
    let critics = vec![
        critic("rigor", &[("head", 3.0), ("tail", 3.0), ("tail-peer", 3.0)]),
        critic("novelty", &[("head", 5.9), ("tail", 5.0), ("tail-peer", 4.0)]),
    ];
    let outcome = runner(&config, critics).run(story(), "tail").await.unwrap();

    assert_eq!(outcome.decision, NoveltyModeDecision::GaveUp);
    assert_eq!(outcome.attempts.len(), 3);
    assert!(outcome.selected.is_none());
    assert!(outcome.accepted().is_none());
}

#[tokio::test]
async fn test_retry_that_passes_wins_outright() {
    let config = fixed_config();
    let critics = vec![
        critic("rigor", &[("head", 8.0), ("tail", 3.0), ("tail-peer", 3.0)]),
        critic("novelty", &[("head", 7.5), ("tail", 9.0), ("tail-peer", 9.0)]),
    ];
    let outcome = runner(&config, critics).run(story(), "tail").await.unwrap();

    assert_eq!(outcome.decision, NoveltyModeDecision::Passed);
    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(outcome.accepted().unwrap().pattern_id, "head");
    assert!(outcome.accepted().unwrap().outcome.passed());
}

#[tokio::test]
async fn test_zero_retry_budget_judges_only_requested_pattern() {
    let mut config = fixed_config();
    config.novelty_mode.max_patterns = 0;
    let critics = vec![
        critic("rigor", &[("head", 3.0), ("tail", 3.0), ("tail-peer", 3.0)]),
        critic("novelty", &[("head", 9.0), ("tail", 6.0), ("tail-peer", 9.0)]),
    ];
    let outcome = runner(&config, critics).run(story(), "tail").await.unwrap();

    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.decision, NoveltyModeDecision::AcceptedOnNovelty);
    assert_eq!(outcome.accepted().unwrap().pattern_id, "tail");
}
