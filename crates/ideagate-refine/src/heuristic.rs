//! Injection heuristic and the revision guidance handed to the reviser.
//!
//! A failing draft on a long-tail pattern gets under-explored tail exemplars;
//! one on a large head pattern gets strong canonical exemplars; anything else
//! is revised from critic feedback alone.

use serde::{Deserialize, Serialize};

use ideagate_calibrate::{PatternCatalog, ScoreSample, Verdict};
use ideagate_common::config::RefineConfig;
use ideagate_common::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionHeuristic {
    Tail,
    Head,
    Standard,
}

fn in_range(value: usize, (lo, hi): (usize, usize)) -> bool {
    (lo..=hi).contains(&value)
}

impl InjectionHeuristic {
    pub fn select(pattern: &Pattern, cfg: &RefineConfig) -> Self {
        let rank = pattern.rank_index();
        if in_range(rank, cfg.tail_injection_rank_range) {
            InjectionHeuristic::Tail
        } else if in_range(rank, cfg.head_injection_rank_range)
            && pattern.cluster_size > cfg.head_injection_cluster_threshold
        {
            InjectionHeuristic::Head
        } else {
            InjectionHeuristic::Standard
        }
    }

    /// Exemplar patterns for this heuristic, best rank first, excluding `current`.
    pub fn exemplars<'a>(&self, catalog: &'a PatternCatalog, current: &str, cfg: &RefineConfig) -> Vec<&'a Pattern> {
        match self {
            InjectionHeuristic::Tail => catalog
                .in_rank_range(cfg.tail_injection_rank_range)
                .filter(|p| p.id != current)
                .collect(),
            InjectionHeuristic::Head => catalog
                .in_rank_range(cfg.head_injection_rank_range)
                .filter(|p| p.id != current && p.cluster_size > cfg.head_injection_cluster_threshold)
                .collect(),
            InjectionHeuristic::Standard => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionGuidance {
    pub heuristic: InjectionHeuristic,
    /// The round that failed (1-based).
    pub iteration: usize,
    pub pattern_id: String,
    pub exemplar_pattern_ids: Vec<String>,
    pub critic_feedback: Vec<ScoreSample>,
    pub verdict_rationale: String,
}

impl RevisionGuidance {
    pub fn from_verdict(
        pattern: &Pattern,
        verdict: &Verdict,
        iteration: usize,
        catalog: &PatternCatalog,
        cfg: &RefineConfig,
    ) -> Self {
        let heuristic = InjectionHeuristic::select(pattern, cfg);
        Self {
            heuristic,
            iteration,
            pattern_id: pattern.id.clone(),
            exemplar_pattern_ids: heuristic
                .exemplars(catalog, &pattern.id, cfg)
                .into_iter()
                .map(|p| p.id.clone())
                .collect(),
            critic_feedback: verdict.samples.clone(),
            verdict_rationale: verdict.rationale.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, rank: usize, cluster: usize) -> Pattern {
        Pattern::new(id, rank, cluster, vec![])
    }

    #[test]
    fn test_select_by_rank_and_cluster() {
        let cfg = RefineConfig::default();
        assert_eq!(InjectionHeuristic::select(&p("a", 5, 3), &cfg), InjectionHeuristic::Tail);
        assert_eq!(InjectionHeuristic::select(&p("a", 10, 3), &cfg), InjectionHeuristic::Tail);
        assert_eq!(InjectionHeuristic::select(&p("a", 2, 16), &cfg), InjectionHeuristic::Head);
        // Head band but cluster not above the threshold.
        assert_eq!(InjectionHeuristic::select(&p("a", 2, 15), &cfg), InjectionHeuristic::Standard);
        assert_eq!(InjectionHeuristic::select(&p("a", 4, 40), &cfg), InjectionHeuristic::Standard);
        assert_eq!(InjectionHeuristic::select(&p("a", 11, 40), &cfg), InjectionHeuristic::Standard);
    }

    #[test]
    fn test_exemplars_follow_band() {
        let cfg = RefineConfig::default();
        let catalog = PatternCatalog::new(vec![
            p("h1", 1, 30),
            p("h2", 2, 5),
            p("h3", 3, 20),
            p("t5", 5, 4),
            p("t6", 6, 2),
            p("x12", 12, 1),
        ]);
        let ids = |v: Vec<&Pattern>| v.into_iter().map(|p| p.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(InjectionHeuristic::Tail.exemplars(&catalog, "t5", &cfg)), vec!["t6"]);
        assert_eq!(ids(InjectionHeuristic::Head.exemplars(&catalog, "h1", &cfg)), vec!["h3"]);
        assert!(InjectionHeuristic::Standard.exemplars(&catalog, "h1", &cfg).is_empty());
    }
}
