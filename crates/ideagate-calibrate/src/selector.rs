//! Strategy-diverse pattern selection.
//!
//! An idea is tried against a handful of patterns: one conservative head
//! pattern, one innovative small-cluster pattern, and the best-ranked
//! remainder.

use serde::{Deserialize, Serialize};

use ideagate_common::config::SelectionConfig;
use ideagate_common::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Best-ranked pattern inside the conservative rank band.
    Conservative,
    /// Best-ranked pattern with a small cluster.
    Innovative,
    /// Next best rank not already chosen.
    Ranked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedPattern {
    pub pattern_id: String,
    pub strategy: SelectionStrategy,
}

#[derive(Debug, Clone)]
pub struct PatternSelector {
    cfg: SelectionConfig,
}

impl PatternSelector {
    pub fn new(cfg: &SelectionConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    pub fn select(&self, patterns: &[Pattern]) -> Vec<SelectedPattern> {
        let mut ranked: Vec<&Pattern> = patterns.iter().collect();
        ranked.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));

        let limit = self.cfg.select_pattern_count;
        let mut chosen: Vec<SelectedPattern> = Vec::with_capacity(limit);
        let taken = |chosen: &[SelectedPattern], p: &Pattern| chosen.iter().any(|c| c.pattern_id == p.id);

        let (lo, hi) = self.cfg.conservative_rank_range;
        if let Some(p) = ranked.iter().find(|p| (lo..=hi).contains(&p.rank_index())) {
            chosen.push(SelectedPattern { pattern_id: p.id.clone(), strategy: SelectionStrategy::Conservative });
        }

        if chosen.len() < limit {
            if let Some(p) = ranked.iter().find(|p| {
                p.cluster_size < self.cfg.innovative_cluster_threshold && !taken(&chosen, **p)
            }) {
                chosen.push(SelectedPattern { pattern_id: p.id.clone(), strategy: SelectionStrategy::Innovative });
            }
        }

        for p in &ranked {
            if chosen.len() >= limit {
                break;
            }
            if !taken(&chosen, *p) {
                chosen.push(SelectedPattern { pattern_id: p.id.clone(), strategy: SelectionStrategy::Ranked });
            }
        }

        chosen.truncate(limit);
        chosen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: &str, rank: usize, cluster: usize) -> Pattern {
        Pattern::new(id, rank, cluster, vec![])
    }

    #[test]
    fn test_selects_one_of_each_strategy() {
        let patterns = vec![p("big", 1, 80), p("mid", 2, 40), p("niche", 7, 4), p("other", 3, 30)];
        let picked = PatternSelector::new(&SelectionConfig::default()).select(&patterns);
        assert_eq!(
            picked,
            vec![
                SelectedPattern { pattern_id: "big".into(), strategy: SelectionStrategy::Conservative },
                SelectedPattern { pattern_id: "niche".into(), strategy: SelectionStrategy::Innovative },
                SelectedPattern { pattern_id: "mid".into(), strategy: SelectionStrategy::Ranked },
            ]
        );
    }

    #[test]
    fn test_no_duplicates_when_head_is_also_small() {
        let patterns = vec![p("a", 1, 3), p("b", 2, 50)];
        let picked = PatternSelector::new(&SelectionConfig::default()).select(&patterns);
        let ids: Vec<&str> = picked.iter().map(|s| s.pattern_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
