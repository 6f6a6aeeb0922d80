/// Core entity types shared by the calibration, novelty and refinement crates.
/// Reference corpus records are immutable once loaded; drafts are owned by a
/// single refinement session.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// A recurring idea structure with its historical critic score distribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// 1-based popularity rank (1 = most common).
    pub rank: usize,
    /// Number of historical papers sharing the pattern.
    pub cluster_size: usize,
    /// Historical critic scores (0–10 scale).
    #[serde(default)]
    pub reference_scores: Vec<f64>,
}

impl Pattern {
    pub fn new(id: impl Into<String>, rank: usize, cluster_size: usize, reference_scores: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rank,
            cluster_size,
            reference_scores,
        }
    }

    /// Number of usable (finite) reference scores.
    pub fn sample_count(&self) -> usize {
        self.reference_scores.iter().filter(|s| s.is_finite()).count()
    }

    /// 0-indexed rank as used by the rank-range settings.
    pub fn rank_index(&self) -> usize {
        self.rank.saturating_sub(1)
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// The story artifact consumed by downstream reporting. Field order is part
/// of the output contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub problem_framing: String,
    pub gap_pattern: String,
    pub solution: String,
    pub method_skeleton: String,
    #[serde(default)]
    pub innovation_claims: Vec<String>,
    pub experiments_plan: String,
}

/// A story under refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryDraft {
    pub story: Story,
    pub pattern_id: String,
    /// Number of completed scoring rounds.
    pub iteration: usize,
}

impl StoryDraft {
    pub fn new(story: Story, pattern_id: impl Into<String>) -> Self {
        Self {
            story,
            pattern_id: pattern_id.into(),
            iteration: 0,
        }
    }

    /// Successor draft on the same pattern after `iteration` rounds.
    pub fn revised(&self, story: Story, iteration: usize) -> Self {
        Self {
            story,
            pattern_id: self.pattern_id.clone(),
            iteration,
        }
    }
}

// ---------------------------------------------------------------------------
// Critic output
// ---------------------------------------------------------------------------

/// One critic's raw judgement of a draft, before calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriticScore {
    pub critic_id: String,
    /// Raw score on the 0–10 scale.
    pub raw_score: f64,
    pub rationale: String,
}

impl CriticScore {
    pub fn new(critic_id: impl Into<String>, raw_score: f64, rationale: impl Into<String>) -> Self {
        Self {
            critic_id: critic_id.into(),
            raw_score,
            rationale: rationale.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Novelty corpus
// ---------------------------------------------------------------------------

/// A reference paper with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyRecord {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub domain: String,
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_story_serializes_in_contract_order() {
        let story = Story {
            title: "t".into(),
            abstract_text: "a".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&story).unwrap();
        let keys = [
            "title", "abstract", "problem_framing", "gap_pattern",
            "solution", "method_skeleton", "innovation_claims", "experiments_plan",
        ];
        let mut last = 0;
        for key in keys {
            let pos = json.find(&format!("\"{key}\"")).unwrap();
            assert!(pos >= last, "{key} out of order in {json}");
            last = pos;
        }
    }

    #[test]
    fn test_sample_count_ignores_non_finite() {
        let p = Pattern::new("p1", 1, 3, vec![5.0, f64::NAN, 7.0]);
        assert_eq!(p.sample_count(), 2);
        assert_eq!(p.rank_index(), 0);
    }
}
