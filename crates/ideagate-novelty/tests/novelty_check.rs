use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Arc;

use ideagate_common::config::NoveltyConfig;
use ideagate_common::{GateError, NoveltyRecord, Story};
use ideagate_llm::{EmbeddingOutcome, EmbeddingProvider};
use ideagate_novelty::{NoveltyChecker, NoveltyIndex, NoveltyReport, RiskLevel};

struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, _text: &str) -> EmbeddingOutcome {
        EmbeddingOutcome::Embedded(self.0.clone())
    }
    fn model_id(&self) -> &str {
        "fixed-test"
    }
}

struct OfflineEmbedder;

#[async_trait]
impl EmbeddingProvider for OfflineEmbedder {
    async fn embed(&self, _text: &str) -> EmbeddingOutcome {
        EmbeddingOutcome::unavailable("API key not configured")
    }
    fn model_id(&self) -> &str {
        "offline"
    }
}

fn record(id: &str, domain: &str, embedding: Vec<f32>) -> NoveltyRecord {
    NoveltyRecord { paper_id: id.into(), title: format!("Paper {id}"), domain: domain.into(), embedding }
}

fn index() -> Arc<NoveltyIndex> {
    Arc::new(
        NoveltyIndex::from_records(vec![
            record("p-orth", "cv", vec![0.0, 0.0, 1.0]),
            record("p-same", "nlp", vec![0.6, 0.8, 0.0]),
            record("p-near", "nlp", vec![0.6, 0.7, 0.3]),
        ])
        .unwrap(),
    )
}

#[tokio::test]
async fn test_identical_vector_ranks_first_and_is_high_risk() {
    let checker = NoveltyChecker::new(Arc::new(FixedEmbedder(vec![0.6, 0.8, 0.0])), index(), &NoveltyConfig::default());
    let report = checker.check("attention sparsity probes").await.unwrap();

    assert_eq!(report.candidates[0].paper_id, "p-same");
    assert!((report.candidates[0].cosine - 1.0).abs() < 1e-6);
    assert!((report.max_similarity - 1.0).abs() < 1e-6);
    assert_eq!(report.risk_level, RiskLevel::High);
    assert!(!report.simulated);
    assert_eq!(report.embedding_model, "fixed-test");
    assert_eq!(report.user_idea, "attention sparsity probes");
    assert!(report.candidates.windows(2).all(|w| w[0].cosine >= w[1].cosine));
    let collisions: Vec<&str> = report.collisions().map(|c| c.paper_id.as_str()).collect();
    assert_eq!(collisions, vec!["p-same", "p-near"]);
}

#[tokio::test]
async fn test_top_k_bounds_candidates() {
    let cfg = NoveltyConfig { top_k: 2, ..NoveltyConfig::default() };
    let checker = NoveltyChecker::new(Arc::new(FixedEmbedder(vec![0.0, 0.0, 1.0])), index(), &cfg);
    let report = checker.check("x").await.unwrap();
    assert_eq!(report.candidates.len(), 2);
    assert_eq!(report.top_k, 2);
    assert_eq!(report.candidates[0].paper_id, "p-orth");
}

#[tokio::test]
async fn test_unavailable_embedding_degrades() {
    let checker = NoveltyChecker::new(Arc::new(OfflineEmbedder), index(), &NoveltyConfig::default());
    let report = checker.check_story(&Story { title: "Sparse probes".into(), ..Default::default() }).await.unwrap();
    assert!(report.simulated);
    assert_eq!(report.risk_level, RiskLevel::Unknown);
    assert!(report.candidates.is_empty());
    assert_eq!(report.user_idea, "Title: Sparse probes");
    assert_eq!(report.unavailable_reason.as_deref(), Some("API key not configured"));
}

#[tokio::test]
async fn test_index_preconditions_are_errors() {
    let empty = NoveltyChecker::new(
        Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0])),
        Arc::new(NoveltyIndex::new()),
        &NoveltyConfig::default(),
    );
    assert!(matches!(empty.check("x").await, Err(GateError::EmptyIndex)));

    let wrong_dim = NoveltyChecker::new(Arc::new(FixedEmbedder(vec![1.0, 0.0])), index(), &NoveltyConfig::default());
    assert!(matches!(
        wrong_dim.check("x").await,
        Err(GateError::DimensionMismatch { expected: 3, actual: 2 })
    ));
}

#[tokio::test]
async fn test_report_serializes_in_contract_order() {
    let checker = NoveltyChecker::new(Arc::new(FixedEmbedder(vec![0.6, 0.8, 0.0])), index(), &NoveltyConfig::default());
    let report = checker.check("idea").await.unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let keys = ["risk_level", "max_similarity", "embedding_model", "top_k", "user_idea", "run_id", "candidates"];
    let positions: Vec<usize> = keys.iter().map(|k| json.find(&format!("\"{k}\"")).unwrap()).collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted);
    assert!(json.contains("\"risk_level\":\"high\""));
}

#[tokio::test]
async fn test_report_read_back_keeps_collision_threshold() {
    let cfg = NoveltyConfig { collision_threshold: 0.95, ..NoveltyConfig::default() };
    let checker = NoveltyChecker::new(Arc::new(FixedEmbedder(vec![0.6, 0.8, 0.0])), index(), &cfg);
    let report = checker.check("idea").await.unwrap();
    let json = serde_json::to_string(&report).unwrap();
    let restored: NoveltyReport = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.collision_threshold, 0.95);
    let before: Vec<&str> = report.collisions().map(|c| c.paper_id.as_str()).collect();
    let after: Vec<&str> = restored.collisions().map(|c| c.paper_id.as_str()).collect();
    assert_eq!(before, vec!["p-same"]);
    assert_eq!(after, before);
}
