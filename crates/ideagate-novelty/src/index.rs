//! In-memory cosine-similarity index over `NoveltyRecord`s.
//!
//! Brute force over every record. Norms are computed once at insertion.
//! Results are ordered by cosine descending; equal cosines keep insertion
//! order (stable sort).

use serde::{Deserialize, Serialize};

use ideagate_common::{GateError, NoveltyRecord, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyCandidate {
    pub paper_id: String,
    pub title: String,
    pub domain: String,
    pub cosine: f64,
}

#[derive(Debug, Clone)]
struct Entry {
    record: NoveltyRecord,
    norm: f64,
}

#[derive(Debug, Clone, Default)]
pub struct NoveltyIndex {
    dim: Option<usize>,
    entries: Vec<Entry>,
}

fn norm(v: &[f32]) -> f64 {
    v.iter().map(|&x| f64::from(x) * f64::from(x)).sum::<f64>().sqrt()
}

impl NoveltyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = NoveltyRecord>) -> Result<Self> {
        let mut index = Self::new();
        for record in records {
            index.insert(record)?;
        }
        Ok(index)
    }

    /// The first record fixes the dimension; later records must match it.
    pub fn insert(&mut self, record: NoveltyRecord) -> Result<()> {
        let actual = record.embedding.len();
        if actual == 0 {
            return Err(GateError::Config(format!("paper {} has an empty embedding", record.paper_id)));
        }
        match self.dim {
            Some(expected) if expected != actual => {
                return Err(GateError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => self.dim = Some(actual),
        }
        let norm = norm(&record.embedding);
        self.entries.push(Entry { record, norm });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    /// Top `top_k` records by cosine similarity to `vector`.
    pub fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<NoveltyCandidate>> {
        let Some(expected) = self.dim else {
            return Err(GateError::EmptyIndex);
        };
        if vector.len() != expected {
            return Err(GateError::DimensionMismatch { expected, actual: vector.len() });
        }

        let query_norm = norm(vector);
        let mut scored: Vec<(usize, f64)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine(vector, query_norm, &e.record.embedding, e.norm)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(i, cosine)| {
                let r = &self.entries[i].record;
                NoveltyCandidate {
                    paper_id: r.paper_id.clone(),
                    title: r.title.clone(),
                    domain: r.domain.clone(),
                    cosine,
                }
            })
            .collect())
    }
}

/// Zero-norm or non-finite input scores 0.
fn cosine(a: &[f32], a_norm: f64, b: &[f32], b_norm: f64) -> f64 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(&x, &y)| f64::from(x) * f64::from(y)).sum();
    let c = dot / (a_norm * b_norm);
    if c.is_finite() { c.clamp(-1.0, 1.0) } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, embedding: Vec<f32>) -> NoveltyRecord {
        NoveltyRecord { paper_id: id.into(), title: format!("Paper {id}"), domain: "nlp".into(), embedding }
    }

    #[test]
    fn test_empty_index() {
        let index = NoveltyIndex::new();
        assert!(matches!(index.query(&[1.0, 0.0], 5), Err(GateError::EmptyIndex)));
    }

    #[test]
    fn test_dimension_checked_on_insert_and_query() {
        let mut index = NoveltyIndex::new();
        index.insert(rec("a", vec![1.0, 0.0, 0.0])).unwrap();
        assert!(matches!(
            index.insert(rec("b", vec![1.0, 0.0])),
            Err(GateError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(matches!(
            index.query(&[1.0], 5),
            Err(GateError::DimensionMismatch { expected: 3, actual: 1 })
        ));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_sorted_desc_bounded_and_ties_by_insertion() {
        let index = NoveltyIndex::from_records(vec![
            rec("low", vec![0.0, 1.0]),
            rec("tie1", vec![1.0, 1.0]),
            rec("best", vec![1.0, 0.0]),
            rec("tie2", vec![2.0, 2.0]),
        ])
        .unwrap();
        let hits = index.query(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.paper_id.as_str()).collect();
        assert_eq!(ids, vec!["best", "tie1", "tie2"]);
        assert!(hits.windows(2).all(|w| w[0].cosine >= w[1].cosine));
    }

    #[test]
    fn test_zero_norm_scores_zero() {
        let index = NoveltyIndex::from_records(vec![rec("zero", vec![0.0, 0.0]), rec("x", vec![1.0, 0.0])]).unwrap();
        let hits = index.query(&[1.0, 0.0], 10).unwrap();
        assert_eq!(hits[1].paper_id, "zero");
        assert_eq!(hits[1].cosine, 0.0);
        assert!(index.query(&[0.0, 0.0], 10).unwrap().iter().all(|h| h.cosine == 0.0));
    }

    #[test]
    fn test_empty_embedding_rejected() {
        assert!(NoveltyIndex::new().insert(rec("e", vec![])).is_err());
    }
}
