//! In-memory pattern lookup by id and by rank band.

use std::collections::HashMap;

use ideagate_common::Pattern;

#[derive(Debug, Clone, Default)]
pub struct PatternCatalog {
    patterns: Vec<Pattern>,
    by_id: HashMap<String, usize>,
}

impl PatternCatalog {
    /// Patterns are kept in rank order. Later duplicates of an id are ignored.
    pub fn new(mut patterns: Vec<Pattern>) -> Self {
        patterns.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.id.cmp(&b.id)));
        let mut by_id = HashMap::with_capacity(patterns.len());
        let mut kept = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            if by_id.contains_key(&pattern.id) {
                tracing::warn!(pattern = %pattern.id, "Duplicate pattern id ignored");
                continue;
            }
            by_id.insert(pattern.id.clone(), kept.len());
            kept.push(pattern);
        }
        Self { patterns: kept, by_id }
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.by_id.get(id).map(|&i| &self.patterns[i])
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Patterns whose 0-indexed rank lies in `start..=end`, in rank order.
    pub fn in_rank_range(&self, (start, end): (usize, usize)) -> impl Iterator<Item = &Pattern> {
        self.patterns
            .iter()
            .filter(move |p| (start..=end).contains(&p.rank_index()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_range_is_zero_indexed_inclusive() {
        let catalog = PatternCatalog::new(
            (1..=12).map(|r| Pattern::new(format!("p{r}"), r, 10, vec![])).collect(),
        );
        let tail: Vec<&str> = catalog.in_rank_range((4, 9)).map(|p| p.id.as_str()).collect();
        assert_eq!(tail, vec!["p5", "p6", "p7", "p8", "p9", "p10"]);
        assert_eq!(catalog.get("p12").map(|p| p.rank), Some(12));
    }

    #[test]
    fn test_duplicate_ids_keep_best_rank() {
        let catalog = PatternCatalog::new(vec![
            Pattern::new("x", 5, 1, vec![]),
            Pattern::new("x", 2, 1, vec![]),
        ]);
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("x").unwrap().rank, 2);
    }
}
