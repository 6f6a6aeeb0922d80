//! Calibration anchors derived from a pattern's reference score distribution.
//!
//! An anchor pins a quantile level to the raw score observed at that level,
//! with a confidence reflecting how densely the distribution is sampled
//! around it. Initial anchors come from the configured quantile list; when
//! average confidence is low or linear interpolation between neighbouring
//! anchors misses the empirical quantile curve, extra anchors are inserted
//! inside the worst segment until the loss clears or the anchor budget runs out.

use serde::{Deserialize, Serialize};
use tracing::debug;

use ideagate_common::config::CalibrationConfig;
use ideagate_common::{GateError, Pattern, Result};

use crate::quantile::{band_overlap, quantile_linear, snap_to_grid, sorted_finite, SCORE_EPS};

/// Half-width of the density band around an anchor, as a fraction of the span.
const DENSITY_BAND_FRACTION: f64 = 0.10;

/// Pseudo pattern id used for the combined distribution.
pub const GLOBAL_PATTERN_ID: &str = "__global__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub quantile: f64,
    pub score: f64,
    pub confidence: f64,
    /// Reference scores nearest the anchor, capped by `anchor_max_exemplars`.
    pub exemplars: Vec<f64>,
}

impl Anchor {
    pub fn new(quantile: f64, score: f64, confidence: f64) -> Self {
        Self { quantile, score, confidence, exemplars: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnchorSource {
    Pattern { pattern_id: String },
    Global,
    /// Hand-built anchors (tests, imported calibrations).
    Manual,
}

/// Anchors ordered by quantile, strictly increasing in quantile and score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorSet {
    pub source: AnchorSource,
    anchors: Vec<Anchor>,
    pub sample_count: usize,
    /// Worst segment interpolation loss after densification.
    pub max_segment_loss: f64,
    /// Number of anchors added by densification.
    pub densified: usize,
}

impl AnchorSet {
    /// Build a set from explicit anchors. Fails unless quantiles and scores
    /// are both strictly increasing and every value is finite.
    pub fn from_anchors(source: AnchorSource, anchors: Vec<Anchor>) -> Result<Self> {
        if anchors.is_empty() {
            return Err(GateError::Config("anchor set must not be empty".into()));
        }
        if anchors.iter().any(|a| !a.score.is_finite() || !(0.0..=1.0).contains(&a.quantile)) {
            return Err(GateError::Config("anchors need finite scores and quantiles in [0, 1]".into()));
        }
        let increasing = anchors
            .windows(2)
            .all(|w| w[1].quantile > w[0].quantile && w[1].score > w[0].score);
        if !increasing {
            return Err(GateError::Config(
                "anchors must be strictly increasing in quantile and score".into(),
            ));
        }
        Ok(Self {
            source,
            anchors,
            sample_count: 0,
            max_segment_loss: 0.0,
            densified: 0,
        })
    }

    pub fn anchors(&self) -> &[Anchor] {
        &self.anchors
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }

    pub fn average_confidence(&self) -> f64 {
        mean_confidence(&self.anchors)
    }

    /// Raw score of the anchor placed at quantile `q`, if there is one.
    pub fn score_at(&self, q: f64) -> Option<f64> {
        self.anchors
            .iter()
            .find(|a| (a.quantile - q).abs() < 1e-6)
            .map(|a| a.score)
    }
}

/// Computes anchor sets for patterns and for the combined corpus.
#[derive(Debug, Clone)]
pub struct AnchorBuilder {
    cfg: CalibrationConfig,
    min_samples: usize,
}

impl AnchorBuilder {
    pub fn new(cfg: &CalibrationConfig, min_samples: usize) -> Self {
        Self { cfg: cfg.clone(), min_samples }
    }

    /// Anchors for one pattern, or `InsufficientData` when the pattern has
    /// fewer reference scores than the configured minimum.
    pub fn build(&self, pattern: &Pattern) -> Result<AnchorSet> {
        let samples = pattern.sample_count();
        if samples < self.min_samples.max(1) {
            return Err(GateError::InsufficientData {
                pattern_id: pattern.id.clone(),
                samples,
                required: self.min_samples.max(1),
            });
        }
        self.build_from_scores(
            &pattern.reference_scores,
            AnchorSource::Pattern { pattern_id: pattern.id.clone() },
        )
    }

    /// Anchors over every pattern's reference scores combined.
    pub fn build_global(&self, patterns: &[Pattern]) -> Result<AnchorSet> {
        let combined: Vec<f64> = patterns
            .iter()
            .flat_map(|p| p.reference_scores.iter().copied())
            .collect();
        let samples = combined.iter().filter(|s| s.is_finite()).count();
        if samples < self.min_samples.max(1) {
            return Err(GateError::InsufficientData {
                pattern_id: GLOBAL_PATTERN_ID.to_string(),
                samples,
                required: self.min_samples.max(1),
            });
        }
        self.build_from_scores(&combined, AnchorSource::Global)
    }

    /// Anchor a raw distribution. No minimum-size check beyond non-empty.
    pub fn build_from_scores(&self, scores: &[f64], source: AnchorSource) -> Result<AnchorSet> {
        let sorted = sorted_finite(scores);
        if sorted.is_empty() {
            return Err(GateError::InsufficientData {
                pattern_id: source_label(&source),
                samples: 0,
                required: 1,
            });
        }

        let mut anchors: Vec<Anchor> = Vec::with_capacity(self.cfg.anchor_max_total);
        for &q in self.cfg.anchor_quantiles.iter().take(self.cfg.anchor_max_initial) {
            let Some(score) = quantile_linear(&sorted, q) else { continue };
            // A run of tied scores keeps its highest quantile.
            if let Some(prev) = anchors.last_mut() {
                if score <= prev.score + SCORE_EPS {
                    prev.quantile = q;
                    continue;
                }
            }
            anchors.push(Anchor::new(q, score, local_confidence(&sorted, score)));
        }

        let initial = anchors.len();
        self.densify(&sorted, &mut anchors);
        let densified = anchors.len() - initial;

        for anchor in &mut anchors {
            anchor.exemplars = nearest_exemplars(&sorted, anchor.score, self.cfg.anchor_max_exemplars);
        }

        let max_segment_loss = segment_losses(&sorted, &anchors, self.cfg.grid_step)
            .into_iter()
            .fold(0.0, f64::max);

        debug!(
            source = %source_label(&source),
            samples = sorted.len(),
            anchors = anchors.len(),
            densified,
            avg_confidence = mean_confidence(&anchors),
            max_segment_loss,
            "Anchors built"
        );

        Ok(AnchorSet {
            source,
            anchors,
            sample_count: sorted.len(),
            max_segment_loss,
            densified,
        })
    }

    fn needs_densify(&self, sorted: &[f64], anchors: &[Anchor]) -> bool {
        let worst = segment_losses(sorted, anchors, self.cfg.grid_step)
            .into_iter()
            .fold(0.0, f64::max);
        mean_confidence(anchors) < self.cfg.densify_min_avg_conf
            || worst > self.cfg.densify_loss_threshold
    }

    /// Insert anchors into the worst segments until the loss and confidence
    /// conditions clear, the budget is used up, or no segment can be split.
    fn densify(&self, sorted: &[f64], anchors: &mut Vec<Anchor>) {
        while anchors.len() < self.cfg.anchor_max_total && self.needs_densify(sorted, anchors) {
            let losses = segment_losses(sorted, anchors, self.cfg.grid_step);
            let mut order: Vec<usize> = (0..losses.len()).collect();
            order.sort_by(|&a, &b| losses[b].total_cmp(&losses[a]));

            let candidate = order
                .iter()
                .find_map(|&i| self.split_segment(sorted, &anchors[i], &anchors[i + 1]));

            match candidate {
                Some(anchor) => {
                    let pos = anchors.partition_point(|a| a.quantile < anchor.quantile);
                    anchors.insert(pos, anchor);
                }
                None => break,
            }
        }
    }

    /// First offset around the segment midpoint that yields an anchor
    /// strictly inside the segment in both quantile and score.
    fn split_segment(&self, sorted: &[f64], lo: &Anchor, hi: &Anchor) -> Option<Anchor> {
        let mid = (lo.quantile + hi.quantile) / 2.0;
        let half = (hi.quantile - lo.quantile) / 2.0;
        self.cfg.densify_offsets.iter().find_map(|offset| {
            let q = snap_to_grid(mid + offset * half, self.cfg.grid_step);
            if q <= lo.quantile + SCORE_EPS || q >= hi.quantile - SCORE_EPS {
                return None;
            }
            let score = quantile_linear(sorted, q)?;
            if score <= lo.score + SCORE_EPS || score >= hi.score - SCORE_EPS {
                return None;
            }
            Some(Anchor::new(q, score, local_confidence(sorted, score)))
        })
    }
}

fn source_label(source: &AnchorSource) -> String {
    match source {
        AnchorSource::Pattern { pattern_id } => pattern_id.clone(),
        AnchorSource::Global => GLOBAL_PATTERN_ID.to_string(),
        AnchorSource::Manual => "manual".to_string(),
    }
}

fn mean_confidence(anchors: &[Anchor]) -> f64 {
    if anchors.is_empty() {
        return 0.0;
    }
    anchors.iter().map(|a| a.confidence).sum::<f64>() / anchors.len() as f64
}

/// Density-based confidence: samples within ±10% of the span around `score`,
/// relative to what a uniform distribution would place there, squashed by
/// r / (1 + r). Uniform density gives 0.5; sparse regions approach 0.
fn local_confidence(sorted: &[f64], score: f64) -> f64 {
    let (min, max) = (sorted[0], sorted[sorted.len() - 1]);
    let span = max - min;
    if span <= SCORE_EPS {
        return 1.0;
    }
    let band = span * DENSITY_BAND_FRACTION;
    let local = sorted.iter().filter(|&&x| (x - score).abs() <= band).count() as f64;
    let expected = sorted.len() as f64 * band_overlap(score, band, min, max) / span;
    if expected <= 0.0 {
        return 0.0;
    }
    let ratio = local / expected;
    ratio / (1.0 + ratio)
}

/// Mean absolute gap, on the quantile grid inside each segment, between the
/// empirical quantile curve and the straight line through the two anchors,
/// normalised by the distribution span.
fn segment_losses(sorted: &[f64], anchors: &[Anchor], grid_step: f64) -> Vec<f64> {
    let span = sorted[sorted.len() - 1] - sorted[0];
    anchors
        .windows(2)
        .map(|w| {
            let (lo, hi) = (&w[0], &w[1]);
            if span <= SCORE_EPS {
                return 0.0;
            }
            let mut total = 0.0;
            let mut count = 0usize;
            let mut step = 1usize;
            loop {
                let q = lo.quantile + step as f64 * grid_step;
                if q >= hi.quantile - SCORE_EPS {
                    break;
                }
                let t = (q - lo.quantile) / (hi.quantile - lo.quantile);
                let interp = lo.score + t * (hi.score - lo.score);
                if let Some(actual) = quantile_linear(sorted, q) {
                    total += (actual - interp).abs();
                    count += 1;
                }
                step += 1;
            }
            if count == 0 { 0.0 } else { total / count as f64 / span }
        })
        .collect()
}

fn nearest_exemplars(sorted: &[f64], score: f64, cap: usize) -> Vec<f64> {
    let mut by_distance: Vec<f64> = sorted.to_vec();
    by_distance.sort_by(|a, b| (a - score).abs().total_cmp(&(b - score).abs()));
    by_distance.truncate(cap);
    by_distance
}
