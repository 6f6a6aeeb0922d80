//! Raw score → calibrated confidence.
//!
//! Between two bracketing anchors the score is pushed through a sigmoid of
//! steepness `k` centred on the bracket midpoint, rescaled so each anchor maps
//! exactly onto its own quantile. The result reads as "where this score sits
//! in the pattern's own history", so a calibrated 0.75 means the q75 anchor.
//! Outside the anchor range the nearest anchor is the clamp point and a
//! sigmoid tail carries the value toward 0 or 1.

use ideagate_common::config::CalibrationConfig;

use crate::anchors::{Anchor, AnchorSet};
use crate::quantile::sigmoid;

#[derive(Debug, Clone, Copy)]
pub struct ScoreCalibrator {
    k: f64,
}

impl ScoreCalibrator {
    pub fn new(cfg: &CalibrationConfig) -> Self {
        Self { k: cfg.sigmoid_k }
    }

    pub fn with_steepness(k: f64) -> Self {
        Self { k }
    }

    /// Calibrated value in [0, 1]. Non-finite input maps to 0.
    pub fn calibrate(&self, raw: f64, set: &AnchorSet) -> f64 {
        let anchors = set.anchors();
        if !raw.is_finite() || anchors.is_empty() {
            return 0.0;
        }
        let first = &anchors[0];
        let last = &anchors[anchors.len() - 1];

        let value = if raw <= first.score {
            first.quantile * (1.0 - self.tail(first.score - raw))
        } else if raw >= last.score {
            last.quantile + (1.0 - last.quantile) * self.tail(raw - last.score)
        } else {
            // first.score < raw < last.score, so both neighbours exist.
            let hi_idx = anchors.partition_point(|a| a.score <= raw);
            self.between(raw, &anchors[hi_idx - 1], &anchors[hi_idx])
        };
        value.clamp(0.0, 1.0)
    }

    fn between(&self, raw: f64, lo: &Anchor, hi: &Anchor) -> f64 {
        let mid = (lo.score + hi.score) / 2.0;
        let s_lo = sigmoid(self.k * (lo.score - mid));
        let s_hi = sigmoid(self.k * (hi.score - mid));
        let position = (sigmoid(self.k * (raw - mid)) - s_lo) / (s_hi - s_lo);
        lo.quantile + position * (hi.quantile - lo.quantile)
    }

    /// 0 at distance 0, rising toward 1 as the distance grows.
    fn tail(&self, distance: f64) -> f64 {
        2.0 * sigmoid(self.k * distance) - 1.0
    }
}
