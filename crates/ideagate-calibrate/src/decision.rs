//! Pass/fail decisions over calibrated multi-critic scores.
//!
//! Decision modes are a closed set resolved from their configured name once,
//! when the engine is built. Calibrated scores are positions on the pattern's
//! anchor quantiles, so "≥ q75" compares against level 0.75 regardless of
//! which raw score the q75 anchor sits at.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use ideagate_common::config::FallbackPolicy;
use ideagate_common::{CriticScore, GateConfig, GateError, Pattern, Result};

use crate::anchors::{AnchorBuilder, AnchorSet};
use crate::calibrator::ScoreCalibrator;
use crate::quantile::order_independent_mean;

const Q50: f64 = 0.50;
const Q75: f64 = 0.75;
const EPS: f64 = 1e-9;

/// Upper end of the raw critic scale, used to express raw scores in [0, 1]
/// when no anchors apply.
pub const RAW_SCORE_MAX: f64 = 10.0;

// ── Decision modes ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecisionMode {
    /// At least two calibrated scores ≥ q75 and the mean ≥ q50.
    #[serde(rename = "two_of_three_q75_and_avg_ge_q50")]
    TwoOfThreeQ75AndAvgGeQ50,
    /// Mean calibrated score ≥ q50.
    #[serde(rename = "avg_ge_q50")]
    AvgGeQ50,
    /// Every calibrated score ≥ q50.
    #[serde(rename = "all_ge_q50")]
    AllGeQ50,
    /// Every raw score ≥ the configured pass score; anchors ignored.
    #[serde(rename = "fixed")]
    Fixed,
}

impl DecisionMode {
    pub const ALL: [DecisionMode; 4] = [
        DecisionMode::TwoOfThreeQ75AndAvgGeQ50,
        DecisionMode::AvgGeQ50,
        DecisionMode::AllGeQ50,
        DecisionMode::Fixed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionMode::TwoOfThreeQ75AndAvgGeQ50 => "two_of_three_q75_and_avg_ge_q50",
            DecisionMode::AvgGeQ50                 => "avg_ge_q50",
            DecisionMode::AllGeQ50                 => "all_ge_q50",
            DecisionMode::Fixed                    => "fixed",
        }
    }
}

impl fmt::Display for DecisionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DecisionMode {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = Self::ALL.iter().map(|m| m.as_str()).collect();
                GateError::Config(format!("unknown pass mode '{wanted}' (known: {})", known.join(", ")))
            })
    }
}

// ── Samples and verdicts ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSample {
    pub critic_id: String,
    pub raw_score: f64,
    /// In [0, 1].
    pub calibrated: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Which thresholds a verdict was judged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    Pattern,
    Global,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub pattern_id: String,
    pub samples: Vec<ScoreSample>,
    /// The configured mode.
    pub mode: DecisionMode,
    pub threshold_source: ThresholdSource,
    pub passed: bool,
    /// Which rule fired, with the numbers it saw.
    pub rationale: String,
}

/// Anchors chosen for a pattern after applying the fallback policy.
#[derive(Debug, Clone, PartialEq)]
pub enum AnchorResolution {
    Pattern(AnchorSet),
    Global(AnchorSet),
    Fixed,
}

impl AnchorResolution {
    pub fn threshold_source(&self) -> ThresholdSource {
        match self {
            AnchorResolution::Pattern(_) => ThresholdSource::Pattern,
            AnchorResolution::Global(_)  => ThresholdSource::Global,
            AnchorResolution::Fixed      => ThresholdSource::Fixed,
        }
    }

    pub fn anchors(&self) -> Option<&AnchorSet> {
        match self {
            AnchorResolution::Pattern(set) | AnchorResolution::Global(set) => Some(set),
            AnchorResolution::Fixed => None,
        }
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PassDecisionEngine {
    mode: DecisionMode,
    fallback: FallbackPolicy,
    min_pattern_papers: usize,
    pass_score: f64,
    builder: AnchorBuilder,
    calibrator: ScoreCalibrator,
    global: Option<AnchorSet>,
}

impl PassDecisionEngine {
    /// Resolve the configured mode and precompute the global anchor set from
    /// `patterns`. An unknown mode name is a configuration error.
    pub fn new(config: &GateConfig, patterns: &[Pattern]) -> Result<Self> {
        let mode: DecisionMode = config.pass.mode.parse()?;
        let builder = AnchorBuilder::new(&config.calibration, config.pass.min_pattern_papers);

        let global = if config.pass.fallback == FallbackPolicy::Global && mode != DecisionMode::Fixed {
            match builder.build_global(patterns) {
                Ok(set) => Some(set),
                Err(e) => {
                    warn!(error = %e, "Global anchors unavailable; fallback will use the fixed rule");
                    None
                }
            }
        } else {
            None
        };

        info!(
            mode = %mode,
            fallback = config.pass.fallback.as_str(),
            min_pattern_papers = config.pass.min_pattern_papers,
            global_anchors = global.as_ref().map(|g| g.len()).unwrap_or(0),
            global_avg_confidence = global.as_ref().map(|g| g.average_confidence()).unwrap_or(0.0),
            "Pass decision engine ready"
        );

        Ok(Self {
            mode,
            fallback: config.pass.fallback,
            min_pattern_papers: config.pass.min_pattern_papers,
            pass_score: config.pass.pass_score,
            builder,
            calibrator: ScoreCalibrator::new(&config.calibration),
            global,
        })
    }

    pub fn mode(&self) -> DecisionMode {
        self.mode
    }

    pub fn global_anchors(&self) -> Option<&AnchorSet> {
        self.global.as_ref()
    }

    /// Pattern anchors when the pattern has enough reference scores,
    /// otherwise whatever the fallback policy allows.
    pub fn resolve(&self, pattern: &Pattern) -> AnchorResolution {
        if self.mode == DecisionMode::Fixed {
            return AnchorResolution::Fixed;
        }
        match self.builder.build(pattern) {
            Ok(set) => AnchorResolution::Pattern(set),
            Err(e) => {
                debug!(
                    pattern = %pattern.id,
                    min_pattern_papers = self.min_pattern_papers,
                    reason = %e,
                    fallback = self.fallback.as_str(),
                    "Falling back from pattern anchors"
                );
                match (self.fallback, &self.global) {
                    (FallbackPolicy::Global, Some(global)) => AnchorResolution::Global(global.clone()),
                    _ => AnchorResolution::Fixed,
                }
            }
        }
    }

    /// Calibrate raw critic scores against the resolved anchors.
    pub fn calibrate(&self, resolution: &AnchorResolution, scores: &[CriticScore]) -> Vec<ScoreSample> {
        scores
            .iter()
            .map(|s| {
                let calibrated = match resolution.anchors() {
                    Some(set) => self.calibrator.calibrate(s.raw_score, set),
                    None if s.raw_score.is_finite() => (s.raw_score / RAW_SCORE_MAX).clamp(0.0, 1.0),
                    None => 0.0,
                };
                ScoreSample {
                    critic_id: s.critic_id.clone(),
                    raw_score: s.raw_score,
                    calibrated,
                    rationale: s.rationale.clone(),
                }
            })
            .collect()
    }

    /// Apply the decision rule. Depends only on the samples, the resolution
    /// and the configured mode.
    pub fn decide(&self, pattern_id: &str, resolution: &AnchorResolution, samples: Vec<ScoreSample>) -> Verdict {
        let threshold_source = resolution.threshold_source();
        let (passed, rationale) = if samples.is_empty() {
            (false, "no critic scores available".to_string())
        } else if threshold_source == ThresholdSource::Fixed || self.mode == DecisionMode::Fixed {
            self.fixed_rule(&samples)
        } else {
            self.anchored_rule(&samples)
        };

        Verdict {
            pattern_id: pattern_id.to_string(),
            samples,
            mode: self.mode,
            threshold_source,
            passed,
            rationale,
        }
    }

    /// Resolve, calibrate and decide in one step.
    pub fn evaluate(&self, pattern: &Pattern, scores: &[CriticScore]) -> Verdict {
        let resolution = self.resolve(pattern);
        let samples = self.calibrate(&resolution, scores);
        let verdict = self.decide(&pattern.id, &resolution, samples);
        debug!(
            pattern = %pattern.id,
            passed = verdict.passed,
            source = ?verdict.threshold_source,
            rationale = %verdict.rationale,
            "Verdict"
        );
        verdict
    }

    fn fixed_rule(&self, samples: &[ScoreSample]) -> (bool, String) {
        let below = samples
            .iter()
            .filter(|s| !(s.raw_score >= self.pass_score - EPS))
            .count();
        let passed = below == 0;
        (
            passed,
            format!(
                "fixed: {}/{} raw scores >= {:.1}",
                samples.len() - below,
                samples.len(),
                self.pass_score
            ),
        )
    }

    fn anchored_rule(&self, samples: &[ScoreSample]) -> (bool, String) {
        let calibrated: Vec<f64> = samples.iter().map(|s| s.calibrated).collect();
        let mean = order_independent_mean(&calibrated).unwrap_or(0.0);
        let n = calibrated.len();

        match self.mode {
            DecisionMode::TwoOfThreeQ75AndAvgGeQ50 => {
                let hits = calibrated.iter().filter(|&&c| c >= Q75 - EPS).count();
                let passed = hits >= 2 && mean >= Q50 - EPS;
                (passed, format!(
                    "{}: {hits}/{n} calibrated >= q75 (need 2), mean {mean:.3} vs q50",
                    self.mode
                ))
            }
            DecisionMode::AvgGeQ50 => {
                let passed = mean >= Q50 - EPS;
                (passed, format!("{}: mean {mean:.3} vs q50", self.mode))
            }
            DecisionMode::AllGeQ50 => {
                let hits = calibrated.iter().filter(|&&c| c >= Q50 - EPS).count();
                (hits == n, format!("{}: {hits}/{n} calibrated >= q50", self.mode))
            }
            DecisionMode::Fixed => self.fixed_rule(samples),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchors::{Anchor, AnchorSource};

    fn engine_with(mode: &str, fallback: FallbackPolicy, patterns: &[Pattern]) -> PassDecisionEngine {
        let mut config = GateConfig::default();
        config.pass.mode = mode.to_string();
        config.pass.fallback = fallback;
        PassDecisionEngine::new(&config, patterns).unwrap()
    }

    fn example_anchors() -> AnchorResolution {
        AnchorResolution::Pattern(
            AnchorSet::from_anchors(
                AnchorSource::Manual,
                vec![
                    Anchor::new(0.10, 4.0, 0.5),
                    Anchor::new(0.25, 5.0, 0.5),
                    Anchor::new(0.50, 6.0, 0.5),
                    Anchor::new(0.75, 8.0, 0.5),
                    Anchor::new(0.90, 9.0, 0.5),
                ],
            )
            .unwrap(),
        )
    }

    fn scores(raw: &[f64]) -> Vec<CriticScore> {
        raw.iter()
            .enumerate()
            .map(|(i, &r)| CriticScore::new(format!("critic-{i}"), r, ""))
            .collect()
    }

    fn big_pattern(id: &str) -> Pattern {
        Pattern::new(id, 1, 40, (0..40).map(|i| 3.0 + 6.0 * i as f64 / 39.0).collect())
    }

    #[test]
    fn test_mode_names_resolve() {
        for mode in DecisionMode::ALL {
            assert_eq!(mode.as_str().parse::<DecisionMode>().unwrap(), mode);
        }
        assert!(matches!("best_of_five".parse::<DecisionMode>(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_unknown_mode_rejected_at_construction() {
        let mut config = GateConfig::default();
        config.pass.mode = "nope".into();
        assert!(PassDecisionEngine::new(&config, &[]).is_err());
    }

    #[test]
    fn test_two_of_three_example_passes() {
        let engine = engine_with("two_of_three_q75_and_avg_ge_q50", FallbackPolicy::Global, &[]);
        let resolution = example_anchors();
        let samples = engine.calibrate(&resolution, &scores(&[8.2, 8.5, 6.1]));
        assert!(samples[0].calibrated >= 0.75 && samples[1].calibrated >= 0.75);
        let verdict = engine.decide("p", &resolution, samples);
        assert!(verdict.passed, "{}", verdict.rationale);
        assert_eq!(verdict.threshold_source, ThresholdSource::Pattern);
    }

    #[test]
    fn test_two_of_three_needs_two_high_scores() {
        let engine = engine_with("two_of_three_q75_and_avg_ge_q50", FallbackPolicy::Global, &[]);
        let resolution = example_anchors();
        let samples = engine.calibrate(&resolution, &scores(&[8.5, 7.0, 7.5]));
        assert!(!engine.decide("p", &resolution, samples).passed);
    }

    #[test]
    fn test_decision_is_pure_and_order_independent() {
        let engine = engine_with("two_of_three_q75_and_avg_ge_q50", FallbackPolicy::Global, &[]);
        let resolution = example_anchors();
        let a = engine.decide("p", &resolution, engine.calibrate(&resolution, &scores(&[8.0, 6.0, 8.0])));
        let b = engine.decide("p", &resolution, engine.calibrate(&resolution, &scores(&[8.0, 6.0, 8.0])));
        assert_eq!(a, b);
        let mut reversed = engine.calibrate(&resolution, &scores(&[8.0, 6.0, 8.0]));
        reversed.reverse();
        assert_eq!(engine.decide("p", &resolution, reversed).passed, a.passed);
    }

    #[test]
    fn test_integer_history_at_tied_q75_passes() {
        // q50 and q75 of this history are both 7.0
        let history: Vec<f64> = [(5.0, 5), (6.0, 8), (7.0, 10), (8.0, 5), (9.0, 2)]
            .iter()
            .flat_map(|&(score, n)| std::iter::repeat(score).take(n))
            .collect();
        let pattern = Pattern::new("ints", 1, 30, history);
        let engine = engine_with("two_of_three_q75_and_avg_ge_q50", FallbackPolicy::Global, &[pattern.clone()]);
        let verdict = engine.evaluate(&pattern, &scores(&[7.0, 7.0, 7.0]));
        assert_eq!(verdict.threshold_source, ThresholdSource::Pattern);
        assert!(verdict.samples.iter().all(|s| s.calibrated >= 0.75 - 1e-9));
        assert!(verdict.passed, "{}", verdict.rationale);
    }

    #[test]
    fn test_small_pattern_falls_back_to_global() {
        let corpus = vec![big_pattern("a"), big_pattern("b")];
        let engine = engine_with("two_of_three_q75_and_avg_ge_q50", FallbackPolicy::Global, &corpus);
        let small = Pattern::new("small", 4, 5, vec![6.0, 6.5, 7.0, 7.5, 8.0]);
        let verdict = engine.evaluate(&small, &scores(&[8.5, 8.8, 7.0]));
        assert_eq!(verdict.threshold_source, ThresholdSource::Global);
    }

    #[test]
    fn test_small_pattern_fixed_fallback_regardless_of_mode() {
        let corpus = vec![big_pattern("a")];
        let small = Pattern::new("small", 4, 5, vec![6.0, 6.5, 7.0, 7.5, 8.0]);
        for mode in ["two_of_three_q75_and_avg_ge_q50", "avg_ge_q50", "all_ge_q50"] {
            let engine = engine_with(mode, FallbackPolicy::Fixed, &corpus);
            let verdict = engine.evaluate(&small, &scores(&[7.0, 7.5, 6.9]));
            assert_eq!(verdict.threshold_source, ThresholdSource::Fixed);
            assert!(!verdict.passed, "6.9 < 7.0 must fail: {}", verdict.rationale);
            let verdict = engine.evaluate(&small, &scores(&[7.0, 7.5, 9.0]));
            assert!(verdict.passed);
        }
    }

    #[test]
    fn test_global_fallback_without_corpus_uses_fixed_rule() {
        let engine = engine_with("avg_ge_q50", FallbackPolicy::Global, &[]);
        let small = Pattern::new("small", 4, 5, vec![6.0; 5]);
        assert_eq!(engine.resolve(&small), AnchorResolution::Fixed);
    }

    #[test]
    fn test_fixed_mode_ignores_anchors() {
        let engine = engine_with("fixed", FallbackPolicy::Global, &[big_pattern("a")]);
        let verdict = engine.evaluate(&big_pattern("a"), &scores(&[7.0, 7.0, 7.0]));
        assert_eq!(verdict.threshold_source, ThresholdSource::Fixed);
        assert!(verdict.passed);
        assert!(verdict.samples.iter().all(|s| (s.calibrated - 0.7).abs() < 1e-12));
    }

    #[test]
    fn test_empty_samples_never_pass() {
        let engine = engine_with("avg_ge_q50", FallbackPolicy::Global, &[]);
        let verdict = engine.decide("p", &example_anchors(), vec![]);
        assert!(!verdict.passed);
    }
}
