//! ideagate-calibrate — Anchored score calibration and pass/fail decisions.
//!
//! Raw critic scores are mapped onto a pattern's own historical distribution
//! (anchors at quantiles, sigmoid-smoothed between them) and combined under a
//! named decision mode.

pub mod quantile;
pub mod anchors;
pub mod calibrator;
pub mod decision;
pub mod catalog;
pub mod selector;

pub use anchors::{Anchor, AnchorBuilder, AnchorSet, AnchorSource};
pub use calibrator::ScoreCalibrator;
pub use catalog::PatternCatalog;
pub use decision::{AnchorResolution, DecisionMode, PassDecisionEngine, ScoreSample, ThresholdSource, Verdict};
pub use selector::{PatternSelector, SelectedPattern, SelectionStrategy};
