//! ideagate-refine — Bounded critique/revise loop over a story draft, and the
//! novelty-mode fallback across patterns when the loop is exhausted.

pub mod engine;
pub mod heuristic;
pub mod novelty_mode;

pub use engine::{score_panel, RefineState, RefinementEngine, RefinementOutcome, StoryReviser};
pub use heuristic::{InjectionHeuristic, RevisionGuidance};
pub use novelty_mode::{NoveltyModeDecision, NoveltyModeOutcome, NoveltyModeRunner, PatternAttempt};
