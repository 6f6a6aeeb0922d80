//! ideagate-novelty — Embedding-similarity index over reference papers and
//! the novelty check that classifies collision risk for a candidate idea.

pub mod checker;
pub mod index;
pub mod text;

pub use checker::{NoveltyChecker, NoveltyReport, RiskLevel};
pub use index::{NoveltyCandidate, NoveltyIndex};
pub use text::{build_paper_text, build_story_text};
