//! ideagate-common — Shared types, errors, and configuration used across all ideagate crates.

pub mod error;
pub mod entities;
pub mod config;
pub mod corpus;

// Re-export commonly used types
pub use config::{GateConfig, FallbackPolicy};
pub use entities::{CriticScore, Pattern, Story, StoryDraft, NoveltyRecord};
pub use error::{GateError, Result};
