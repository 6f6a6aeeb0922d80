//! ideagate-llm — Chat and embedding provider abstraction, LLM-backed critics,
//! and the best-effort provider call log.

pub mod backend;
pub mod embedding;
pub mod critic;
pub mod call_log;

pub use backend::{ChatBackend, LlmError, LlmRequest, LlmResponse, Message, OpenAiCompatibleBackend};
pub use call_log::{CallKind, CallLog, JsonlCallLog, MemoryCallLog, NoopCallLog, ProviderCall, TracingCallLog};
pub use critic::{Critic, CriticError, LlmCritic};
pub use embedding::{EmbeddingOutcome, EmbeddingProvider, HttpEmbeddingProvider};
