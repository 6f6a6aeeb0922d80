use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    /// Provider unreachable or unconfigured. Providers turn this into a
    /// degraded value; it only escapes where no degraded form exists.
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed response from {source_id} after {attempts} attempt(s): {detail}")]
    MalformedResponse {
        source_id: String,
        attempts: u32,
        detail: String,
    },

    #[error("Pattern {pattern_id} has {samples} reference scores, {required} required")]
    InsufficientData {
        pattern_id: String,
        samples: usize,
        required: usize,
    },

    #[error("Novelty index is empty")]
    EmptyIndex,

    #[error("Embedding dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GateError>;
