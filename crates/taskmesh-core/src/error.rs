use thiserror::Error;

/// Convenience alias used across all Taskmesh crates.
pub type MeshResult<T> = Result<T, MeshError>;

/// Error taxonomy of the orchestration core.
///
/// `Validation` and `NotFound` are caller errors and are never retried.
/// `Unavailable`, `Timeout`, and `Transport` describe dispatch-path failures;
/// per-step dispatch failures are folded into result lists at the executor
/// boundary instead of being propagated as errors.
#[derive(Error, Debug)]
pub enum MeshError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No active worker available: {0}")]
    Unavailable(String),

    #[error("Dispatch timed out: {0}")]
    Timeout(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MeshError {
    /// Machine-parsable kind string carried in API error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            MeshError::Validation(_) => "validation",
            MeshError::NotFound(_) => "not_found",
            MeshError::Unavailable(_) => "unavailable",
            MeshError::Timeout(_) => "timeout",
            MeshError::Transport(_) => "transport",
            MeshError::Config(_) => "config",
            MeshError::Serialization(_) => "serialization",
            MeshError::Io(_) => "io",
        }
    }
}
