use thiserror::Error;

/// Errors the engine can report to a caller.
///
/// A structurally invalid flag is rejected at load time and never reaches
/// the hot path; everything else can surface from an evaluation or cache
/// call. Matcher-level failures never surface here — they degrade to a
/// per-rule non-match instead (see `matcher`).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("flag not found: {0}")]
    FlagNotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("invalid flag configuration: {0}")]
    InvalidFlag(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(error: anyhow::Error) -> Self {
        EngineError::Internal(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
