//! # Engine Error Type
//!
//! One error type for every engine operation, with a stable code the
//! calling layer can switch on.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CoreError  ── rule broken, nothing saved ──────────┐                   │
//! │  StoreError ── load/save failed, state restored ────┼──► EngineError    │
//! │  NotFound / Config ─────────────────────────────────┘        │          │
//! │                                                              ▼          │
//! │                                      ErrorResponse { code, kind, msg }  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use tally_core::{CoreError, ErrorCode, ErrorKind};
use tally_store::StoreError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read config: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

impl EngineError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Core(e) => e.code(),
            EngineError::Store(e) if e.is_retryable() => ErrorCode::StoreUnavailable,
            EngineError::Store(_) => ErrorCode::StoreFailure,
            EngineError::NotFound { .. } => ErrorCode::NotFound,
            EngineError::Config(_)
            | EngineError::ConfigIo(_)
            | EngineError::ConfigParse(_)
            | EngineError::ConfigWrite(_) => ErrorCode::ConfigError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(e) => e.kind(),
            EngineError::Store(_) => ErrorKind::Collaborator,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        }
    }

    /// Collaborator failures the caller may retry; entities were left
    /// exactly as before the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Store(e) if e.is_retryable())
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.code(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// What a presentation layer receives when an operation fails.
///
/// ```json
/// { "code": "TENDER_MISMATCH", "kind": "validation", "message": "card payment of ..." }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub kind: ErrorKind,
    pub message: String,
}

pub type EngineResult<T> = Result<T, EngineError>;
