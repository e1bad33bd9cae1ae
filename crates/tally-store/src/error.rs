//! # Store Error Types
//!
//! Errors raised by the persistence collaborator.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / serde_json::Error / injected outage                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← categorised, retryable or not              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  EngineError::Store (tally-engine) ← code STORE_UNAVAILABLE / FAILURE  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller decides whether to retry                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store cannot be reached right now.
    ///
    /// ## When This Occurs
    /// - Memory store switched off in a test
    /// - Pool closed during shutdown
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// SQLite reported the database as locked or busy.
    #[error("Database busy: {0}")]
    Busy(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored document could not be encoded or decoded.
    #[error("Corrupt {entity} document: {source}")]
    Serialization {
        entity: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("Internal store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// True when the same call may succeed if repeated unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_)
                | StoreError::ConnectionFailed(_)
                | StoreError::Busy(_)
                | StoreError::PoolExhausted
        )
    }

    pub(crate) fn serialization(entity: &'static str, source: serde_json::Error) -> Self {
        StoreError::Serialization { entity, source }
    }
}

/// Convert sqlx errors to StoreError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database (locked/busy) → StoreError::Busy
/// sqlx::Error::Database (other)       → StoreError::QueryFailed
/// sqlx::Error::PoolTimedOut           → StoreError::PoolExhausted
/// sqlx::Error::PoolClosed             → StoreError::Unavailable
/// sqlx::Error::Io                     → StoreError::ConnectionFailed
/// Other                               → StoreError::Internal
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("database is locked") || msg.contains("database is busy") {
                    StoreError::Busy(msg.to_string())
                } else {
                    StoreError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => StoreError::PoolExhausted,

            sqlx::Error::PoolClosed => StoreError::Unavailable("pool is closed".to_string()),

            sqlx::Error::Io(io) => StoreError::ConnectionFailed(io.to_string()),

            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization {
            entity: "document",
            source: err,
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(StoreError::Unavailable("down".into()).is_retryable());
        assert!(StoreError::PoolExhausted.is_retryable());
        assert!(!StoreError::MigrationFailed("bad".into()).is_retryable());

        let bad = serde_json::from_str::<i64>("nope").unwrap_err();
        let err = StoreError::serialization("order", bad);
        assert!(!err.is_retryable());
        assert!(err.to_string().starts_with("Corrupt order document"));
    }

    #[test]
    fn test_from_sqlx() {
        assert!(matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::PoolExhausted
        ));
        assert!(StoreError::from(sqlx::Error::PoolClosed).is_retryable());
    }
}
