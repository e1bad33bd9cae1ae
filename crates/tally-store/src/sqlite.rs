//! # SQLite Store
//!
//! Durable [`Store`] on a pooled SQLite database. Each entity is one JSON
//! document; a handful of plain columns (number, status) sit beside it for
//! people reading the file with other tools.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  StoreConfig::new(path) ← pool settings                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqliteStore::connect(config).await ← pool + migrations                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                            │
//! │  │            SqlitePool                   │                            │
//! │  │  orders │ sessions │ returns │ reports  │  id → JSON body            │
//! │  │  sequences                              │  scope → value             │
//! │  └─────────────────────────────────────────┘                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases run in WAL mode so report reads never block drawer writes.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use tally_core::{Order, Return, Session, ShiftReport};

use crate::error::{StoreError, StoreResult};
use crate::migrations;
use crate::store::{EntityKind, Store};

const MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// SQLite store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = StoreConfig::new("/var/lib/tally/tally.db").max_connections(5);
/// let store = SqliteStore::connect(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Default: 5
    pub max_connections: u32,

    /// Default: 1
    pub min_connections: u32,

    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// In-memory database (tests). One connection, never recycled, since
    /// the data lives only as long as that connection.
    pub fn in_memory() -> Self {
        StoreConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(60),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == MEMORY_PATH
    }
}

// =============================================================================
// SqliteStore
// =============================================================================

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens the pool and (by default) applies migrations.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing SQLite store"
        );

        let pool = if config.is_in_memory() {
            let options = SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .acquire_timeout(config.connect_timeout)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
        } else {
            let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());
            let options = SqliteConnectOptions::from_str(&connect_url)
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .acquire_timeout(config.connect_timeout)
                .idle_timeout(Some(config.idle_timeout))
                .connect_with(options)
                .await
                .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?
        };

        info!(
            max_connections = config.max_connections,
            "SQLite pool created"
        );

        let store = SqliteStore { pool };
        if config.run_migrations {
            migrations::run_migrations(&store.pool).await?;
        }
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        info!("Closing SQLite pool");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn load_doc<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        sql: &'static str,
        key: &str,
    ) -> StoreResult<Option<T>> {
        let body: Option<String> = sqlx::query_scalar(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        body.map(|b| {
            serde_json::from_str(&b).map_err(|e| StoreError::serialization(kind.as_str(), e))
        })
        .transpose()
    }
}

fn encode<T: Serialize>(kind: EntityKind, value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::serialization(kind.as_str(), e))
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_order(&self, id: &str) -> StoreResult<Option<Order>> {
        self.load_doc(EntityKind::Order, "SELECT body FROM orders WHERE id = ?1", id)
            .await
    }

    async fn save_order(&self, order: &Order) -> StoreResult<()> {
        debug!(order_id = %order.id, status = %order.status, "Saving order");
        let body = encode(EntityKind::Order, order)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, order_number, status, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                order_number = excluded.order_number,
                status = excluded.status,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&order.id)
        .bind(&order.order_number)
        .bind(order.status.to_string())
        .bind(body)
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_session(&self, id: &str) -> StoreResult<Option<Session>> {
        self.load_doc(EntityKind::Session, "SELECT body FROM sessions WHERE id = ?1", id)
            .await
    }

    async fn save_session(&self, session: &Session) -> StoreResult<()> {
        debug!(session_id = %session.id, status = %session.status, "Saving session");
        let body = encode(EntityKind::Session, session)?;

        sqlx::query(
            r#"
            INSERT INTO sessions (id, terminal_id, status, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&session.id)
        .bind(&session.terminal_id)
        .bind(session.status.to_string())
        .bind(body)
        .bind(session.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_return(&self, id: &str) -> StoreResult<Option<Return>> {
        self.load_doc(EntityKind::Return, "SELECT body FROM returns WHERE id = ?1", id)
            .await
    }

    async fn save_return(&self, ret: &Return) -> StoreResult<()> {
        debug!(return_id = %ret.id, status = %ret.status, "Saving return");
        let body = encode(EntityKind::Return, ret)?;
        let updated_at = ret.decided_at.unwrap_or(ret.created_at);

        sqlx::query(
            r#"
            INSERT INTO returns (id, order_id, status, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&ret.id)
        .bind(&ret.order_id)
        .bind(ret.status.to_string())
        .bind(body)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_report(&self, session_id: &str) -> StoreResult<Option<ShiftReport>> {
        self.load_doc(
            EntityKind::Report,
            "SELECT body FROM reports WHERE session_id = ?1",
            session_id,
        )
        .await
    }

    async fn save_report(&self, report: &ShiftReport) -> StoreResult<()> {
        debug!(
            session_id = %report.session_id,
            number = %report.report_number,
            "Saving report"
        );
        let body = encode(EntityKind::Report, report)?;

        sqlx::query(
            r#"
            INSERT INTO reports (session_id, report_number, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(session_id) DO UPDATE SET
                report_number = excluded.report_number,
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&report.session_id)
        .bind(&report.report_number)
        .bind(body)
        .bind(report.generated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn next_sequence(&self, scope: &str) -> StoreResult<i64> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (scope, value) VALUES (?1, 1)
            ON CONFLICT(scope) DO UPDATE SET value = value + 1
            RETURNING value
            "#,
        )
        .bind(scope)
        .fetch_one(&self.pool)
        .await?;

        debug!(scope, value, "Issued sequence value");
        Ok(value)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
