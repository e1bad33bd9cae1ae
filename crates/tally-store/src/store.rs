//! # Store Trait
//!
//! The contract between the engine and whatever keeps entities durable.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Engine ──load/save whole entity──► Store                               │
//! │                                       ├── MemoryStore  (maps)           │
//! │                                       └── SqliteStore  (JSON documents) │
//! │                                                                         │
//! │  next_sequence(scope) ──► 1, 2, 3, ...   atomic, never reused           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::fmt;

use tally_core::{Order, Return, Session, ShiftReport};

use crate::error::StoreResult;

/// Kinds of stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Order,
    Session,
    Return,
    Report,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Order => "order",
            EntityKind::Session => "session",
            EntityKind::Return => "return",
            EntityKind::Report => "report",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-entity persistence.
///
/// Implementations must make `save_*` atomic per entity (all or nothing)
/// and `next_sequence` atomic and monotonic per scope.
#[async_trait]
pub trait Store: Send + Sync + fmt::Debug {
    async fn load_order(&self, id: &str) -> StoreResult<Option<Order>>;
    async fn save_order(&self, order: &Order) -> StoreResult<()>;

    async fn load_session(&self, id: &str) -> StoreResult<Option<Session>>;
    async fn save_session(&self, session: &Session) -> StoreResult<()>;

    async fn load_return(&self, id: &str) -> StoreResult<Option<Return>>;
    async fn save_return(&self, ret: &Return) -> StoreResult<()>;

    /// The sealed end-of-shift report of a session.
    async fn load_report(&self, session_id: &str) -> StoreResult<Option<ShiftReport>>;
    async fn save_report(&self, report: &ShiftReport) -> StoreResult<()>;

    /// Next value of a named counter, starting at 1.
    async fn next_sequence(&self, scope: &str) -> StoreResult<i64>;

    /// Loads every order in `ids` that exists, in `ids` order.
    async fn load_orders(&self, ids: &[String]) -> StoreResult<Vec<Order>> {
        let mut orders = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(order) = self.load_order(id).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    /// Loads every return in `ids` that exists, in `ids` order.
    async fn load_returns(&self, ids: &[String]) -> StoreResult<Vec<Return>> {
        let mut returns = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(ret) = self.load_return(id).await? {
                returns.push(ret);
            }
        }
        Ok(returns)
    }
}
