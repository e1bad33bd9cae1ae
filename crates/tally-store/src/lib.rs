//! # tally-store: Persistence for Tally POS
//!
//! The persistence collaborator: load and save whole entities, and hand out
//! monotonic sequence numbers. Nothing here decides a business rule.
//!
//! ## Module Organization
//!
//! - [`store`] - The `Store` trait the engine depends on
//! - [`memory`] - In-memory implementation with outage switches
//! - [`sqlite`] - SQLite implementation (JSON documents, WAL, pooled)
//! - [`migrations`] - Embedded schema migrations
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_store::{SqliteStore, Store, StoreConfig};
//!
//! let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(StoreConfig::new("tally.db")).await?);
//! let next = store.next_sequence("order:POS-01").await?;
//! ```

pub mod error;
pub mod memory;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, StoreConfig};
pub use store::{EntityKind, Store};
