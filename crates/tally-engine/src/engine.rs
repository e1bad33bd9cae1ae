//! # PosEngine
//!
//! The service every driver talks to. Operations live in sibling modules
//! (`orders`, `payments`, `sessions`, `returns`, `reports`); this module
//! holds the shared plumbing.
//!
//! ## Mutation Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  lock(order) ─► lock(session) ─► load ─► apply core rule to a copy      │
//! │                                              │                          │
//! │                                              ▼                          │
//! │                              commit([order, session, return])           │
//! │                                │                                        │
//! │                 save #1 ok ─► save #2 fails                             │
//! │                                │                                        │
//! │                                ▼                                        │
//! │                 re-save #1 "before" snapshot, surface the error         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info};

use tally_core::{Order, Return, Session};
use tally_store::{EntityKind, MemoryStore, SqliteStore, Store, StoreConfig};

use crate::config::{EngineConfig, StorageBackend};
use crate::error::{EngineError, EngineResult};
use crate::locks::{EntityGuard, LockTable};

// =============================================================================
// Idempotency
// =============================================================================

#[derive(Debug, Clone)]
struct RecentOrder {
    order_id: String,
    created_at: DateTime<Utc>,
}

impl RecentOrder {
    fn within(&self, age: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.created_at < age
    }
}

/// Remembers recent creations so a retried create returns the first order.
///
/// Keys live for the idempotency TTL, fingerprints for the dedupe window;
/// older entries are dropped on the next `remember`. Process-local: a
/// restart forgets it, after which the store's order numbers still never
/// repeat.
#[derive(Debug)]
pub(crate) struct IdempotencyIndex {
    window: chrono::Duration,
    ttl: chrono::Duration,
    by_key: HashMap<String, RecentOrder>,
    by_fingerprint: HashMap<(Option<String>, String), RecentOrder>,
}

impl IdempotencyIndex {
    pub(crate) fn new(window: chrono::Duration, ttl: chrono::Duration) -> Self {
        IdempotencyIndex {
            window,
            ttl,
            by_key: HashMap::new(),
            by_fingerprint: HashMap::new(),
        }
    }

    pub(crate) fn by_key(&self, key: &str, now: DateTime<Utc>) -> Option<&str> {
        self.by_key
            .get(key)
            .filter(|r| r.within(self.ttl, now))
            .map(|r| r.order_id.as_str())
    }

    pub(crate) fn recent(
        &self,
        session_id: Option<&str>,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Option<&str> {
        self.by_fingerprint
            .get(&(session_id.map(str::to_string), fingerprint.to_string()))
            .filter(|r| r.within(self.window, now))
            .map(|r| r.order_id.as_str())
    }

    pub(crate) fn remember(
        &mut self,
        key: Option<String>,
        session_id: Option<String>,
        fingerprint: String,
        order_id: &str,
        now: DateTime<Utc>,
    ) {
        let (window, ttl) = (self.window, self.ttl);
        self.by_fingerprint.retain(|_, r| r.within(window, now));
        self.by_key.retain(|_, r| r.within(ttl, now));

        let entry = RecentOrder {
            order_id: order_id.to_string(),
            created_at: now,
        };
        if let Some(key) = key {
            self.by_key.insert(key, entry.clone());
        }
        self.by_fingerprint.insert((session_id, fingerprint), entry);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> (usize, usize) {
        (self.by_key.len(), self.by_fingerprint.len())
    }
}

// =============================================================================
// Staged writes
// =============================================================================

/// One entity to save, with what to restore if a later save fails.
#[derive(Debug)]
pub(crate) enum Write {
    Order { before: Order, after: Order },
    Session { before: Session, after: Session },
    Return { before: Option<Return>, after: Return },
}

impl Write {
    fn is_change(&self) -> bool {
        match self {
            Write::Order { before, after } => before != after,
            Write::Session { before, after } => before != after,
            Write::Return { before, after } => before.as_ref() != Some(after),
        }
    }

    fn describe(&self) -> (EntityKind, &str) {
        match self {
            Write::Order { after, .. } => (EntityKind::Order, &after.id),
            Write::Session { after, .. } => (EntityKind::Session, &after.id),
            Write::Return { after, .. } => (EntityKind::Return, &after.id),
        }
    }
}

// =============================================================================
// PosEngine
// =============================================================================

#[derive(Debug)]
pub struct PosEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) config: EngineConfig,
    pub(crate) locks: LockTable,
    pub(crate) idempotency: Mutex<IdempotencyIndex>,
}

impl PosEngine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        PosEngine {
            store,
            locks: LockTable::default(),
            idempotency: Mutex::new(IdempotencyIndex::new(
                config.dedupe_window(),
                config.idempotency_ttl(),
            )),
            config,
        }
    }

    /// Validates `config` and opens the store it names.
    pub async fn from_config(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
            StorageBackend::Sqlite => {
                let path = config.storage.sqlite_path.clone().ok_or_else(|| {
                    EngineError::Config("storage.sqlite_path is required".into())
                })?;
                Arc::new(SqliteStore::connect(StoreConfig::new(path)).await?)
            }
        };
        info!(
            terminal_id = %config.terminal.id,
            backend = ?config.storage.backend,
            "Engine ready"
        );
        Ok(PosEngine::new(store, config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    // =========================================================================
    // Reads (snapshots, no locks)
    // =========================================================================

    pub async fn order(&self, order_id: &str) -> EngineResult<Order> {
        self.store
            .load_order(order_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Order", order_id))
    }

    pub async fn session(&self, session_id: &str) -> EngineResult<Session> {
        self.store
            .load_session(session_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Session", session_id))
    }

    pub async fn return_record(&self, return_id: &str) -> EngineResult<Return> {
        self.store
            .load_return(return_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Return", return_id))
    }

    // =========================================================================
    // Locking
    // =========================================================================

    pub(crate) async fn lock_order(&self, order_id: &str) -> EntityGuard {
        self.locks.lock(EntityKind::Order, order_id).await
    }

    pub(crate) async fn lock_session(&self, session_id: &str) -> EntityGuard {
        self.locks.lock(EntityKind::Session, session_id).await
    }

    pub(crate) async fn lock_return(&self, return_id: &str) -> EntityGuard {
        self.locks.lock(EntityKind::Return, return_id).await
    }

    /// Serialises creates that could dedupe onto each other: the same key,
    /// or the same cart on the same session.
    pub(crate) async fn lock_create(&self, scope: &str) -> EntityGuard {
        self.locks.lock_scope("create", scope).await
    }

    /// Held only for lookups and bookkeeping, never across store I/O.
    pub(crate) fn idempotency(&self) -> MutexGuard<'_, IdempotencyIndex> {
        self.idempotency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks and loads the order's session, if it has one.
    pub(crate) async fn lock_session_of(
        &self,
        session_id: Option<&str>,
    ) -> EngineResult<Option<(EntityGuard, Session)>> {
        match session_id {
            Some(id) => {
                let guard = self.lock_session(id).await;
                let session = self.session(id).await?;
                Ok(Some((guard, session)))
            }
            None => Ok(None),
        }
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Saves `writes` in order. Unchanged entities are skipped; on failure,
    /// everything already saved is put back and the error is returned.
    pub(crate) async fn commit(&self, writes: Vec<Write>) -> EngineResult<()> {
        let writes: Vec<Write> = writes.into_iter().filter(Write::is_change).collect();

        for (i, write) in writes.iter().enumerate() {
            if let Err(e) = self.save(write).await {
                let (kind, id) = write.describe();
                error!(entity = %kind, id, error = %e, "Save failed, restoring earlier writes");
                for done in writes[..i].iter().rev() {
                    self.restore(done).await;
                }
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn save(&self, write: &Write) -> tally_store::StoreResult<()> {
        match write {
            Write::Order { after, .. } => self.store.save_order(after).await,
            Write::Session { after, .. } => self.store.save_session(after).await,
            Write::Return { after, .. } => self.store.save_return(after).await,
        }
    }

    async fn restore(&self, write: &Write) {
        let (kind, id) = write.describe();
        let result = match write {
            Write::Order { before, .. } => self.store.save_order(before).await,
            Write::Session { before, .. } => self.store.save_session(before).await,
            Write::Return {
                before: Some(before),
                ..
            } => self.store.save_return(before).await,
            // New returns are staged last, so this never undoes a save.
            Write::Return { before: None, .. } => Ok(()),
        };
        if let Err(e) = result {
            error!(entity = %kind, id, error = %e, "Failed to restore snapshot");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
