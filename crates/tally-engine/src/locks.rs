//! Per-entity async locks.
//!
//! One mutex per entity id, created on first use and dropped once nobody
//! holds or waits for it. Writers of the same order (or session) queue up;
//! writers of different entities never contend.
//!
//! Lock order is fixed: return, then order, then session. Scope locks
//! (`lock_scope`) guard work that has no entity id yet, such as an order
//! being created, and are taken before any entity lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use tally_store::EntityKind;

pub(crate) type EntityGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub(crate) struct LockTable {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl LockTable {
    pub(crate) async fn lock(&self, kind: EntityKind, id: &str) -> EntityGuard {
        self.acquire(format!("{kind}:{id}")).await
    }

    /// Locks a named scope. Scope prefixes must not collide with entity
    /// kind names.
    pub(crate) async fn lock_scope(&self, prefix: &str, scope: &str) -> EntityGuard {
        self.acquire(format!("{prefix}#{scope}")).await
    }

    async fn acquire(&self, name: String) -> EntityGuard {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks.entry(name).or_default().clone()
        };
        mutex.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
