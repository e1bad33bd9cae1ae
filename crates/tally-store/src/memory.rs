//! # In-Memory Store
//!
//! Maps behind tokio `RwLock`s. Used by tests and the demo binary.
//!
//! Outages can be simulated: [`MemoryStore::set_available`] fails every call,
//! [`MemoryStore::fail_saves`] fails saves of one entity kind only, which is
//! how callers exercise their compensation paths.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;

use tally_core::{Order, Return, Session, ShiftReport};

use crate::error::{StoreError, StoreResult};
use crate::store::{EntityKind, Store};

#[derive(Debug, Default)]
pub struct MemoryStore {
    orders: RwLock<HashMap<String, Order>>,
    sessions: RwLock<HashMap<String, Session>>,
    returns: RwLock<HashMap<String, Return>>,
    reports: RwLock<HashMap<String, ShiftReport>>,
    sequences: RwLock<HashMap<String, i64>>,
    unavailable: AtomicBool,
    failing_saves: Mutex<HashSet<EntityKind>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Switches the whole store on or off.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// Makes saves of `kind` fail (or succeed again).
    pub fn fail_saves(&self, kind: EntityKind, failing: bool) {
        if let Ok(mut set) = self.failing_saves.lock() {
            if failing {
                set.insert(kind);
            } else {
                set.remove(&kind);
            }
        }
    }

    fn check(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn check_save(&self, kind: EntityKind) -> StoreResult<()> {
        self.check()?;
        let failing = self
            .failing_saves
            .lock()
            .map(|set| set.contains(&kind))
            .unwrap_or(false);
        if failing {
            return Err(StoreError::Unavailable(format!("{kind} saves are failing")));
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_order(&self, id: &str) -> StoreResult<Option<Order>> {
        self.check()?;
        Ok(self.orders.read().await.get(id).cloned())
    }

    async fn save_order(&self, order: &Order) -> StoreResult<()> {
        self.check_save(EntityKind::Order)?;
        debug!(order_id = %order.id, status = %order.status, "Saving order");
        self.orders
            .write()
            .await
            .insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn load_session(&self, id: &str) -> StoreResult<Option<Session>> {
        self.check()?;
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn save_session(&self, session: &Session) -> StoreResult<()> {
        self.check_save(EntityKind::Session)?;
        debug!(session_id = %session.id, status = %session.status, "Saving session");
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn load_return(&self, id: &str) -> StoreResult<Option<Return>> {
        self.check()?;
        Ok(self.returns.read().await.get(id).cloned())
    }

    async fn save_return(&self, ret: &Return) -> StoreResult<()> {
        self.check_save(EntityKind::Return)?;
        debug!(return_id = %ret.id, status = %ret.status, "Saving return");
        self.returns.write().await.insert(ret.id.clone(), ret.clone());
        Ok(())
    }

    async fn load_report(&self, session_id: &str) -> StoreResult<Option<ShiftReport>> {
        self.check()?;
        Ok(self.reports.read().await.get(session_id).cloned())
    }

    async fn save_report(&self, report: &ShiftReport) -> StoreResult<()> {
        self.check_save(EntityKind::Report)?;
        debug!(session_id = %report.session_id, number = %report.report_number, "Saving report");
        self.reports
            .write()
            .await
            .insert(report.session_id.clone(), report.clone());
        Ok(())
    }

    async fn next_sequence(&self, scope: &str) -> StoreResult<i64> {
        self.check()?;
        let mut sequences = self.sequences.write().await;
        let value = sequences.entry(scope.to_string()).or_insert(0);
        *value += 1;
        Ok(*value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tally_core::Money;

    #[tokio::test]
    async fn test_sequences_are_per_scope() {
        let store = MemoryStore::new();
        assert_eq!(store.next_sequence("order:POS-01").await.unwrap(), 1);
        assert_eq!(store.next_sequence("order:POS-01").await.unwrap(), 2);
        assert_eq!(store.next_sequence("order:POS-02").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_round_trip_and_outage() {
        let store = MemoryStore::new();
        let session = Session::open("POS-01", "ana", Money::from_cents(100), Utc::now()).unwrap();
        store.save_session(&session).await.unwrap();
        assert_eq!(store.load_session(&session.id).await.unwrap(), Some(session.clone()));

        store.set_available(false);
        let err = store.load_session(&session.id).await.unwrap_err();
        assert!(err.is_retryable());

        store.set_available(true);
        store.fail_saves(EntityKind::Session, true);
        assert!(store.save_session(&session).await.is_err());
        assert!(store.load_session(&session.id).await.unwrap().is_some());
        store.fail_saves(EntityKind::Session, false);
        assert!(store.save_session(&session).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_entities_load_as_none() {
        let store = MemoryStore::new();
        assert!(store.load_order("nope").await.unwrap().is_none());
        assert!(store.load_report("nope").await.unwrap().is_none());
        assert!(store
            .load_orders(&["a".to_string(), "b".to_string()])
            .await
            .unwrap()
            .is_empty());
    }
}
