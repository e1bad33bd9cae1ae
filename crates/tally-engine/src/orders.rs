//! Order operations: create (idempotent), hold, resume, submit, void,
//! complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tally_core::{Cart, CoreError, Order, OrderStatus, Session, SessionStatus};

use crate::engine::{PosEngine, Write};
use crate::error::EngineResult;

/// A request to turn a cart into an order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub cart: Cart,
    /// Drawer the order is rung up on.
    pub session_id: Option<String>,
    /// Client key for safe retries. With a key, only the key deduplicates;
    /// without one, an identical cart on the same session inside the
    /// dedupe window does.
    pub idempotency_key: Option<String>,
}

impl CreateOrder {
    pub fn new(cart: Cart) -> Self {
        CreateOrder {
            cart,
            ..Default::default()
        }
    }

    pub fn in_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Attaches a settled (completed or voided) order to its drawer. A closed
/// drawer is read-only and keeps its sealed totals.
pub(crate) fn attach_settled(session: &mut Session, order: &Order) {
    if session.status == SessionStatus::Closed {
        warn!(
            order_id = %order.id,
            session_id = %session.id,
            "Order settled after its session closed; not attached"
        );
        return;
    }
    if session.attach_order(&order.id) {
        debug!(order_id = %order.id, session_id = %session.id, "Order attached to session");
    }
}

impl PosEngine {
    /// Prices the cart and creates an order awaiting payment.
    ///
    /// A retried call returns the order the first call created. With a key,
    /// the key decides while it is within its TTL. Without one, an identical
    /// cart on the same session inside the dedupe window returns the earlier
    /// order only while that order is still awaiting payment.
    pub async fn create_order(&self, request: CreateOrder) -> EngineResult<Order> {
        let priced = request.cart.price(self.config.tax_rate())?;
        let fingerprint = request.cart.fingerprint();
        let scope = match request.idempotency_key.as_deref() {
            Some(key) => format!("key:{key}"),
            None => format!(
                "cart:{}:{fingerprint}",
                request.session_id.as_deref().unwrap_or_default()
            ),
        };
        let _create_guard = self.lock_create(&scope).await;

        let now = self.now();
        if let Some(order) = self.existing_order(&request, &fingerprint, now).await? {
            info!(order_id = %order.id, "Duplicate create, returning existing order");
            return Ok(order);
        }

        if let Some(session_id) = request.session_id.as_deref() {
            let session = self.session(session_id).await?;
            if session.status == SessionStatus::Closed {
                return Err(CoreError::transition(
                    "Session",
                    session.id,
                    session.status,
                    "create order",
                )
                .into());
            }
        }

        let terminal_id = self.config.terminal_id();
        let sequence = self
            .store
            .next_sequence(&format!("order:{terminal_id}"))
            .await?;
        let order_number = format!("{terminal_id}-{sequence:06}");
        let customer_id = request
            .cart
            .customer_id()
            .map(str::to_string)
            .unwrap_or_else(|| self.config.orders.walk_in_customer_id.clone());

        let order = Order::create(
            order_number,
            terminal_id,
            request.session_id.clone(),
            Some(customer_id),
            priced,
            now,
        )?;
        self.store.save_order(&order).await?;

        self.idempotency().remember(
            request.idempotency_key,
            request.session_id,
            fingerprint,
            &order.id,
            now,
        );

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.totals.total,
            "Order created"
        );
        Ok(order)
    }

    /// The order an earlier identical create produced, if this call is a
    /// retry of it.
    async fn existing_order(
        &self,
        request: &CreateOrder,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<Order>> {
        let (order_id, by_key) = {
            let index = self.idempotency();
            let found = match request.idempotency_key.as_deref() {
                Some(key) => index.by_key(key, now),
                None => index.recent(request.session_id.as_deref(), fingerprint, now),
            };
            match found {
                Some(id) => (id.to_string(), request.idempotency_key.is_some()),
                None => return Ok(None),
            }
        };

        let order = self.order(&order_id).await?;
        if by_key || order.status == OrderStatus::PendingPayment {
            return Ok(Some(order));
        }
        debug!(
            order_id = %order.id,
            status = %order.status,
            "Matching cart already moved on, creating a new order"
        );
        Ok(None)
    }

    pub async fn hold_order(&self, order_id: &str, reason: Option<&str>) -> EngineResult<Order> {
        let _guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let mut order = before.clone();
        order.hold(reason, self.now())?;

        self.commit(vec![Write::Order {
            before,
            after: order.clone(),
        }])
        .await?;
        info!(order_id, "Order held");
        Ok(order)
    }

    /// Returns a held order to draft and hands back its cart for editing.
    pub async fn resume_order(&self, order_id: &str) -> EngineResult<(Order, Cart)> {
        let _guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let mut order = before.clone();
        let cart = order.resume(self.now())?;

        self.commit(vec![Write::Order {
            before,
            after: order.clone(),
        }])
        .await?;
        info!(order_id, "Order resumed");
        Ok((order, cart))
    }

    /// Reprices an edited cart onto a draft order, keeping its number.
    pub async fn submit_order(&self, order_id: &str, cart: Cart) -> EngineResult<Order> {
        let priced = cart.price(self.config.tax_rate())?;

        let _guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let mut order = before.clone();
        order.submit(priced, self.now())?;
        if let Some(customer_id) = cart.customer_id() {
            order.customer_id = customer_id.to_string();
        }

        self.commit(vec![Write::Order {
            before,
            after: order.clone(),
        }])
        .await?;
        info!(order_id, total = %order.totals.total, "Order resubmitted");
        Ok(order)
    }

    pub async fn void_order(&self, order_id: &str, reason: Option<&str>) -> EngineResult<Order> {
        let _order_guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let session = self.lock_session_of(before.session_id.as_deref()).await?;

        let mut order = before.clone();
        order.void(reason, self.now())?;

        let mut writes = vec![Write::Order {
            before,
            after: order.clone(),
        }];
        if let Some((_, session_before)) = &session {
            let mut updated = session_before.clone();
            attach_settled(&mut updated, &order);
            writes.push(Write::Session {
                before: session_before.clone(),
                after: updated,
            });
        }
        self.commit(writes).await?;

        info!(order_id, reason = ?order.void_reason, "Order voided");
        Ok(order)
    }

    /// Completes an order with nothing left to pay. Payments normally do
    /// this on their own; this is the explicit path for a caller that
    /// settled the amount due some other way.
    pub async fn complete_order(&self, order_id: &str) -> EngineResult<Order> {
        let _order_guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let session = self.lock_session_of(before.session_id.as_deref()).await?;

        let mut order = before.clone();
        order.complete(self.now())?;

        let mut writes = vec![Write::Order {
            before,
            after: order.clone(),
        }];
        if let Some((_, session_before)) = &session {
            let mut updated = session_before.clone();
            attach_settled(&mut updated, &order);
            writes.push(Write::Session {
                before: session_before.clone(),
                after: updated,
            });
        }
        self.commit(writes).await?;

        info!(order_id, "Order completed");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::tests::{cart, engine, engine_with, exempt_cart};
    use std::sync::Arc;
    use std::time::Duration;
    use tally_core::{Money, OrderStatus, Quantity, TenderMethod};
    use tally_store::{EntityKind, Store};

    #[tokio::test]
    async fn test_create_numbers_orders_per_terminal() {
        let (_, engine) = engine();
        let first = engine
            .create_order(CreateOrder::new(cart(2, 10_000)).idempotency_key("a"))
            .await
            .unwrap();
        let second = engine
            .create_order(CreateOrder::new(cart(2, 10_000)).idempotency_key("b"))
            .await
            .unwrap();

        assert_eq!(first.order_number, "POS-01-000001");
        assert_eq!(second.order_number, "POS-01-000002");
        assert_eq!(first.status, OrderStatus::PendingPayment);
        assert_eq!(first.totals.total, Money::from_cents(23_000));
        assert_eq!(first.customer_id, "walk-in");
    }

    #[tokio::test]
    async fn test_retry_with_same_key_returns_same_order() {
        let (_, engine) = engine();
        let request = CreateOrder::new(cart(1, 500)).idempotency_key("retry-1");
        let first = engine.create_order(request.clone()).await.unwrap();
        let again = engine.create_order(request).await.unwrap();
        assert_eq!(first.id, again.id);
    }

    #[tokio::test]
    async fn test_identical_cart_dedupes_inside_window() {
        let (_, engine) = engine();
        let first = engine.create_order(CreateOrder::new(cart(1, 500))).await.unwrap();
        let again = engine.create_order(CreateOrder::new(cart(1, 500))).await.unwrap();
        let other = engine.create_order(CreateOrder::new(cart(2, 500))).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn test_dedupe_window_zero_disables_fingerprint_dedupe() {
        let mut config = EngineConfig::default();
        config.orders.dedupe_window_secs = 0;
        let (_, engine) = engine_with(config);

        let first = engine.create_order(CreateOrder::new(cart(1, 500))).await.unwrap();
        let second = engine.create_order(CreateOrder::new(cart(1, 500))).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_ne!(first.order_number, second.order_number);
    }

    #[tokio::test]
    async fn test_paid_cart_is_not_deduped() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::zero()).await.unwrap();
        let request = CreateOrder::new(exempt_cart(1, 500)).in_session(&session.id);

        let first = engine.create_order(request.clone()).await.unwrap();
        engine
            .add_payment(&first.id, TenderMethod::Cash, first.amount_due, None)
            .await
            .unwrap();
        assert_eq!(
            engine.order(&first.id).await.unwrap().status,
            OrderStatus::Completed
        );

        let next = engine.create_order(request).await.unwrap();
        assert_ne!(next.id, first.id);
        assert_eq!(next.status, OrderStatus::PendingPayment);
    }

    #[tokio::test]
    async fn test_voided_cart_is_not_deduped() {
        let (_, engine) = engine();
        let first = engine.create_order(CreateOrder::new(cart(1, 500))).await.unwrap();
        engine.void_order(&first.id, None).await.unwrap();

        let next = engine.create_order(CreateOrder::new(cart(1, 500))).await.unwrap();
        assert_ne!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_key_retry_after_payment_returns_paid_order() {
        let (_, engine) = engine();
        let request = CreateOrder::new(exempt_cart(1, 500)).idempotency_key("k-paid");
        let first = engine.create_order(request.clone()).await.unwrap();
        engine
            .add_payment(&first.id, TenderMethod::Cash, first.amount_due, None)
            .await
            .unwrap();

        let again = engine.create_order(request).await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.status, OrderStatus::Completed);
    }

    #[tokio::test]
    async fn test_expired_key_creates_new_order() {
        let mut config = EngineConfig::default();
        config.orders.idempotency_ttl_secs = 0;
        let (_, engine) = engine_with(config);

        let request = CreateOrder::new(cart(1, 500)).idempotency_key("k-old");
        let first = engine.create_order(request.clone()).await.unwrap();
        let second = engine.create_order(request).await.unwrap();
        assert_ne!(first.id, second.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_retries_create_one_order() {
        let (_, engine) = engine();
        let engine = Arc::new(engine);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let engine = Arc::clone(&engine);
                tokio::spawn(async move {
                    let request = CreateOrder::new(cart(1, 500)).idempotency_key("k-race");
                    engine.create_order(request).await
                })
            })
            .collect();
        let mut ids = Vec::new();
        for task in tasks {
            ids.push(task.await.unwrap().unwrap().id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_unrelated_create_does_not_wait_on_another() {
        let (_, engine) = engine();
        let _busy = engine.lock_create("key:k-slow").await;

        let order = tokio::time::timeout(
            Duration::from_secs(1),
            engine.create_order(CreateOrder::new(cart(1, 500)).idempotency_key("k-fast")),
        )
        .await
        .expect("create blocked behind an unrelated key")
        .unwrap();
        assert_eq!(order.order_number, "POS-01-000001");
    }

    #[tokio::test]
    async fn test_failed_create_does_not_burn_idempotency_key() {
        let (store, engine) = engine();
        store.fail_saves(EntityKind::Order, true);
        let request = CreateOrder::new(cart(1, 500)).idempotency_key("k");
        let err = engine.create_order(request.clone()).await.unwrap_err();
        assert!(err.is_retryable());

        store.fail_saves(EntityKind::Order, false);
        let order = engine.create_order(request).await.unwrap();
        assert!(store.load_order(&order.id).await.unwrap().is_some());
        // The failed attempt consumed a number; numbers are never reused.
        assert_eq!(order.order_number, "POS-01-000002");
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected() {
        let (_, engine) = engine();
        let err = engine
            .create_order(CreateOrder::new(Cart::new()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tally_core::ErrorCode::EmptyCart);
    }

    #[tokio::test]
    async fn test_create_in_closed_session_is_refused() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::zero()).await.unwrap();
        engine
            .close_session(&session.id, Money::zero(), None, "ana")
            .await
            .unwrap();

        let err = engine
            .create_order(CreateOrder::new(cart(1, 100)).in_session(&session.id))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tally_core::ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_hold_resume_submit_keeps_number() {
        let (_, engine) = engine();
        let order = engine.create_order(CreateOrder::new(cart(1, 1_000))).await.unwrap();

        let held = engine.hold_order(&order.id, Some("customer stepped away")).await.unwrap();
        assert_eq!(held.status, OrderStatus::Held);
        assert_eq!(held.totals, order.totals);

        let (draft, mut edit) = engine.resume_order(&order.id).await.unwrap();
        assert_eq!(draft.status, OrderStatus::Draft);
        let line_id = edit.lines()[0].id.clone();
        edit.update_quantity(&line_id, Quantity::from_units(3)).unwrap();

        let resubmitted = engine.submit_order(&order.id, edit).await.unwrap();
        assert_eq!(resubmitted.status, OrderStatus::PendingPayment);
        assert_eq!(resubmitted.order_number, order.order_number);
        assert_eq!(resubmitted.totals.total, Money::from_cents(3_450));
    }

    #[tokio::test]
    async fn test_void_attaches_to_session_once() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::from_cents(10_000)).await.unwrap();
        let order = engine
            .create_order(CreateOrder::new(exempt_cart(1, 500)).in_session(&session.id))
            .await
            .unwrap();

        let voided = engine.void_order(&order.id, Some("wrong item")).await.unwrap();
        assert_eq!(voided.status, OrderStatus::Voided);
        assert!(engine.void_order(&order.id, Some("again")).await.is_err());

        let session = engine.session(&session.id).await.unwrap();
        assert_eq!(session.order_ids, vec![order.id]);
    }

    #[tokio::test]
    async fn test_void_rolls_back_when_session_save_fails() {
        let (store, engine) = engine();
        let session = engine.open_session("ana", Money::zero()).await.unwrap();
        let order = engine
            .create_order(CreateOrder::new(exempt_cart(1, 500)).in_session(&session.id))
            .await
            .unwrap();

        store.fail_saves(EntityKind::Session, true);
        let err = engine.void_order(&order.id, Some("oops")).await.unwrap_err();
        assert!(err.is_retryable());
        store.fail_saves(EntityKind::Session, false);

        let reloaded = engine.order(&order.id).await.unwrap();
        assert_eq!(reloaded.status, OrderStatus::PendingPayment);
        assert!(engine.session(&session.id).await.unwrap().order_ids.is_empty());
    }

    #[tokio::test]
    async fn test_complete_with_amount_due_fails() {
        let (_, engine) = engine();
        let order = engine.create_order(CreateOrder::new(cart(1, 100))).await.unwrap();
        let err = engine.complete_order(&order.id).await.unwrap_err();
        assert_eq!(err.code(), tally_core::ErrorCode::AmountOutstanding);
    }
}
