//! Return operations.
//!
//! A return is staged last in every commit: if the order or drawer save
//! fails, the return is never written.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use tally_core::{
    prepare_return, returnable_quantity, CashMovementKind, NewCashMovement, Order, OrderStatus,
    Quantity, Return, ReturnRequest, ReturnStatus, Session, SessionStatus,
};

use crate::engine::{PosEngine, Write};
use crate::error::EngineResult;

/// Moves the money of a completed return: marks the order refunded and,
/// for a drawer, takes cash out and records the refund on the shift.
fn settle_return(
    order: &mut Order,
    session: Option<&mut Session>,
    ret: &Return,
    now: DateTime<Utc>,
) -> EngineResult<()> {
    if order.status == OrderStatus::Completed {
        order.mark_refunded(now)?;
    }
    let Some(session) = session else {
        return Ok(());
    };

    if let Some(cash) = ret.cash_refund() {
        session.record_movement(
            NewCashMovement::new(CashMovementKind::Refund, cash, ret.actor.clone())
                .reason(ret.reason.clone())
                .for_order(&order.id),
            now,
        )?;
    }
    if session.status == SessionStatus::Closed {
        warn!(
            return_id = %ret.id,
            session_id = %session.id,
            "Card refund against a closed session; not attached"
        );
    } else {
        session.attach_return(&ret.id);
    }
    Ok(())
}

fn staged(
    order_before: Order,
    order: Order,
    session: Option<(Session, Session)>,
    return_before: Option<Return>,
    ret: Return,
) -> Vec<Write> {
    let mut writes = vec![Write::Order {
        before: order_before,
        after: order,
    }];
    if let Some((before, after)) = session {
        writes.push(Write::Session { before, after });
    }
    writes.push(Write::Return {
        before: return_before,
        after: ret,
    });
    writes
}

impl PosEngine {
    /// Units of an order line that can still be returned.
    pub async fn returnable_quantity(
        &self,
        order_id: &str,
        line_id: &str,
    ) -> EngineResult<Quantity> {
        let order = self.order(order_id).await?;
        let returns = self.store.load_returns(&order.return_ids).await?;
        Ok(returnable_quantity(&order, &returns, line_id)?)
    }

    /// Raises a return against a completed (or already partly refunded)
    /// order.
    ///
    /// Refunds above the configured approval threshold come back `Pending`:
    /// their quantities are reserved but no money moves until
    /// [`PosEngine::approve_return`].
    pub async fn process_return(
        &self,
        order_id: &str,
        request: ReturnRequest,
    ) -> EngineResult<Return> {
        let now = self.now();
        let _order_guard = self.lock_order(order_id).await;
        let order_before = self.order(order_id).await?;
        let prior = self.store.load_returns(&order_before.return_ids).await?;

        let ret = prepare_return(
            &order_before,
            &prior,
            request,
            self.config.approval_threshold(),
            now,
        )?;

        let session = match ret.status {
            ReturnStatus::Completed => self.lock_session_of(ret.session_id.as_deref()).await?,
            _ => None,
        };

        let mut order = order_before.clone();
        order.attach_return(&ret.id);
        let mut session_after = session.as_ref().map(|(_, s)| s.clone());
        if ret.status == ReturnStatus::Completed {
            settle_return(&mut order, session_after.as_mut(), &ret, now)?;
        }

        let session_pair = session
            .as_ref()
            .map(|(_, before)| before.clone())
            .zip(session_after);
        self.commit(staged(order_before, order, session_pair, None, ret.clone()))
            .await?;

        info!(
            return_id = %ret.id,
            order_id,
            status = %ret.status,
            refund = %ret.total_refund,
            method = %ret.refund_method,
            "Return processed"
        );
        Ok(ret)
    }

    /// Approves a pending return and moves its money.
    pub async fn approve_return(&self, return_id: &str, actor: &str) -> EngineResult<Return> {
        let now = self.now();
        let _return_guard = self.lock_return(return_id).await;
        let return_before = self.return_record(return_id).await?;
        let _order_guard = self.lock_order(&return_before.order_id).await;
        let order_before = self.order(&return_before.order_id).await?;

        let mut ret = return_before.clone();
        ret.approve(actor, now)?;

        let session = self.lock_session_of(ret.session_id.as_deref()).await?;
        let mut order = order_before.clone();
        let mut session_after = session.as_ref().map(|(_, s)| s.clone());
        settle_return(&mut order, session_after.as_mut(), &ret, now)?;

        let session_pair = session
            .as_ref()
            .map(|(_, before)| before.clone())
            .zip(session_after);
        self.commit(staged(
            order_before,
            order,
            session_pair,
            Some(return_before),
            ret.clone(),
        ))
        .await?;

        info!(return_id, actor, refund = %ret.total_refund, "Return approved");
        Ok(ret)
    }

    /// Rejects a pending return, releasing its quantities.
    pub async fn reject_return(
        &self,
        return_id: &str,
        actor: &str,
        reason: Option<&str>,
    ) -> EngineResult<Return> {
        let _guard = self.lock_return(return_id).await;
        let before = self.return_record(return_id).await?;
        let mut ret = before.clone();
        ret.reject(actor, reason, self.now())?;

        self.commit(vec![Write::Return {
            before: Some(before),
            after: ret.clone(),
        }])
        .await?;

        info!(return_id, actor, reason = ?ret.rejection_reason, "Return rejected");
        Ok(ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::tests::{engine, engine_with, exempt_cart};
    use crate::orders::CreateOrder;
    use tally_core::{ErrorCode, ItemCondition, Money, ReturnItem, TenderMethod};
    use tally_store::EntityKind;

    async fn paid_order(engine: &PosEngine, session_id: &str) -> Order {
        let order = engine
            .create_order(CreateOrder::new(exempt_cart(5, 10_000)).in_session(session_id))
            .await
            .unwrap();
        engine
            .add_payment(&order.id, TenderMethod::Cash, Money::from_cents(50_000), None)
            .await
            .unwrap();
        engine.order(&order.id).await.unwrap()
    }

    fn request(line_id: &str, units: i64, method: TenderMethod) -> ReturnRequest {
        ReturnRequest {
            items: vec![ReturnItem {
                line_id: line_id.to_string(),
                quantity: Quantity::from_units(units),
                condition: ItemCondition::Resellable,
            }],
            reason: "changed mind".to_string(),
            refund_method: method,
            actor: "ana".to_string(),
            session_id: None,
        }
    }

    #[tokio::test]
    async fn test_partial_cash_return() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::from_cents(10_000)).await.unwrap();
        let order = paid_order(&engine, &session.id).await;
        let line_id = order.lines[0].id.clone();

        let ret = engine
            .process_return(&order.id, request(&line_id, 2, TenderMethod::Cash))
            .await
            .unwrap();
        assert_eq!(ret.status, ReturnStatus::Completed);
        assert_eq!(ret.total_refund, Money::from_cents(20_000));

        assert_eq!(
            engine.returnable_quantity(&order.id, &line_id).await.unwrap(),
            Quantity::from_units(3)
        );

        let order = engine.order(&order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
        assert_eq!(order.return_ids, vec![ret.id.clone()]);

        let session = engine.session(&session.id).await.unwrap();
        assert_eq!(session.expected_cash, Money::from_cents(40_000));
        assert_eq!(session.return_ids, vec![ret.id]);
    }

    #[tokio::test]
    async fn test_cannot_overdraw_across_returns() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::from_cents(100_000)).await.unwrap();
        let order = paid_order(&engine, &session.id).await;
        let line_id = order.lines[0].id.clone();

        engine
            .process_return(&order.id, request(&line_id, 4, TenderMethod::Card))
            .await
            .unwrap();
        let err = engine
            .process_return(&order.id, request(&line_id, 2, TenderMethod::Card))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReturnQuantityExceeded);

        engine
            .process_return(&order.id, request(&line_id, 1, TenderMethod::Card))
            .await
            .unwrap();
        let order = engine.order(&order.id).await.unwrap();
        let returns = engine.store.load_returns(&order.return_ids).await.unwrap();
        assert!(order.is_fully_returned(&returns));
    }

    #[tokio::test]
    async fn test_return_on_unpaid_order_is_refused() {
        let (_, engine) = engine();
        let order = engine
            .create_order(CreateOrder::new(exempt_cart(1, 100)))
            .await
            .unwrap();
        let line_id = order.lines[0].id.clone();
        let err = engine
            .process_return(&order.id, request(&line_id, 1, TenderMethod::Card))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_approval_flow() {
        let mut config = EngineConfig::default();
        config.returns.approval_threshold_cents = Some(15_000);
        let (_, engine) = engine_with(config);
        let session = engine.open_session("ana", Money::from_cents(10_000)).await.unwrap();
        let order = paid_order(&engine, &session.id).await;
        let line_id = order.lines[0].id.clone();

        let pending = engine
            .process_return(&order.id, request(&line_id, 2, TenderMethod::Cash))
            .await
            .unwrap();
        assert_eq!(pending.status, ReturnStatus::Pending);
        // Reserved, but no money moved yet.
        assert_eq!(
            engine.returnable_quantity(&order.id, &line_id).await.unwrap(),
            Quantity::from_units(3)
        );
        assert_eq!(engine.order(&order.id).await.unwrap().status, OrderStatus::Completed);
        assert_eq!(
            engine.session(&session.id).await.unwrap().expected_cash,
            Money::from_cents(60_000)
        );

        let approved = engine.approve_return(&pending.id, "supervisor").await.unwrap();
        assert_eq!(approved.status, ReturnStatus::Completed);
        assert_eq!(approved.decided_by.as_deref(), Some("supervisor"));
        assert_eq!(engine.order(&order.id).await.unwrap().status, OrderStatus::Refunded);
        assert_eq!(
            engine.session(&session.id).await.unwrap().expected_cash,
            Money::from_cents(40_000)
        );

        let err = engine.approve_return(&pending.id, "supervisor").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_rejection_releases_quantity() {
        let mut config = EngineConfig::default();
        config.returns.approval_threshold_cents = Some(0);
        let (_, engine) = engine_with(config);
        let session = engine.open_session("ana", Money::zero()).await.unwrap();
        let order = paid_order(&engine, &session.id).await;
        let line_id = order.lines[0].id.clone();

        let pending = engine
            .process_return(&order.id, request(&line_id, 5, TenderMethod::Card))
            .await
            .unwrap();
        assert_eq!(
            engine.returnable_quantity(&order.id, &line_id).await.unwrap(),
            Quantity::zero()
        );

        let rejected = engine
            .reject_return(&pending.id, "supervisor", Some("no receipt"))
            .await
            .unwrap();
        assert_eq!(rejected.status, ReturnStatus::Rejected);
        assert_eq!(
            engine.returnable_quantity(&order.id, &line_id).await.unwrap(),
            Quantity::from_units(5)
        );
    }

    #[tokio::test]
    async fn test_return_not_written_when_session_save_fails() {
        let (store, engine) = engine();
        let session = engine.open_session("ana", Money::from_cents(100_000)).await.unwrap();
        let order = paid_order(&engine, &session.id).await;
        let line_id = order.lines[0].id.clone();

        store.fail_saves(EntityKind::Session, true);
        let err = engine
            .process_return(&order.id, request(&line_id, 1, TenderMethod::Cash))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        store.fail_saves(EntityKind::Session, false);

        let order = engine.order(&order.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.return_ids.is_empty());
        assert_eq!(
            engine.returnable_quantity(&order.id, &line_id).await.unwrap(),
            Quantity::from_units(5)
        );
    }
}
