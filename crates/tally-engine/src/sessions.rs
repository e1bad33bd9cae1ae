//! Cash drawer sessions: open, record movements, suspend, resume, close.

use tracing::{info, warn};

use tally_core::{CashMovement, Money, NewCashMovement, Session};

use crate::engine::{PosEngine, Write};
use crate::error::EngineResult;

impl PosEngine {
    /// Opens a drawer on this terminal with its float.
    ///
    /// One open drawer per terminal is the caller's rule to keep; the
    /// engine does not track terminals.
    pub async fn open_session(
        &self,
        cashier_id: &str,
        opening_cash: Money,
    ) -> EngineResult<Session> {
        let terminal_id = self.config.terminal_id();
        let session = Session::open(terminal_id, cashier_id, opening_cash, self.now())?;
        self.store.save_session(&session).await?;

        info!(
            session_id = %session.id,
            terminal_id = %session.terminal_id,
            cashier_id,
            opening_cash = %opening_cash,
            "Session opened"
        );
        Ok(session)
    }

    /// Records a payout, drop, adjustment or manual sale/refund.
    pub async fn record_cash_movement(
        &self,
        session_id: &str,
        movement: NewCashMovement,
    ) -> EngineResult<CashMovement> {
        let _guard = self.lock_session(session_id).await;
        let before = self.session(session_id).await?;

        let mut session = before.clone();
        let recorded = session.record_movement(movement, self.now())?.clone();

        self.commit(vec![Write::Session {
            before,
            after: session.clone(),
        }])
        .await?;

        info!(
            session_id,
            kind = %recorded.kind,
            amount = %recorded.amount,
            expected_cash = %session.expected_cash,
            "Cash movement recorded"
        );
        Ok(recorded)
    }

    pub async fn suspend_session(&self, session_id: &str) -> EngineResult<Session> {
        let _guard = self.lock_session(session_id).await;
        let before = self.session(session_id).await?;
        let mut session = before.clone();
        session.suspend(self.now())?;

        self.commit(vec![Write::Session {
            before,
            after: session.clone(),
        }])
        .await?;
        info!(session_id, "Session suspended");
        Ok(session)
    }

    pub async fn resume_session(&self, session_id: &str) -> EngineResult<Session> {
        let _guard = self.lock_session(session_id).await;
        let before = self.session(session_id).await?;
        let mut session = before.clone();
        session.resume(self.now())?;

        self.commit(vec![Write::Session {
            before,
            after: session.clone(),
        }])
        .await?;
        info!(session_id, "Session resumed");
        Ok(session)
    }

    /// Counts the drawer and seals the session.
    ///
    /// A non-zero variance is reported, never corrected.
    pub async fn close_session(
        &self,
        session_id: &str,
        counted_cash: Money,
        notes: Option<&str>,
        actor: &str,
    ) -> EngineResult<Session> {
        let _guard = self.lock_session(session_id).await;
        let before = self.session(session_id).await?;
        let orders = self.store.load_orders(&before.order_ids).await?;
        let returns = self.store.load_returns(&before.return_ids).await?;
        let refunds: Vec<_> = returns.iter().filter_map(|r| r.settled_refund()).collect();

        let mut session = before.clone();
        session.close(counted_cash, notes, actor, &orders, &refunds, self.now())?;

        self.commit(vec![Write::Session {
            before,
            after: session.clone(),
        }])
        .await?;

        let variance = session.variance.unwrap_or_default();
        if variance.is_zero() {
            info!(session_id, counted = %counted_cash, "Session closed, drawer balanced");
        } else {
            warn!(
                session_id,
                expected = %session.expected_cash,
                counted = %counted_cash,
                variance = %variance,
                "Session closed with cash variance"
            );
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{engine, exempt_cart};
    use crate::orders::CreateOrder;
    use std::sync::Arc;
    use tally_core::{CashMovementKind, ErrorCode, SessionStatus, TenderMethod};

    #[tokio::test]
    async fn test_drawer_shift_with_payout_and_variance() {
        let (_, engine) = engine();
        let session = engine
            .open_session("ana", Money::from_cents(500_000))
            .await
            .unwrap();
        let order = engine
            .create_order(CreateOrder::new(exempt_cart(1, 100_000)).in_session(&session.id))
            .await
            .unwrap();
        engine
            .add_payment(&order.id, TenderMethod::Cash, Money::from_cents(100_000), None)
            .await
            .unwrap();
        engine
            .record_cash_movement(
                &session.id,
                NewCashMovement::new(CashMovementKind::Payout, Money::from_cents(20_000), "ana")
                    .reason("ice delivery"),
            )
            .await
            .unwrap();

        let current = engine.session(&session.id).await.unwrap();
        assert_eq!(current.expected_cash, Money::from_cents(580_000));

        let closed = engine
            .close_session(&session.id, Money::from_cents(575_000), Some("short"), "ana")
            .await
            .unwrap();
        assert_eq!(closed.status, SessionStatus::Closed);
        assert_eq!(closed.variance, Some(Money::from_cents(-5_000)));

        let summary = closed.summary.unwrap();
        assert_eq!(summary.completed_count, 1);
        assert_eq!(summary.gross_sales, Money::from_cents(100_000));
    }

    #[tokio::test]
    async fn test_drop_requires_reason() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::from_cents(1_000)).await.unwrap();
        let err = engine
            .record_cash_movement(
                &session.id,
                NewCashMovement::new(CashMovementKind::Drop, Money::from_cents(500), "ana"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ReasonRequired);

        let unchanged = engine.session(&session.id).await.unwrap();
        assert_eq!(unchanged.movements.len(), 1);
    }

    #[tokio::test]
    async fn test_suspend_resume_and_double_close() {
        let (_, engine) = engine();
        let session = engine.open_session("ana", Money::zero()).await.unwrap();

        let suspended = engine.suspend_session(&session.id).await.unwrap();
        assert_eq!(suspended.status, SessionStatus::Suspended);
        assert!(engine
            .record_cash_movement(
                &session.id,
                NewCashMovement::new(CashMovementKind::Adjustment, Money::from_cents(5), "ana"),
            )
            .await
            .is_err());

        let resumed = engine.resume_session(&session.id).await.unwrap();
        assert_eq!(resumed.status, SessionStatus::Open);

        engine
            .close_session(&session.id, Money::zero(), None, "ana")
            .await
            .unwrap();
        let err = engine
            .close_session(&session.id, Money::zero(), None, "ana")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidTransition);
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let (_, engine) = engine();
        let err = engine.suspend_session("missing").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_movements_keep_expected_cash_exact() {
        let (_, engine) = engine();
        let engine = Arc::new(engine);
        let session = engine.open_session("ana", Money::from_cents(1_000)).await.unwrap();

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let engine = Arc::clone(&engine);
                let session_id = session.id.clone();
                tokio::spawn(async move {
                    let movement = if i % 2 == 0 {
                        let amount = Money::from_cents(100);
                        NewCashMovement::new(CashMovementKind::Adjustment, amount, "ana")
                    } else {
                        NewCashMovement::new(CashMovementKind::Drop, Money::from_cents(25), "ana")
                            .reason("safe")
                    };
                    engine.record_cash_movement(&session_id, movement).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let session = engine.session(&session.id).await.unwrap();
        assert_eq!(session.movements.len(), 21);
        assert_eq!(session.expected_cash, Money::from_cents(1_000 + 10 * 100 - 10 * 25));
        assert_eq!(session.expected_cash, session.ledger_balance());
    }
}
