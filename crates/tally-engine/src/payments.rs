//! Payment operations.
//!
//! Cash goes through the drawer: a cash tender records a `sale` movement of
//! the amount applied (tendered minus change) in the same commit as the
//! payment, and reversing a settled cash tender records a `refund`.

use tracing::{info, warn};

use tally_core::{
    CashMovementKind, Money, NewCashMovement, Order, Payment, PaymentOutcome, PaymentStatus,
    Session, TenderMethod,
};

use crate::engine::{PosEngine, Write};
use crate::error::EngineResult;
use crate::orders::attach_settled;

fn staged(
    order_before: Order,
    order: &Order,
    session: Option<(&Session, Session)>,
) -> Vec<Write> {
    let mut writes = vec![Write::Order {
        before: order_before,
        after: order.clone(),
    }];
    if let Some((before, after)) = session {
        writes.push(Write::Session {
            before: before.clone(),
            after,
        });
    }
    writes
}

impl PosEngine {
    /// Adds a tender to an order awaiting payment.
    ///
    /// Cash settles at once and may overpay (the excess is change); card and
    /// mobile-wallet tenders must match the amount due exactly and stay
    /// pending until the processor answers.
    pub async fn add_payment(
        &self,
        order_id: &str,
        method: TenderMethod,
        amount: Money,
        tendered: Option<Money>,
    ) -> EngineResult<PaymentOutcome> {
        let now = self.now();
        let _order_guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let session = self.lock_session_of(before.session_id.as_deref()).await?;

        let mut order = before.clone();
        let outcome = order.add_payment(method, amount, tendered, now)?;

        let session_after = match &session {
            Some((_, session_before)) => {
                let mut updated = session_before.clone();
                if method.is_cash() {
                    updated.record_movement(
                        NewCashMovement::new(
                            CashMovementKind::Sale,
                            outcome.payment.amount,
                            updated.cashier_id.clone(),
                        )
                        .for_order(&order.id),
                        now,
                    )?;
                }
                if outcome.order_completed {
                    attach_settled(&mut updated, &order);
                }
                Some((session_before, updated))
            }
            None => None,
        };

        self.commit(staged(before, &order, session_after)).await?;

        info!(
            order_id,
            payment_id = %outcome.payment.id,
            method = %method,
            amount = %outcome.payment.amount,
            change = %outcome.payment.change_given,
            due = %order.amount_due,
            "Payment added"
        );
        if outcome.order_completed {
            info!(order_id, "Order completed");
        }
        Ok(outcome)
    }

    /// Applies the processor's confirmation to a pending tender.
    pub async fn mark_payment_completed(
        &self,
        order_id: &str,
        payment_id: &str,
        reference: Option<&str>,
    ) -> EngineResult<PaymentOutcome> {
        let now = self.now();
        let _order_guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let session = self.lock_session_of(before.session_id.as_deref()).await?;

        let mut order = before.clone();
        let outcome = order.mark_payment_completed(payment_id, reference, now)?;

        let session_after = match &session {
            Some((_, session_before)) if outcome.order_completed => {
                let mut updated = session_before.clone();
                attach_settled(&mut updated, &order);
                Some((session_before, updated))
            }
            _ => None,
        };

        self.commit(staged(before, &order, session_after)).await?;

        info!(order_id, payment_id, reference = ?reference, "Payment confirmed");
        Ok(outcome)
    }

    /// Applies the processor's decline to a pending tender.
    pub async fn mark_payment_failed(
        &self,
        order_id: &str,
        payment_id: &str,
        reason: Option<&str>,
    ) -> EngineResult<Payment> {
        let _order_guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;

        let mut order = before.clone();
        let payment = order.mark_payment_failed(payment_id, reason, self.now())?;

        self.commit(staged(before, &order, None)).await?;

        warn!(order_id, payment_id, reason = ?payment.failure_reason, "Payment failed");
        Ok(payment)
    }

    /// Takes a tender off an order still awaiting payment.
    ///
    /// A settled cash tender is handed back from the drawer, so it needs
    /// the order's session to be open.
    pub async fn remove_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        actor: &str,
    ) -> EngineResult<Payment> {
        let now = self.now();
        let _order_guard = self.lock_order(order_id).await;
        let before = self.order(order_id).await?;
        let session = self.lock_session_of(before.session_id.as_deref()).await?;

        let mut order = before.clone();
        let removed = order.remove_payment(payment_id, now)?;
        let hands_back_cash =
            removed.status == PaymentStatus::Refunded && removed.method.is_cash();

        let session_after = match &session {
            Some((_, session_before)) if hands_back_cash => {
                let mut updated = session_before.clone();
                updated.record_movement(
                    NewCashMovement::new(CashMovementKind::Refund, removed.amount, actor)
                        .reason(format!("payment {} reversed", removed.id))
                        .for_order(&order.id),
                    now,
                )?;
                Some((session_before, updated))
            }
            _ => None,
        };

        self.commit(staged(before, &order, session_after)).await?;

        info!(
            order_id,
            payment_id,
            status = %removed.status,
            due = %order.amount_due,
            "Payment removed"
        );
        Ok(removed)
    }
}
