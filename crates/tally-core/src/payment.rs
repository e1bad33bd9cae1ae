//! # Payment Ledger
//!
//! Tenders recorded against an order and the derived paid / due / change
//! amounts.
//!
//! ## Tender Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  uncommitted due = total − completed − pending                          │
//! │                                                                         │
//! │  Cash                                                                   │
//! │    applied  = min(amount, uncommitted due)                              │
//! │    tendered ≥ amount            (defaults to amount)                    │
//! │    change   = tendered − applied                                        │
//! │    status   = Completed immediately                                     │
//! │                                                                         │
//! │  Card / MobileWallet                                                    │
//! │    amount must equal uncommitted due exactly                            │
//! │    status   = Pending until the capture collaborator answers            │
//! │                                                                         │
//! │  After every mutation: recompute paid / due / change;                   │
//! │  due reaches 0 while payable ──► order completes                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Payment Status
//! ```text
//!   Pending ──Confirm──► Completed ──Refund──► Refunded
//!      │
//!      └────Fail───────► Failed
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::order::{Order, OrderEvent, OrderStatus};
use crate::types::{new_id, TenderMethod};
use crate::validation::{normalize_reason, validate_payment_amount};

// =============================================================================
// Payment Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEvent {
    Confirm,
    Fail,
    Refund,
}

impl PaymentStatus {
    /// Next status for `event`, or `None` when illegal.
    pub fn apply(self, event: PaymentEvent) -> Option<PaymentStatus> {
        use PaymentEvent as E;
        use PaymentStatus as S;

        match (self, event) {
            (S::Pending, E::Confirm) => Some(S::Completed),
            (S::Pending, E::Fail) => Some(S::Failed),
            (S::Completed, E::Refund) => Some(S::Refunded),
            (S::Pending, E::Refund)
            | (S::Completed, E::Confirm | E::Fail)
            | (S::Failed, _)
            | (S::Refunded, _) => None,
        }
    }

    /// Counts against the order total (settled or awaiting capture).
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Completed)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A single tender against an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub method: TenderMethod,
    /// Amount applied to the order.
    pub amount: Money,
    /// Cash handed over (cash only).
    pub tendered: Option<Money>,
    pub change_given: Money,
    pub status: PaymentStatus,
    /// Processor reference once captured.
    pub reference: Option<String>,
    pub failure_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    fn advance(&mut self, event: PaymentEvent, now: DateTime<Utc>) -> CoreResult<()> {
        let action = match event {
            PaymentEvent::Confirm => "confirm",
            PaymentEvent::Fail => "fail",
            PaymentEvent::Refund => "refund",
        };
        let next = self
            .status
            .apply(event)
            .ok_or_else(|| CoreError::transition("Payment", self.id.clone(), self.status, action))?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// What a ledger mutation did to the order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentOutcome {
    /// Snapshot of the payment after the mutation.
    pub payment: Payment,
    /// The mutation brought due to zero and completed the order.
    pub order_completed: bool,
}

// =============================================================================
// Ledger Operations
// =============================================================================

impl Order {
    /// Total minus every completed or pending payment, floored at zero.
    pub fn uncommitted_due(&self) -> Money {
        let committed: Money = self
            .payments
            .iter()
            .filter(|p| p.status.is_active())
            .map(|p| p.amount)
            .sum();
        (self.totals.total - committed).non_negative()
    }

    /// Appends a tender.
    ///
    /// ## Errors
    /// - `InvalidTransition` unless the order is awaiting payment
    /// - `NothingDue` when completed and pending tenders already cover the total
    /// - `TenderMismatch` for a non-cash amount different from the due amount
    /// - `CashTenderShort` when tendered cash is below the amount
    pub fn add_payment(
        &mut self,
        method: TenderMethod,
        amount: Money,
        tendered: Option<Money>,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentOutcome> {
        if !self.status.accepts_payments() {
            return Err(CoreError::transition(
                "Order",
                self.id.clone(),
                self.status,
                "add payment",
            ));
        }
        validate_payment_amount(amount)?;

        let due = self.uncommitted_due();
        if due.is_zero() {
            return Err(CoreError::NothingDue {
                order_id: self.id.clone(),
            });
        }

        let payment = if method.is_cash() {
            let tendered = tendered.unwrap_or(amount);
            if tendered < amount {
                return Err(CoreError::CashTenderShort { tendered, amount });
            }
            let applied = amount.min(due);
            Payment {
                id: new_id(),
                order_id: self.id.clone(),
                method,
                amount: applied,
                tendered: Some(tendered),
                change_given: tendered - applied,
                status: PaymentStatus::Completed,
                reference: None,
                failure_reason: None,
                created_at: now,
                updated_at: now,
            }
        } else {
            if amount != due {
                return Err(CoreError::TenderMismatch {
                    method,
                    amount,
                    due,
                });
            }
            Payment {
                id: new_id(),
                order_id: self.id.clone(),
                method,
                amount,
                tendered: None,
                change_given: Money::zero(),
                status: PaymentStatus::Pending,
                reference: None,
                failure_reason: None,
                created_at: now,
                updated_at: now,
            }
        };

        self.payments.push(payment.clone());
        self.updated_at = now;
        let order_completed = self.settle(now)?;
        Ok(PaymentOutcome {
            payment,
            order_completed,
        })
    }

    /// Applies a capture confirmation to a pending tender.
    pub fn mark_payment_completed(
        &mut self,
        payment_id: &str,
        reference: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentOutcome> {
        if !self.status.accepts_payments() {
            return Err(CoreError::transition(
                "Order",
                self.id.clone(),
                self.status,
                "confirm payment",
            ));
        }

        let payment = self.payment_mut(payment_id)?;
        payment.advance(PaymentEvent::Confirm, now)?;
        payment.reference = normalize_reason(reference);
        let snapshot = payment.clone();

        self.updated_at = now;
        let order_completed = self.settle(now)?;
        Ok(PaymentOutcome {
            payment: snapshot,
            order_completed,
        })
    }

    /// Applies a capture failure to a pending tender.
    ///
    /// Legal on any order status: the capture result is a fact that must
    /// be recorded even if the order has since moved on.
    pub fn mark_payment_failed(
        &mut self,
        payment_id: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<Payment> {
        let payment = self.payment_mut(payment_id)?;
        payment.advance(PaymentEvent::Fail, now)?;
        payment.failure_reason = normalize_reason(reason);
        let snapshot = payment.clone();

        self.updated_at = now;
        self.recompute();
        Ok(snapshot)
    }

    /// Removes a tender from an order still awaiting payment.
    ///
    /// - pending or failed: dropped from the ledger
    /// - completed: kept and marked `Refunded`; a cash refund must then be
    ///   taken out of the drawer by the caller
    pub fn remove_payment(&mut self, payment_id: &str, now: DateTime<Utc>) -> CoreResult<Payment> {
        if !self.status.accepts_payments() {
            return Err(CoreError::transition(
                "Order",
                self.id.clone(),
                self.status,
                "remove payment",
            ));
        }

        let index = self.payment_index(payment_id)?;
        let removed = match self.payments[index].status {
            PaymentStatus::Pending | PaymentStatus::Failed => self.payments.remove(index),
            PaymentStatus::Completed => {
                let payment = &mut self.payments[index];
                payment.advance(PaymentEvent::Refund, now)?;
                payment.clone()
            }
            PaymentStatus::Refunded => {
                return Err(CoreError::transition(
                    "Payment",
                    payment_id,
                    PaymentStatus::Refunded,
                    "remove",
                ))
            }
        };

        self.updated_at = now;
        self.recompute();
        Ok(removed)
    }

    pub fn payment(&self, payment_id: &str) -> CoreResult<&Payment> {
        self.payments
            .iter()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| self.payment_not_found(payment_id))
    }

    /// Recomputes derived amounts and completes the order when nothing is due.
    fn settle(&mut self, now: DateTime<Utc>) -> CoreResult<bool> {
        self.recompute();
        if self.amount_due.is_zero() && self.status == OrderStatus::PendingPayment {
            self.transition(OrderEvent::Complete, now)?;
            self.completed_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    fn payment_index(&self, payment_id: &str) -> CoreResult<usize> {
        self.payments
            .iter()
            .position(|p| p.id == payment_id)
            .ok_or_else(|| self.payment_not_found(payment_id))
    }

    fn payment_mut(&mut self, payment_id: &str) -> CoreResult<&mut Payment> {
        let index = self.payment_index(payment_id)?;
        Ok(&mut self.payments[index])
    }

    fn payment_not_found(&self, payment_id: &str) -> CoreError {
        CoreError::PaymentNotFound {
            order_id: self.id.clone(),
            payment_id: payment_id.to_string(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::new_order;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    fn assert_due_invariant(order: &Order) {
        let paid: Money = order
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .map(|p| p.amount)
            .sum();
        assert_eq!(order.amount_paid, paid);
        assert_eq!(order.amount_due, (order.totals.total - paid).non_negative());
    }

    #[test]
    fn test_exact_cash_completes_order() {
        let mut order = new_order(2, 10000); // total 230.00
        let outcome = order
            .add_payment(TenderMethod::Cash, cents(23000), None, now())
            .unwrap();
        assert!(outcome.order_completed);
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.amount_due, Money::zero());
        assert_eq!(order.change_given, Money::zero());
        assert!(order.completed_at.is_some());
        assert_due_invariant(&order);
    }

    #[test]
    fn test_cash_overpayment_gives_change() {
        let mut order = new_order(2, 10000);
        let outcome = order
            .add_payment(TenderMethod::Cash, cents(25000), Some(cents(25000)), now())
            .unwrap();
        assert_eq!(outcome.payment.amount.cents(), 23000);
        assert_eq!(outcome.payment.change_given.cents(), 2000);
        assert_eq!(order.change_given.cents(), 2000);
        assert_eq!(order.amount_paid.cents(), 23000);
        assert_due_invariant(&order);
    }

    #[test]
    fn test_cash_tender_below_amount_rejected() {
        let mut order = new_order(2, 10000);
        let err = order
            .add_payment(TenderMethod::Cash, cents(10000), Some(cents(5000)), now())
            .unwrap_err();
        assert!(matches!(err, CoreError::CashTenderShort { .. }));
        assert!(order.payments.is_empty());
    }

    #[test]
    fn test_split_cash_then_card() {
        let mut order = new_order(2, 10000);
        order
            .add_payment(TenderMethod::Cash, cents(3000), None, now())
            .unwrap();
        assert_eq!(order.amount_due.cents(), 20000);
        assert_due_invariant(&order);

        let err = order
            .add_payment(TenderMethod::Card, cents(15000), None, now())
            .unwrap_err();
        assert!(matches!(err, CoreError::TenderMismatch { .. }));

        let card = order
            .add_payment(TenderMethod::Card, cents(20000), None, now())
            .unwrap();
        assert_eq!(card.payment.status, PaymentStatus::Pending);
        assert!(!card.order_completed);
        // Pending does not count as paid
        assert_eq!(order.amount_due.cents(), 20000);
        assert_due_invariant(&order);

        // Pending covers the rest: nothing left to tender
        let err = order
            .add_payment(TenderMethod::Cash, cents(100), None, now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NothingDue { .. }));

        let confirmed = order
            .mark_payment_completed(&card.payment.id, Some("AUTH-778"), now())
            .unwrap();
        assert!(confirmed.order_completed);
        assert_eq!(confirmed.payment.reference.as_deref(), Some("AUTH-778"));
        assert_eq!(order.status, OrderStatus::Completed);
        assert_due_invariant(&order);
    }

    #[test]
    fn test_failed_capture_frees_the_due_amount() {
        let mut order = new_order(1, 10000);
        let card = order
            .add_payment(TenderMethod::MobileWallet, order.uncommitted_due(), None, now())
            .unwrap();
        order
            .mark_payment_failed(&card.payment.id, Some("declined"), now())
            .unwrap();
        assert_eq!(order.uncommitted_due(), order.totals.total);
        assert_eq!(order.status, OrderStatus::PendingPayment);

        // A failed payment cannot be confirmed later
        let err = order
            .mark_payment_completed(&card.payment.id, None, now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_remove_completed_cash_marks_refunded() {
        let mut order = new_order(2, 10000);
        let cash = order
            .add_payment(TenderMethod::Cash, cents(5000), None, now())
            .unwrap();
        let removed = order.remove_payment(&cash.payment.id, now()).unwrap();
        assert_eq!(removed.status, PaymentStatus::Refunded);
        assert_eq!(order.amount_paid, Money::zero());
        assert_eq!(order.amount_due.cents(), 23000);
        assert_eq!(order.payments.len(), 1);
        assert_due_invariant(&order);

        let err = order.remove_payment(&cash.payment.id, now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_remove_pending_drops_it() {
        let mut order = new_order(1, 10000);
        let card = order
            .add_payment(TenderMethod::Card, order.uncommitted_due(), None, now())
            .unwrap();
        order.remove_payment(&card.payment.id, now()).unwrap();
        assert!(order.payments.is_empty());
        assert!(matches!(
            order.payment(&card.payment.id),
            Err(CoreError::PaymentNotFound { .. })
        ));
    }

    #[test]
    fn test_payment_status_machine() {
        use PaymentEvent as E;
        use PaymentStatus as S;
        assert_eq!(S::Pending.apply(E::Confirm), Some(S::Completed));
        assert_eq!(S::Pending.apply(E::Fail), Some(S::Failed));
        assert_eq!(S::Completed.apply(E::Refund), Some(S::Refunded));
        assert_eq!(S::Completed.apply(E::Fail), None);
        assert_eq!(S::Failed.apply(E::Confirm), None);
        assert_eq!(S::Refunded.apply(E::Refund), None);
    }

    #[test]
    fn test_due_invariant_across_random_sequence() {
        let mut order = new_order(7, 1234);
        let amounts = [1, 250, 999, 17, 3000];
        for a in amounts {
            if order.status != OrderStatus::PendingPayment {
                break;
            }
            let result = order.add_payment(TenderMethod::Cash, cents(a), None, now());
            assert!(result.is_ok());
            assert_due_invariant(&order);
        }
    }
}
