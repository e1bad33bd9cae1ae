//! # Order Lifecycle
//!
//! The immutable, auditable record a cart becomes, and the state machine
//! that decides which mutations are legal.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create ──► PendingPayment ──Complete──► Completed ──Refund──► Refunded│
//! │                 │      ▲  │                                   │  ▲     │
//! │              Hold│ Submit  │Void                       Refund  └──┘     │
//! │                 ▼      │  ▼                                             │
//! │               Held ──Resume──► Draft          Voided (terminal)         │
//! │                 │                               ▲                       │
//! │                 └──────────────Void─────────────┘                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Legality lives in one place, [`OrderStatus::apply`], a total function
//! over `(status, event)`. Every mutating method goes through it.
//!
//! Payment mutations live in `payment.rs` as further `impl Order` blocks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::cart::{Cart, CartTotals, PricedCart};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::payment::{Payment, PaymentStatus};
use crate::pricing::PricedLine;
use crate::types::{new_id, Discount, TaxRate};
use crate::validation::normalize_reason;
use crate::WALK_IN_CUSTOMER_ID;

// =============================================================================
// Status Machine
// =============================================================================

/// Order lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Resumed from hold; editable, not payable.
    Draft,
    /// Awaiting payment.
    PendingPayment,
    /// Parked by the cashier.
    Held,
    /// Cancelled. Terminal.
    Voided,
    /// Fully paid.
    Completed,
    /// At least one return has been refunded against it.
    Refunded,
}

/// Something that happens to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    Submit,
    Hold,
    Resume,
    Void,
    Complete,
    Refund,
}

impl OrderEvent {
    fn action(&self) -> &'static str {
        match self {
            OrderEvent::Submit => "submit",
            OrderEvent::Hold => "hold",
            OrderEvent::Resume => "resume",
            OrderEvent::Void => "void",
            OrderEvent::Complete => "complete",
            OrderEvent::Refund => "refund",
        }
    }
}

impl OrderStatus {
    /// Next status for `event`, or `None` when the transition is illegal.
    pub fn apply(self, event: OrderEvent) -> Option<OrderStatus> {
        use OrderEvent as E;
        use OrderStatus as S;

        match (self, event) {
            (S::Draft, E::Submit) => Some(S::PendingPayment),
            (S::PendingPayment, E::Hold) => Some(S::Held),
            (S::PendingPayment, E::Void) => Some(S::Voided),
            (S::PendingPayment, E::Complete) => Some(S::Completed),
            (S::Held, E::Resume) => Some(S::Draft),
            (S::Held, E::Void) => Some(S::Voided),
            (S::Completed, E::Refund) | (S::Refunded, E::Refund) => Some(S::Refunded),
            (S::Draft, _)
            | (S::PendingPayment, _)
            | (S::Held, _)
            | (S::Voided, _)
            | (S::Completed, _)
            | (S::Refunded, _) => None,
        }
    }

    /// True when tenders may be added or confirmed.
    #[inline]
    pub fn accepts_payments(&self) -> bool {
        matches!(self, OrderStatus::PendingPayment)
    }

    /// Statuses that belong on a shift report.
    #[inline]
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Refunded | OrderStatus::Voided
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Draft => "draft",
            OrderStatus::PendingPayment => "pending_payment",
            OrderStatus::Held => "held",
            OrderStatus::Voided => "voided",
            OrderStatus::Completed => "completed",
            OrderStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Order
// =============================================================================

/// A priced, numbered order.
///
/// ## Invariants
/// - `totals.subtotal == Σ line.pricing.line_total_before_tax`
/// - `amount_due == max(0, totals.total − Σ completed payment amounts)`
/// - `status` alone decides which mutation is legal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Order {
    pub id: String,
    /// Human-readable, sequential per terminal (e.g. "POS-01-000042").
    pub order_number: String,
    pub terminal_id: String,
    pub session_id: Option<String>,
    pub customer_id: String,

    pub lines: Vec<PricedLine>,
    pub order_discount: Option<Discount>,
    pub tax_rate: TaxRate,
    pub totals: CartTotals,

    pub payments: Vec<Payment>,
    pub amount_paid: Money,
    pub amount_due: Money,
    pub change_given: Money,

    pub status: OrderStatus,
    pub hold_reason: Option<String>,
    pub void_reason: Option<String>,
    /// Returns raised against this order, in creation order.
    pub return_ids: Vec<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates an order awaiting payment from a priced cart.
    ///
    /// `order_number` comes from the persistence sequence and is never reused.
    pub fn create(
        order_number: impl Into<String>,
        terminal_id: impl Into<String>,
        session_id: Option<String>,
        customer_id: Option<String>,
        cart: PricedCart,
        now: DateTime<Utc>,
    ) -> CoreResult<Order> {
        if cart.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        let mut order = Order {
            id: new_id(),
            order_number: order_number.into(),
            terminal_id: terminal_id.into(),
            session_id,
            customer_id: customer_id.unwrap_or_else(|| WALK_IN_CUSTOMER_ID.to_string()),
            lines: cart.lines,
            order_discount: cart.order_discount,
            tax_rate: cart.tax_rate,
            totals: cart.totals,
            payments: Vec::new(),
            amount_paid: Money::zero(),
            amount_due: Money::zero(),
            change_given: Money::zero(),
            status: OrderStatus::PendingPayment,
            hold_reason: None,
            void_reason: None,
            return_ids: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
            voided_at: None,
        };
        order.recompute();
        Ok(order)
    }

    /// Parks the order. Its lines and totals are kept untouched.
    ///
    /// Refused while payments are attached: the cart could change on resume.
    pub fn hold(&mut self, reason: Option<&str>, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_no_active_payments()?;
        self.transition(OrderEvent::Hold, now)?;
        self.hold_reason = normalize_reason(reason);
        Ok(())
    }

    /// Returns a held order to `Draft` and hands back an editable cart.
    pub fn resume(&mut self, now: DateTime<Utc>) -> CoreResult<Cart> {
        self.transition(OrderEvent::Resume, now)?;
        self.hold_reason = None;
        Ok(Cart::from_priced(
            &self.lines,
            self.order_discount,
            Some(self.customer_id.clone()),
        ))
    }

    /// Re-prices a draft from an edited cart and makes it payable again.
    ///
    /// The order number is kept.
    pub fn submit(&mut self, cart: PricedCart, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status.apply(OrderEvent::Submit).is_none() {
            return Err(self.illegal(OrderEvent::Submit));
        }
        if cart.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        self.lines = cart.lines;
        self.order_discount = cart.order_discount;
        self.tax_rate = cart.tax_rate;
        self.totals = cart.totals;
        self.transition(OrderEvent::Submit, now)?;
        self.recompute();
        Ok(())
    }

    /// Cancels the order. No payment may be attached afterwards.
    pub fn void(&mut self, reason: Option<&str>, now: DateTime<Utc>) -> CoreResult<()> {
        let reason = normalize_reason(reason).ok_or_else(|| CoreError::ReasonRequired {
            kind: "void".to_string(),
        })?;
        self.ensure_no_active_payments()?;
        self.transition(OrderEvent::Void, now)?;
        self.void_reason = Some(reason);
        self.voided_at = Some(now);
        Ok(())
    }

    /// Completes a fully paid order.
    pub fn complete(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        if self.status.apply(OrderEvent::Complete).is_none() {
            return Err(self.illegal(OrderEvent::Complete));
        }
        if self.amount_due.is_positive() {
            return Err(CoreError::AmountOutstanding {
                order_id: self.id.clone(),
                due: self.amount_due,
            });
        }

        self.transition(OrderEvent::Complete, now)?;
        self.completed_at = Some(now);
        Ok(())
    }

    /// Marks the order refunded after a return has moved money.
    pub fn mark_refunded(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition(OrderEvent::Refund, now)
    }

    /// Records a return id once.
    pub fn attach_return(&mut self, return_id: &str) -> bool {
        if self.return_ids.iter().any(|id| id == return_id) {
            return false;
        }
        self.return_ids.push(return_id.to_string());
        true
    }

    pub fn line(&self, line_id: &str) -> CoreResult<&PricedLine> {
        self.lines
            .iter()
            .find(|l| l.id == line_id)
            .ok_or_else(|| CoreError::LineNotFound {
                order_id: self.id.clone(),
                line_id: line_id.to_string(),
            })
    }

    /// Re-derives `amount_paid`, `amount_due` and `change_given` from the
    /// payment list. Called after every payment mutation.
    pub fn recompute(&mut self) {
        let completed = || {
            self.payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Completed)
        };
        let paid: Money = completed().map(|p| p.amount).sum();
        let change: Money = completed().map(|p| p.change_given).sum();

        self.amount_paid = paid;
        self.amount_due = (self.totals.total - paid).non_negative();
        self.change_given = change;
    }

    pub(crate) fn transition(&mut self, event: OrderEvent, now: DateTime<Utc>) -> CoreResult<()> {
        let next = self.status.apply(event).ok_or_else(|| self.illegal(event))?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn illegal(&self, event: OrderEvent) -> CoreError {
        CoreError::transition("Order", self.id.clone(), self.status, event.action())
    }

    fn ensure_no_active_payments(&self) -> CoreResult<()> {
        let active: Money = self
            .payments
            .iter()
            .filter(|p| p.status.is_active())
            .map(|p| p.amount)
            .sum();
        if active.is_positive() {
            return Err(CoreError::PaymentsOutstanding {
                order_id: self.id.clone(),
                paid: active,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::pricing::LineItem;
    use crate::types::{Quantity, TenderMethod};

    pub(crate) const GCT: TaxRate = TaxRate::from_bps(1500);

    pub(crate) fn priced_cart(units: i64, unit_cents: i64) -> PricedCart {
        let mut cart = Cart::new();
        cart.add_item(LineItem::new(
            "p-1",
            "Widget",
            Quantity::from_units(units),
            Money::from_cents(unit_cents),
        ))
        .unwrap();
        cart.price(GCT).unwrap()
    }

    pub(crate) fn new_order(units: i64, unit_cents: i64) -> Order {
        Order::create(
            "POS-01-000001",
            "POS-01",
            Some("s-1".to_string()),
            None,
            priced_cart(units, unit_cents),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_create_is_pending_payment() {
        let order = new_order(2, 10000);
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.customer_id, WALK_IN_CUSTOMER_ID);
        assert_eq!(order.totals.total.cents(), 23000);
        assert_eq!(order.amount_due.cents(), 23000);
        assert_eq!(order.amount_paid, Money::zero());
    }

    #[test]
    fn test_transition_table_is_total() {
        use OrderEvent as E;
        use OrderStatus as S;
        let legal = [
            (S::Draft, E::Submit, S::PendingPayment),
            (S::PendingPayment, E::Hold, S::Held),
            (S::PendingPayment, E::Void, S::Voided),
            (S::PendingPayment, E::Complete, S::Completed),
            (S::Held, E::Resume, S::Draft),
            (S::Held, E::Void, S::Voided),
            (S::Completed, E::Refund, S::Refunded),
            (S::Refunded, E::Refund, S::Refunded),
        ];
        let statuses = [
            S::Draft,
            S::PendingPayment,
            S::Held,
            S::Voided,
            S::Completed,
            S::Refunded,
        ];
        let events = [
            E::Submit,
            E::Hold,
            E::Resume,
            E::Void,
            E::Complete,
            E::Refund,
        ];
        for s in statuses {
            for e in events {
                let expected = legal
                    .iter()
                    .find(|(from, ev, _)| *from == s && *ev == e)
                    .map(|(_, _, to)| *to);
                assert_eq!(s.apply(e), expected, "{s} + {e:?}");
            }
        }
    }

    #[test]
    fn test_hold_resume_submit_keeps_totals_and_number() {
        let mut order = new_order(2, 10000);
        let before = order.totals;
        let number = order.order_number.clone();

        order.hold(Some("customer fetching wallet"), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Held);
        assert_eq!(order.hold_reason.as_deref(), Some("customer fetching wallet"));

        let cart = order.resume(Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Draft);
        assert_eq!(cart.price(GCT).unwrap().totals, before);

        // Draft is not payable
        assert!(!order.status.accepts_payments());

        order.submit(cart.price(GCT).unwrap(), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert_eq!(order.totals, before);
        assert_eq!(order.order_number, number);
    }

    #[test]
    fn test_void_requires_reason_and_is_terminal() {
        let mut order = new_order(1, 500);
        assert!(matches!(
            order.void(Some("  "), Utc::now()),
            Err(CoreError::ReasonRequired { .. })
        ));

        order.void(Some("customer left"), Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Voided);
        assert!(order.voided_at.is_some());

        let err = order.hold(None, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        let err = order
            .add_payment(TenderMethod::Cash, Money::from_cents(500), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_requires_nothing_due() {
        let mut order = new_order(1, 500);
        let err = order.complete(Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::AmountOutstanding { .. }));
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[test]
    fn test_void_with_settled_payment_is_refused() {
        let mut order = new_order(2, 10000);
        order
            .add_payment(TenderMethod::Cash, Money::from_cents(5000), None, Utc::now())
            .unwrap();
        let err = order.void(Some("changed mind"), Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::PaymentsOutstanding { .. }));
        assert_eq!(order.status, OrderStatus::PendingPayment);
    }

    #[test]
    fn test_refund_only_after_completion() {
        let mut order = new_order(1, 500);
        assert!(order.mark_refunded(Utc::now()).is_err());
        let due = order.amount_due;
        order
            .add_payment(TenderMethod::Cash, due, None, Utc::now())
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        order.mark_refunded(Utc::now()).unwrap();
        order.mark_refunded(Utc::now()).unwrap();
        assert_eq!(order.status, OrderStatus::Refunded);
    }

    #[test]
    fn test_line_lookup() {
        let order = new_order(1, 500);
        let id = order.lines[0].id.clone();
        assert!(order.line(&id).is_ok());
        assert!(matches!(
            order.line("nope"),
            Err(CoreError::LineNotFound { .. })
        ));
    }
}
