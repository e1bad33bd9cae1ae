//! # Cash Sessions
//!
//! A cashier's drawer across a shift: the opening float, an append-only
//! ledger of cash movements, the running expected balance, and the close
//! that compares expected against counted cash.
//!
//! ## Drawer Arithmetic
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Kind           Recorded amount        Effect on expected cash          │
//! │  ─────────────  ─────────────────────  ──────────────────────────────   │
//! │  OpeningFloat   opening cash           none (it IS the starting point)  │
//! │  Sale           +|amount|              +                                │
//! │  Refund         −|amount|              −                                │
//! │  Payout         −|amount|              −   (reason required)            │
//! │  Drop           −|amount|              −   (reason required)            │
//! │  Adjustment     signed as given        ±   (reason required when < 0)   │
//! │  ClosingCount   counted cash           none                             │
//! │                                                                         │
//! │  expected_cash = opening_cash + Σ effect(movement)                      │
//! │  variance      = counted_cash − expected_cash   (data, never an error)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Status
//! ```text
//!   Open ◄──Resume── Suspended
//!    │ ──Suspend──►     │
//!    └────Close────► Closed ◄────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::order::{Order, OrderStatus};
use crate::payment::PaymentStatus;
use crate::types::{new_id, TenderMethod};
use crate::validation::{normalize_reason, validate_cash_count, validate_required};

// =============================================================================
// Session Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Suspended,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Suspend,
    Resume,
    Close,
}

impl SessionStatus {
    pub fn apply(self, event: SessionEvent) -> Option<SessionStatus> {
        use SessionEvent as E;
        use SessionStatus as S;

        match (self, event) {
            (S::Open, E::Suspend) => Some(S::Suspended),
            (S::Suspended, E::Resume) => Some(S::Open),
            (S::Open | S::Suspended, E::Close) => Some(S::Closed),
            (S::Open, E::Resume) | (S::Suspended, E::Suspend) | (S::Closed, _) => None,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Open => "open",
            SessionStatus::Suspended => "suspended",
            SessionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Cash Movements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CashMovementKind {
    OpeningFloat,
    Sale,
    Refund,
    Payout,
    Drop,
    Adjustment,
    ClosingCount,
}

impl CashMovementKind {
    /// Kinds the caller may record directly; the other two are written by
    /// open and close.
    pub fn is_recordable(&self) -> bool {
        !matches!(
            self,
            CashMovementKind::OpeningFloat | CashMovementKind::ClosingCount
        )
    }

    /// Normalises a caller-supplied amount to its signed drawer effect.
    fn signed(&self, amount: Money) -> Money {
        match self {
            CashMovementKind::Sale => amount.abs(),
            CashMovementKind::Refund | CashMovementKind::Payout | CashMovementKind::Drop => {
                -amount.abs()
            }
            CashMovementKind::Adjustment
            | CashMovementKind::OpeningFloat
            | CashMovementKind::ClosingCount => amount,
        }
    }
}

impl fmt::Display for CashMovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CashMovementKind::OpeningFloat => "opening_float",
            CashMovementKind::Sale => "sale",
            CashMovementKind::Refund => "refund",
            CashMovementKind::Payout => "payout",
            CashMovementKind::Drop => "drop",
            CashMovementKind::Adjustment => "adjustment",
            CashMovementKind::ClosingCount => "closing_count",
        };
        f.write_str(s)
    }
}

/// One entry in the drawer ledger. Never edited or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashMovement {
    pub id: String,
    pub session_id: String,
    pub kind: CashMovementKind,
    /// Signed amount (negative when cash leaves the drawer).
    pub amount: Money,
    pub order_id: Option<String>,
    pub reason: Option<String>,
    pub actor: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl CashMovement {
    /// Contribution to expected cash.
    pub fn drawer_effect(&self) -> Money {
        if self.kind.is_recordable() {
            self.amount
        } else {
            Money::zero()
        }
    }
}

/// A request to record a drawer movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewCashMovement {
    pub kind: CashMovementKind,
    pub amount: Money,
    pub reason: Option<String>,
    pub order_id: Option<String>,
    pub actor: String,
}

impl NewCashMovement {
    pub fn new(kind: CashMovementKind, amount: Money, actor: impl Into<String>) -> Self {
        NewCashMovement {
            kind,
            amount,
            reason: None,
            order_id: None,
            actor: actor.into(),
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn for_order(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }
}

// =============================================================================
// Aggregates
// =============================================================================

/// Count and total for one tender method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenderTotal {
    pub method: TenderMethod,
    pub count: u32,
    pub amount: Money,
}

/// Money that went back to a customer through a completed return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettledRefund {
    pub return_id: String,
    /// Money back, tax included.
    pub amount: Money,
    /// The tax part of `amount`.
    #[serde(default)]
    pub tax: Money,
}

/// Sales aggregates over a set of settled orders and their returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    pub completed_count: u32,
    pub voided_count: u32,
    pub refunded_count: u32,
    /// Completed returns.
    pub return_count: u32,
    /// Σ subtotal of completed and refunded orders (before order discount).
    pub gross_sales: Money,
    pub line_discounts: Money,
    pub order_discounts: Money,
    /// Σ refund of completed returns, tax included.
    pub refunds: Money,
    /// The tax part of `refunds`.
    pub refunded_tax: Money,
    /// Σ total of voided orders.
    pub voided_amount: Money,
    /// gross − order discounts − refunds before tax.
    pub net_sales: Money,
    pub taxable_sales: Money,
    pub exempt_sales: Money,
    pub tax_collected: Money,
    /// tax collected − refunded tax.
    pub net_tax: Money,
    /// One entry per tender method, completed payments only.
    pub tenders: Vec<TenderTotal>,
}

impl SalesSummary {
    /// Scans each settled order once (duplicates by id are ignored), and
    /// each settled refund once.
    ///
    /// Orders are visited in id order so the result never depends on the
    /// order the caller loaded them in.
    pub fn from_activity(orders: &[Order], refunds: &[SettledRefund]) -> SalesSummary {
        let mut sorted: Vec<&Order> = orders.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));

        let mut seen = BTreeSet::new();
        let mut summary = SalesSummary {
            completed_count: 0,
            voided_count: 0,
            refunded_count: 0,
            return_count: 0,
            gross_sales: Money::zero(),
            line_discounts: Money::zero(),
            order_discounts: Money::zero(),
            refunds: Money::zero(),
            refunded_tax: Money::zero(),
            voided_amount: Money::zero(),
            net_sales: Money::zero(),
            taxable_sales: Money::zero(),
            exempt_sales: Money::zero(),
            tax_collected: Money::zero(),
            net_tax: Money::zero(),
            tenders: TenderMethod::ALL
                .iter()
                .map(|&method| TenderTotal {
                    method,
                    count: 0,
                    amount: Money::zero(),
                })
                .collect(),
        };

        for order in sorted {
            if !order.status.is_settled() || !seen.insert(order.id.as_str()) {
                continue;
            }

            match order.status {
                OrderStatus::Voided => {
                    summary.voided_count += 1;
                    summary.voided_amount += order.totals.total;
                    continue;
                }
                OrderStatus::Refunded => summary.refunded_count += 1,
                _ => summary.completed_count += 1,
            }

            summary.gross_sales += order.totals.subtotal;
            summary.line_discounts += order.totals.line_discount_total;
            summary.order_discounts += order.totals.order_discount;
            summary.taxable_sales += order.totals.taxable_amount;
            summary.exempt_sales += order.totals.exempt_amount;
            summary.tax_collected += order.totals.tax_amount;

            for payment in order
                .payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Completed)
            {
                if let Some(tender) = summary
                    .tenders
                    .iter_mut()
                    .find(|t| t.method == payment.method)
                {
                    tender.count += 1;
                    tender.amount += payment.amount;
                }
            }
        }

        let mut seen_returns = BTreeSet::new();
        for refund in refunds {
            if seen_returns.insert(refund.return_id.as_str()) {
                summary.return_count += 1;
                summary.refunds += refund.amount;
                summary.refunded_tax += refund.tax;
            }
        }

        let refunds_before_tax = summary.refunds - summary.refunded_tax;
        summary.net_sales = summary.gross_sales - summary.order_discounts - refunds_before_tax;
        summary.net_tax = summary.tax_collected - summary.refunded_tax;
        summary
    }
}

/// The cash block of a shift: where the drawer balance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CashReconciliation {
    pub opening_cash: Money,
    pub cash_sales: Money,
    /// Positive magnitudes for the outflows.
    pub cash_refunds: Money,
    pub payouts: Money,
    pub drops: Money,
    /// Net signed adjustments.
    pub adjustments: Money,
    pub expected_cash: Money,
    pub counted_cash: Option<Money>,
    pub variance: Option<Money>,
}

// =============================================================================
// Session
// =============================================================================

/// A cashier's drawer session.
///
/// ## Invariant
/// `expected_cash == opening_cash + Σ movement.drawer_effect()` after every
/// movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Session {
    pub id: String,
    pub terminal_id: String,
    pub cashier_id: String,
    pub status: SessionStatus,
    pub opening_cash: Money,
    pub movements: Vec<CashMovement>,
    pub expected_cash: Money,
    /// Orders settled (completed or voided) under this session.
    pub order_ids: Vec<String>,
    /// Returns refunded under this session.
    pub return_ids: Vec<String>,
    /// Filled in on close.
    pub summary: Option<SalesSummary>,
    pub closing_cash: Option<Money>,
    pub variance: Option<Money>,
    pub closing_notes: Option<String>,
    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Opens a drawer with its float.
    pub fn open(
        terminal_id: &str,
        cashier_id: &str,
        opening_cash: Money,
        now: DateTime<Utc>,
    ) -> CoreResult<Session> {
        validate_required("terminal", terminal_id)?;
        validate_required("cashier", cashier_id)?;
        validate_cash_count("opening cash", opening_cash)?;

        let id = new_id();
        let float = CashMovement {
            id: new_id(),
            session_id: id.clone(),
            kind: CashMovementKind::OpeningFloat,
            amount: opening_cash,
            order_id: None,
            reason: None,
            actor: cashier_id.to_string(),
            created_at: now,
        };

        Ok(Session {
            id,
            terminal_id: terminal_id.to_string(),
            cashier_id: cashier_id.to_string(),
            status: SessionStatus::Open,
            opening_cash,
            movements: vec![float],
            expected_cash: opening_cash,
            order_ids: Vec::new(),
            return_ids: Vec::new(),
            summary: None,
            closing_cash: None,
            variance: None,
            closing_notes: None,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        })
    }

    /// Appends a movement and moves expected cash by its effect.
    ///
    /// ## Errors
    /// - `InvalidTransition` unless the session is open
    /// - opening float / closing count kinds, or a zero amount
    /// - `ReasonRequired` when cash leaves the drawer for anything but a sale
    pub fn record_movement(
        &mut self,
        movement: NewCashMovement,
        now: DateTime<Utc>,
    ) -> CoreResult<&CashMovement> {
        if self.status != SessionStatus::Open {
            return Err(CoreError::transition(
                "Session",
                self.id.clone(),
                self.status,
                format!("record {} movement", movement.kind),
            ));
        }
        if !movement.kind.is_recordable() {
            return Err(ValidationError::Invalid {
                field: "movement kind".to_string(),
                message: format!("{} is written by the session itself", movement.kind),
            }
            .into());
        }
        if movement.amount.is_zero() {
            return Err(ValidationError::MustNotBeZero {
                field: "movement amount".to_string(),
            }
            .into());
        }

        let amount = movement.kind.signed(movement.amount);
        let reason = normalize_reason(movement.reason.as_deref());
        if amount.is_negative() && reason.is_none() {
            return Err(CoreError::ReasonRequired {
                kind: movement.kind.to_string(),
            });
        }

        self.movements.push(CashMovement {
            id: new_id(),
            session_id: self.id.clone(),
            kind: movement.kind,
            amount,
            order_id: movement.order_id,
            reason,
            actor: movement.actor,
            created_at: now,
        });
        self.expected_cash += amount;
        self.updated_at = now;

        let recorded = self.movements.len() - 1;
        Ok(&self.movements[recorded])
    }

    pub fn suspend(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition(SessionEvent::Suspend, "suspend", now)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.transition(SessionEvent::Resume, "resume", now)
    }

    /// Seals the session.
    ///
    /// `orders` and `refunds` are the entities referenced by `order_ids` and
    /// `return_ids`; anything else in the slices is ignored.
    pub fn close(
        &mut self,
        counted_cash: Money,
        notes: Option<&str>,
        actor: &str,
        orders: &[Order],
        refunds: &[SettledRefund],
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.status.apply(SessionEvent::Close).is_none() {
            return Err(CoreError::transition(
                "Session",
                self.id.clone(),
                self.status,
                "close",
            ));
        }
        validate_cash_count("counted cash", counted_cash)?;

        let own_orders: Vec<Order> = orders
            .iter()
            .filter(|o| self.order_ids.contains(&o.id))
            .cloned()
            .collect();
        let own_refunds: Vec<SettledRefund> = refunds
            .iter()
            .filter(|r| self.return_ids.contains(&r.return_id))
            .cloned()
            .collect();

        self.summary = Some(SalesSummary::from_activity(&own_orders, &own_refunds));
        self.movements.push(CashMovement {
            id: new_id(),
            session_id: self.id.clone(),
            kind: CashMovementKind::ClosingCount,
            amount: counted_cash,
            order_id: None,
            reason: None,
            actor: actor.to_string(),
            created_at: now,
        });
        self.closing_cash = Some(counted_cash);
        self.variance = Some(counted_cash - self.expected_cash);
        self.closing_notes = normalize_reason(notes);
        self.closed_at = Some(now);
        self.transition(SessionEvent::Close, "close", now)
    }

    /// Records an order as settled here. Returns `false` if already attached.
    pub fn attach_order(&mut self, order_id: &str) -> bool {
        if self.order_ids.iter().any(|id| id == order_id) {
            return false;
        }
        self.order_ids.push(order_id.to_string());
        true
    }

    /// Records a return as refunded here. Returns `false` if already attached.
    pub fn attach_return(&mut self, return_id: &str) -> bool {
        if self.return_ids.iter().any(|id| id == return_id) {
            return false;
        }
        self.return_ids.push(return_id.to_string());
        true
    }

    /// Recomputes expected cash from the ledger.
    pub fn ledger_balance(&self) -> Money {
        self.opening_cash
            + self
                .movements
                .iter()
                .map(CashMovement::drawer_effect)
                .sum::<Money>()
    }

    /// Breaks the ledger down by kind.
    pub fn cash_reconciliation(&self) -> CashReconciliation {
        let total = |kind: CashMovementKind| -> Money {
            self.movements
                .iter()
                .filter(|m| m.kind == kind)
                .map(|m| m.amount)
                .sum()
        };

        CashReconciliation {
            opening_cash: self.opening_cash,
            cash_sales: total(CashMovementKind::Sale),
            cash_refunds: total(CashMovementKind::Refund).abs(),
            payouts: total(CashMovementKind::Payout).abs(),
            drops: total(CashMovementKind::Drop).abs(),
            adjustments: total(CashMovementKind::Adjustment),
            expected_cash: self.expected_cash,
            counted_cash: self.closing_cash,
            variance: self.variance,
        }
    }

    fn transition(
        &mut self,
        event: SessionEvent,
        action: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        let next = self.status.apply(event).ok_or_else(|| {
            CoreError::transition("Session", self.id.clone(), self.status, action)
        })?;
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
