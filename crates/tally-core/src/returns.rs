//! # Returns
//!
//! Refunds against a prior sale, bounded per line by what is still
//! returnable.
//!
//! ## Returnable Quantity
//! ```text
//! returnable(line) = ordered(line) − Σ returned(line) over non-rejected returns
//!                    floored at 0
//!
//! refund(line)     = line_total × qty / ordered(line)        (one rounding)
//!                    the units that empty a line get what is left of it
//! refund_tax(line)  = refund − line_total_before_tax × qty / ordered(line)
//! ```
//!
//! Pending returns reserve their quantities: a second return cannot claim
//! the same units while the first awaits approval. Rejecting releases them.
//!
//! ## Flow
//! ```text
//!   prepare ──► total ≤ threshold ──► Completed ──► order Refunded,
//!      │                                            cash movement if cash
//!      └──────► total > threshold ──► Pending ──approve──► Completed
//!                                        └─────reject───► Rejected
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::order::{Order, OrderStatus};
use crate::pricing::PricedLine;
use crate::session::SettledRefund;
use crate::types::{new_id, Quantity, TenderMethod};
use crate::validation::{normalize_reason, validate_required};

// =============================================================================
// Types
// =============================================================================

/// State of a returned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    Resellable,
    Damaged,
    Defective,
    Opened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    /// Awaiting approval; quantities reserved, no money moved.
    Pending,
    Completed,
    Rejected,
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Completed => "completed",
            ReturnStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One requested line of a return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnItem {
    pub line_id: String,
    pub quantity: Quantity,
    pub condition: ItemCondition,
}

/// What the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnRequest {
    pub items: Vec<ReturnItem>,
    pub reason: String,
    pub refund_method: TenderMethod,
    pub actor: String,
    /// Drawer the refund comes out of; defaults to the order's session.
    pub session_id: Option<String>,
}

/// A returned line with its computed refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReturnLine {
    pub line_id: String,
    pub product_id: String,
    pub quantity: Quantity,
    pub condition: ItemCondition,
    /// Money back for these units, tax included.
    pub refund_amount: Money,
    /// The tax part of `refund_amount`.
    #[serde(default)]
    pub refund_tax: Money,
}

/// A return raised against one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Return {
    pub id: String,
    pub order_id: String,
    pub session_id: Option<String>,
    pub lines: Vec<ReturnLine>,
    pub total_refund: Money,
    /// The tax part of `total_refund`.
    #[serde(default)]
    pub refund_tax: Money,
    pub refund_method: TenderMethod,
    pub reason: String,
    pub status: ReturnStatus,
    pub actor: String,
    pub decided_by: Option<String>,
    pub rejection_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub decided_at: Option<DateTime<Utc>>,
}

impl Return {
    /// Quantities of non-rejected returns count against returnable stock.
    #[inline]
    pub fn reserves_quantity(&self) -> bool {
        self.status != ReturnStatus::Rejected
    }

    /// Refund to aggregate into a shift, once the money has moved.
    pub fn settled_refund(&self) -> Option<SettledRefund> {
        (self.status == ReturnStatus::Completed).then(|| SettledRefund {
            return_id: self.id.clone(),
            amount: self.total_refund,
            tax: self.refund_tax,
        })
    }

    /// Refund that must leave the drawer (completed cash refunds only).
    pub fn cash_refund(&self) -> Option<Money> {
        (self.status == ReturnStatus::Completed && self.refund_method.is_cash())
            .then_some(self.total_refund)
    }

    pub fn approve(&mut self, actor: &str, now: DateTime<Utc>) -> CoreResult<()> {
        self.decide(ReturnStatus::Completed, "approve", actor, now)
    }

    pub fn reject(
        &mut self,
        actor: &str,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        self.decide(ReturnStatus::Rejected, "reject", actor, now)?;
        self.rejection_reason = normalize_reason(reason);
        Ok(())
    }

    fn decide(
        &mut self,
        to: ReturnStatus,
        action: &str,
        actor: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<()> {
        if self.status != ReturnStatus::Pending {
            return Err(CoreError::transition(
                "Return",
                self.id.clone(),
                self.status,
                action,
            ));
        }
        validate_required("actor", actor)?;
        self.status = to;
        self.decided_by = Some(actor.to_string());
        self.decided_at = Some(now);
        Ok(())
    }
}

// =============================================================================
// Operations
// =============================================================================

/// Units of `line_id` still returnable, in `[0, ordered]`.
///
/// `returns` may contain returns of other orders; they are ignored.
pub fn returnable_quantity(
    order: &Order,
    returns: &[Return],
    line_id: &str,
) -> CoreResult<Quantity> {
    let line = order.line(line_id)?;
    let returned: Quantity = returns
        .iter()
        .filter(|r| r.order_id == order.id && r.reserves_quantity())
        .flat_map(|r| r.lines.iter())
        .filter(|l| l.line_id == line_id)
        .map(|l| l.quantity)
        .sum();
    Ok(line.quantity().saturating_sub(returned))
}

impl Order {
    /// True once every unit of every line is covered by a non-rejected return.
    pub fn is_fully_returned(&self, returns: &[Return]) -> bool {
        self.lines.iter().all(|line| {
            returnable_quantity(self, returns, &line.id)
                .map(|q| q.is_zero())
                .unwrap_or(false)
        })
    }
}

/// Builds a return against `order`.
///
/// The return is `Pending` when `approval_threshold` is set and the refund
/// exceeds it, `Completed` otherwise. The caller persists it, attaches it to
/// the order and, once completed, marks the order refunded and moves cash.
///
/// ## Errors
/// - `InvalidTransition` unless the order is completed or refunded
/// - `ReasonRequired` for a blank reason
/// - `LineNotFound` / `ReturnQuantityExceeded` per requested line
/// - `SessionRequired` for a cash refund with no drawer to take it from
pub fn prepare_return(
    order: &Order,
    prior: &[Return],
    request: ReturnRequest,
    approval_threshold: Option<Money>,
    now: DateTime<Utc>,
) -> CoreResult<Return> {
    if !matches!(order.status, OrderStatus::Completed | OrderStatus::Refunded) {
        return Err(CoreError::transition(
            "Order",
            order.id.clone(),
            order.status,
            "return",
        ));
    }
    let reason =
        normalize_reason(Some(&request.reason)).ok_or_else(|| CoreError::ReasonRequired {
            kind: "return".to_string(),
        })?;
    validate_required("actor", &request.actor)?;
    if request.items.is_empty() {
        return Err(ValidationError::Required {
            field: "return items".to_string(),
        }
        .into());
    }

    // Sum repeated line ids so one request cannot overdraw a line twice.
    let mut requested: BTreeMap<&str, Quantity> = BTreeMap::new();
    for item in &request.items {
        if !item.quantity.is_positive() {
            return Err(ValidationError::MustBePositive {
                field: "return quantity".to_string(),
            }
            .into());
        }
        let entry = requested.entry(item.line_id.as_str()).or_default();
        *entry = *entry + item.quantity;
    }
    for (&line_id, &qty) in &requested {
        let returnable = returnable_quantity(order, prior, line_id)?;
        if qty > returnable {
            return Err(CoreError::ReturnQuantityExceeded {
                line_id: line_id.to_string(),
                requested: qty,
                returnable,
            });
        }
    }

    let session_id = request
        .session_id
        .clone()
        .or_else(|| order.session_id.clone());
    if request.refund_method.is_cash() && session_id.is_none() {
        return Err(CoreError::SessionRequired);
    }

    // Units and refunds already taken off each line, including earlier
    // items of this request.
    let mut taken: BTreeMap<&str, (Quantity, Money, Money)> = BTreeMap::new();
    for line in prior
        .iter()
        .filter(|r| r.order_id == order.id && r.reserves_quantity())
        .flat_map(|r| r.lines.iter())
    {
        let entry = taken.entry(line.line_id.as_str()).or_default();
        entry.0 = entry.0 + line.quantity;
        entry.1 += line.refund_amount;
        entry.2 += line.refund_amount - line.refund_tax;
    }

    let mut lines = Vec::with_capacity(request.items.len());
    for item in &request.items {
        let line = order.line(&item.line_id)?;
        let entry = taken.entry(item.line_id.as_str()).or_default();
        let (refund_amount, refund_net) = line_refund(line, item.quantity, *entry);
        entry.0 = entry.0 + item.quantity;
        entry.1 += refund_amount;
        entry.2 += refund_net;

        lines.push(ReturnLine {
            line_id: item.line_id.clone(),
            product_id: line.item.product_id.clone(),
            quantity: item.quantity,
            condition: item.condition,
            refund_amount,
            refund_tax: refund_amount - refund_net,
        });
    }
    let total_refund: Money = lines.iter().map(|l| l.refund_amount).sum();
    let refund_tax: Money = lines.iter().map(|l| l.refund_tax).sum();

    let status = match approval_threshold {
        Some(threshold) if total_refund > threshold => ReturnStatus::Pending,
        _ => ReturnStatus::Completed,
    };

    Ok(Return {
        id: new_id(),
        order_id: order.id.clone(),
        session_id,
        lines,
        total_refund,
        refund_tax,
        refund_method: request.refund_method,
        reason,
        status,
        actor: request.actor,
        decided_by: None,
        rejection_reason: None,
        created_at: now,
        decided_at: (status == ReturnStatus::Completed).then_some(now),
    })
}

/// Refund for `quantity` units of `line`, as `(with tax, before tax)`.
///
/// Units are refunded pro rata to the line's totals. The units that empty
/// the line get whatever is left of it, so piecemeal returns never refund
/// more than the line cost.
fn line_refund(
    line: &PricedLine,
    quantity: Quantity,
    (returned, refunded, refunded_net): (Quantity, Money, Money),
) -> (Money, Money) {
    let ordered = line.quantity();
    let total = line.pricing.line_total;
    let net = line.pricing.line_total_before_tax;
    let left = (total - refunded).non_negative();
    let left_net = (net - refunded_net).non_negative();

    if returned + quantity >= ordered {
        return (left, left_net.min(left));
    }
    let amount = total.pro_rata(quantity.milli(), ordered.milli()).min(left);
    let amount_net = net
        .pro_rata(quantity.milli(), ordered.milli())
        .min(left_net)
        .min(amount);
    (amount, amount_net)
}

// =============================================================================
// Unit Tests
// =============================================================================
