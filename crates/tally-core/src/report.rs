//! # Shift Reports
//!
//! A reconciled snapshot of one session: sales, tax, tenders and cash.
//!
//! ## Report Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Session status     Kind         Number            Saved?               │
//! │  ───────────────    ──────────   ───────────────   ──────────────────   │
//! │  open / suspended   Interim      X-YYYYMMDD-NNN    no (read-only peek)  │
//! │  closed             EndOfShift   Z-YYYYMMDD-NNN    once, then reused    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every figure is derived from the session, its orders and its returns
//! alone, so the same inputs always produce the same totals.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::order::Order;
use crate::returns::Return;
use crate::session::{CashReconciliation, SalesSummary, Session, SessionStatus, SettledRefund};
use crate::types::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// X report: mid-shift, session still open.
    Interim,
    /// Z report: the sealed end-of-shift reconciliation.
    EndOfShift,
}

impl ReportKind {
    pub fn for_session(session: &Session) -> ReportKind {
        match session.status {
            SessionStatus::Closed => ReportKind::EndOfShift,
            SessionStatus::Open | SessionStatus::Suspended => ReportKind::Interim,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ReportKind::Interim => "X",
            ReportKind::EndOfShift => "Z",
        }
    }
}

/// Sequence scope for report numbers issued on `date`.
pub fn report_sequence_scope(date: NaiveDate) -> String {
    format!("report:{}", date.format("%Y%m%d"))
}

/// `Z-20261018-003`
pub fn report_number(kind: ReportKind, date: NaiveDate, sequence: i64) -> String {
    format!("{}-{}-{:03}", kind.prefix(), date.format("%Y%m%d"), sequence)
}

/// The reconciled shift snapshot. Immutable once generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShiftReport {
    pub id: String,
    pub report_number: String,
    pub kind: ReportKind,
    pub session_id: String,
    pub terminal_id: String,
    pub cashier_id: String,
    #[ts(as = "String")]
    pub period_start: DateTime<Utc>,
    #[ts(as = "String")]
    pub period_end: DateTime<Utc>,
    pub sales: SalesSummary,
    pub cash: CashReconciliation,
    pub generated_by: String,
    #[ts(as = "String")]
    pub generated_at: DateTime<Utc>,
}

impl ShiftReport {
    /// Non-zero variance, if the drawer has been counted.
    pub fn cash_variance(&self) -> Option<Money> {
        self.cash.variance.filter(|v| !v.is_zero())
    }
}

/// Builds the report for `session`.
///
/// `orders` and `returns` may hold more than the session's own entities;
/// only those listed on the session are counted, each once.
pub fn generate_report(
    session: &Session,
    orders: &[Order],
    returns: &[Return],
    report_number: String,
    generated_by: &str,
    now: DateTime<Utc>,
) -> ShiftReport {
    let sales = match &session.summary {
        Some(sealed) => sealed.clone(),
        None => {
            let own_orders: Vec<Order> = orders
                .iter()
                .filter(|o| session.order_ids.contains(&o.id))
                .cloned()
                .collect();
            let refunds: Vec<SettledRefund> = returns
                .iter()
                .filter(|r| session.return_ids.contains(&r.id))
                .filter_map(Return::settled_refund)
                .collect();
            SalesSummary::from_activity(&own_orders, &refunds)
        }
    };

    ShiftReport {
        id: new_id(),
        report_number,
        kind: ReportKind::for_session(session),
        session_id: session.id.clone(),
        terminal_id: session.terminal_id.clone(),
        cashier_id: session.cashier_id.clone(),
        period_start: session.opened_at,
        period_end: session.closed_at.unwrap_or(now),
        sales,
        cash: session.cash_reconciliation(),
        generated_by: generated_by.to_string(),
        generated_at: now,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::tests::new_order;
    use crate::returns::{prepare_return, ItemCondition, ReturnItem, ReturnRequest};
    use crate::session::{CashMovementKind, NewCashMovement};
    use crate::types::{Quantity, TenderMethod};

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    /// Session with one cash sale, one card sale, one void and a cash return.
    fn shift() -> (Session, Vec<Order>, Vec<Return>) {
        let mut session = Session::open("POS-01", "ana", Money::from_cents(10_000), now()).unwrap();

        let mut cash_sale = new_order(2, 10000); // 230.00
        let due = cash_sale.amount_due;
        cash_sale
            .add_payment(TenderMethod::Cash, due, None, now())
            .unwrap();
        session
            .record_movement(
                NewCashMovement::new(CashMovementKind::Sale, due, "ana").for_order(&cash_sale.id),
                now(),
            )
            .unwrap();
        session.attach_order(&cash_sale.id);

        let mut card_sale = new_order(1, 2000); // 23.00
        let due = card_sale.amount_due;
        let pending = card_sale
            .add_payment(TenderMethod::Card, due, None, now())
            .unwrap();
        card_sale
            .mark_payment_completed(&pending.payment.id, Some("ok"), now())
            .unwrap();
        session.attach_order(&card_sale.id);

        let mut voided = new_order(1, 999);
        voided.void(Some("scan error"), now()).unwrap();
        session.attach_order(&voided.id);

        let ret = prepare_return(
            &cash_sale,
            &[],
            ReturnRequest {
                items: vec![ReturnItem {
                    line_id: cash_sale.lines[0].id.clone(),
                    quantity: Quantity::from_units(1),
                    condition: ItemCondition::Damaged,
                }],
                reason: "cracked".to_string(),
                refund_method: TenderMethod::Cash,
                actor: "ana".to_string(),
                session_id: Some(session.id.clone()),
            },
            None,
            now(),
        )
        .unwrap();
        cash_sale.attach_return(&ret.id);
        cash_sale.mark_refunded(now()).unwrap();
        session
            .record_movement(
                NewCashMovement::new(CashMovementKind::Refund, ret.total_refund, "ana")
                    .reason("cracked")
                    .for_order(&cash_sale.id),
                now(),
            )
            .unwrap();
        session.attach_return(&ret.id);

        (session, vec![cash_sale, card_sale, voided], vec![ret])
    }

    #[test]
    fn test_interim_report_totals() {
        let (session, orders, returns) = shift();
        let report = generate_report(&session, &orders, &returns, "X-1".into(), "ana", now());

        assert_eq!(report.kind, ReportKind::Interim);
        let s = &report.sales;
        assert_eq!(s.completed_count, 1);
        assert_eq!(s.refunded_count, 1);
        assert_eq!(s.voided_count, 1);
        assert_eq!(s.return_count, 1);
        assert_eq!(s.gross_sales.cents(), 22000);
        assert_eq!(s.tax_collected.cents(), 3300);
        assert_eq!(s.refunds.cents(), 11500);
        assert_eq!(s.refunded_tax.cents(), 1500);
        assert_eq!(s.net_sales.cents(), 22000 - 10000);
        assert_eq!(s.net_tax.cents(), 3300 - 1500);

        let cash = s.tenders.iter().find(|t| t.method == TenderMethod::Cash).unwrap();
        assert_eq!((cash.count, cash.amount.cents()), (1, 23000));
        let card = s.tenders.iter().find(|t| t.method == TenderMethod::Card).unwrap();
        assert_eq!((card.count, card.amount.cents()), (1, 2300));
        assert_eq!(s.tenders.len(), TenderMethod::ALL.len());

        assert_eq!(report.cash.opening_cash.cents(), 10_000);
        assert_eq!(report.cash.cash_sales.cents(), 23_000);
        assert_eq!(report.cash.cash_refunds.cents(), 11_500);
        assert_eq!(report.cash.expected_cash.cents(), 21_500);
        assert_eq!(report.cash.variance, None);
    }

    #[test]
    fn test_end_of_shift_report_is_deterministic() {
        let (mut session, orders, returns) = shift();
        let refunds: Vec<SettledRefund> =
            returns.iter().filter_map(Return::settled_refund).collect();
        session
            .close(Money::from_cents(21_400), None, "ana", &orders, &refunds, now())
            .unwrap();

        // Input order must not matter
        let mut reversed = orders.clone();
        reversed.reverse();

        let a = generate_report(&session, &orders, &returns, "Z-1".into(), "mgr", now());
        let b = generate_report(&session, &reversed, &returns, "Z-1".into(), "mgr", now());
        assert_eq!(a.kind, ReportKind::EndOfShift);
        assert_eq!(a.sales, b.sales);
        assert_eq!(a.cash, b.cash);
        assert_eq!(Some(&a.sales), session.summary.as_ref());
        assert_eq!(a.cash_variance(), Some(Money::from_cents(-100)));
        assert_eq!(a.period_end, session.closed_at.unwrap());
    }

    #[test]
    fn test_end_of_shift_report_uses_sealed_summary() {
        let (mut session, mut orders, returns) = shift();
        let refunds: Vec<SettledRefund> =
            returns.iter().filter_map(Return::settled_refund).collect();
        session
            .close(Money::from_cents(21_500), None, "ana", &orders, &refunds, now())
            .unwrap();

        // A late return on the card sale after the drawer was counted
        let late = prepare_return(
            &orders[1],
            &[],
            ReturnRequest {
                items: vec![ReturnItem {
                    line_id: orders[1].lines[0].id.clone(),
                    quantity: Quantity::from_units(1),
                    condition: ItemCondition::Defective,
                }],
                reason: "late".to_string(),
                refund_method: TenderMethod::Card,
                actor: "ana".to_string(),
                session_id: Some(session.id.clone()),
            },
            None,
            now(),
        )
        .unwrap();
        orders[1].mark_refunded(now()).unwrap();
        let mut all_returns = returns.clone();
        all_returns.push(late);

        let report = generate_report(&session, &orders, &all_returns, "Z-1".into(), "mgr", now());
        assert_eq!(Some(&report.sales), session.summary.as_ref());
        assert_eq!(report.sales.completed_count, 1);
        assert_eq!(report.sales.return_count, 1);
    }

    #[test]
    fn test_full_taxed_return_nets_to_zero() {
        let mut session = Session::open("POS-01", "ana", Money::zero(), now()).unwrap();
        let mut sale = new_order(1, 1000); // 10.00 + 1.50 tax
        let due = sale.amount_due;
        sale.add_payment(TenderMethod::Card, due, None, now()).unwrap();
        let pending = sale.payments[0].id.clone();
        sale.mark_payment_completed(&pending, None, now()).unwrap();
        session.attach_order(&sale.id);

        let ret = prepare_return(
            &sale,
            &[],
            ReturnRequest {
                items: vec![ReturnItem {
                    line_id: sale.lines[0].id.clone(),
                    quantity: Quantity::from_units(1),
                    condition: ItemCondition::Resellable,
                }],
                reason: "changed mind".to_string(),
                refund_method: TenderMethod::Card,
                actor: "ana".to_string(),
                session_id: Some(session.id.clone()),
            },
            None,
            now(),
        )
        .unwrap();
        sale.mark_refunded(now()).unwrap();
        session.attach_return(&ret.id);

        let report = generate_report(&session, &[sale], &[ret], "X-1".into(), "ana", now());
        let s = &report.sales;
        assert_eq!(s.gross_sales.cents(), 1000);
        assert_eq!(s.refunds.cents(), 1150);
        assert_eq!(s.refunded_tax.cents(), 150);
        assert_eq!(s.net_sales, Money::zero());
        assert_eq!(s.net_tax, Money::zero());
    }

    #[test]
    fn test_report_numbering() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        assert_eq!(report_number(ReportKind::EndOfShift, date, 3), "Z-20261018-003");
        assert_eq!(report_number(ReportKind::Interim, date, 12), "X-20261018-012");
        assert_eq!(report_sequence_scope(date), "report:20261018");
    }
}
