//! # tally-core: Pure Transaction Logic for Tally POS
//!
//! Everything that decides a number or a state: line pricing, cart
//! aggregation, the order and payment state machines, the cash drawer,
//! returns and shift reports. No I/O, no clocks (callers pass `now`).
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Presentation / driver (out of tree)                   │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      tally-engine: PosEngine, per-entity locks, config          │   │
//! │  └──────────────┬──────────────────────────────┬───────────────────┘   │
//! │                 │                              │                        │
//! │  ┌──────────────▼──────────────┐   ┌───────────▼───────────────────┐   │
//! │  │  ★ tally-core (THIS CRATE) ★│   │  tally-store: Store trait,    │   │
//! │  │  pricing ─► cart ─► order   │   │  memory + SQLite              │   │
//! │  │  payment ─► session         │   └───────────────────────────────┘   │
//! │  │  returns ─► report          │                                        │
//! │  └─────────────────────────────┘                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - `Money` in cents and the single rounding primitive
//! - [`types`] - Tax rates, quantities, discounts, tender methods
//! - [`pricing`] - Per-line pricing
//! - [`cart`] - Editable cart and cart-level aggregation
//! - [`order`] - Order entity and lifecycle
//! - [`payment`] - Payment ledger on an order
//! - [`session`] - Cash drawer sessions
//! - [`returns`] - Returnable quantities and refunds
//! - [`report`] - Shift (X / Z) reports
//! - [`error`] / [`validation`] - Error taxonomy and input rules
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::{Cart, LineItem, Money, Quantity, TaxRate};
//!
//! let mut cart = Cart::new();
//! let rice = LineItem::new("rice", "Rice 2kg", Quantity::from_units(2), Money::from_cents(10000));
//! cart.add_item(rice).unwrap();
//!
//! let priced = cart.price(TaxRate::from_bps(1500)).unwrap();
//! assert_eq!(priced.totals.total.cents(), 23000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod report;
pub mod returns;
pub mod session;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{aggregate, Cart, CartLine, CartTotals, PricedCart};
pub use error::{CoreError, CoreResult, ErrorCode, ErrorKind, ValidationError};
pub use money::{round_money, Money};
pub use order::{Order, OrderEvent, OrderStatus};
pub use payment::{Payment, PaymentOutcome, PaymentStatus};
pub use pricing::{price_line, LineItem, LinePricing, PricedLine};
pub use report::{generate_report, ReportKind, ShiftReport};
pub use returns::{
    prepare_return, returnable_quantity, ItemCondition, Return, ReturnItem, ReturnLine,
    ReturnRequest, ReturnStatus,
};
pub use session::{
    CashMovement, CashMovementKind, CashReconciliation, NewCashMovement, SalesSummary, Session,
    SessionStatus, SettledRefund, TenderTotal,
};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Customer reference used when the cashier does not pick one.
pub const WALK_IN_CUSTOMER_ID: &str = "walk-in";

/// Maximum lines in a single cart.
///
/// ## Business Reason
/// Prevents runaway carts and keeps orders a reviewable size.
pub const MAX_CART_LINES: usize = 100;

/// Maximum units on one line.
///
/// ## Business Reason
/// Catches keying slips (1000 typed for 10).
pub const MAX_ITEM_UNITS: i64 = 999;
