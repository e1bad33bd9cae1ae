//! # Line Pricing
//!
//! Pure per-line computation: subtotal, discount, taxable amount, tax and
//! line total. No state.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  quantity × unit_price ──► line_subtotal            (rounded)           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  discount.resolve(line_subtotal) ──► discount       (rounded, clamped)  │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  line_subtotal − discount ──► line_total_before_tax                     │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  × (exempt ? 0 : rate) ──► tax_amount               (rounded)           │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  line_total_before_tax + tax_amount ──► line_total                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each arrow that produces a stored amount rounds once, half-up, to cents.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreResult;
use crate::money::Money;
use crate::types::{Discount, Quantity, TaxRate};
use crate::validation::{validate_quantity, validate_unit_price};

// =============================================================================
// Line Item
// =============================================================================

/// A product line as keyed at the counter.
///
/// Product data (name, price) is a snapshot taken when the line is added,
/// so later catalogue edits never change a sale in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    /// Catalogue reference.
    pub product_id: String,
    /// Display name at time of adding (frozen).
    pub name: String,
    pub quantity: Quantity,
    /// Unit price at time of adding (frozen).
    pub unit_price: Money,
    pub discount: Option<Discount>,
    pub tax_exempt: bool,
}

impl LineItem {
    /// Creates a taxable, undiscounted line.
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        quantity: Quantity,
        unit_price: Money,
    ) -> Self {
        LineItem {
            product_id: product_id.into(),
            name: name.into(),
            quantity,
            unit_price,
            discount: None,
            tax_exempt: false,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn exempt(mut self) -> Self {
        self.tax_exempt = true;
        self
    }
}

// =============================================================================
// Line Pricing
// =============================================================================

/// Computed amounts for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LinePricing {
    pub line_subtotal: Money,
    pub discount_amount: Money,
    pub line_total_before_tax: Money,
    /// Rate actually applied (zero for exempt lines).
    pub effective_tax_rate: TaxRate,
    pub tax_amount: Money,
    pub line_total: Money,
}

/// Prices a single line.
///
/// ## Errors
/// - non-positive quantity, or more than the per-line maximum
/// - negative unit price
///
/// An over-large discount is clamped to the line subtotal, never rejected.
///
/// ## Example
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::pricing::{price_line, LineItem};
/// use tally_core::types::{Quantity, TaxRate};
///
/// let item = LineItem::new("p-1", "Rice 2kg", Quantity::from_units(2), Money::from_cents(10000));
/// let priced = price_line(&item, TaxRate::from_bps(1500)).unwrap();
/// assert_eq!(priced.line_subtotal.cents(), 20000);
/// assert_eq!(priced.tax_amount.cents(), 3000);
/// assert_eq!(priced.line_total.cents(), 23000);
/// ```
pub fn price_line(item: &LineItem, tax_rate: TaxRate) -> CoreResult<LinePricing> {
    validate_quantity(item.quantity)?;
    validate_unit_price(item.unit_price)?;

    let line_subtotal = item.unit_price.times_quantity(item.quantity);
    let discount_amount = item
        .discount
        .map(|d| d.resolve(line_subtotal))
        .unwrap_or_default();
    let line_total_before_tax = line_subtotal - discount_amount;

    let effective_tax_rate = if item.tax_exempt {
        TaxRate::zero()
    } else {
        tax_rate
    };
    let tax_amount = line_total_before_tax.calculate_tax(effective_tax_rate);

    Ok(LinePricing {
        line_subtotal,
        discount_amount,
        line_total_before_tax,
        effective_tax_rate,
        tax_amount,
        line_total: line_total_before_tax + tax_amount,
    })
}

// =============================================================================
// Priced Line
// =============================================================================

/// A line attached to an order: the keyed item, its id and its amounts.
///
/// Immutable once the order is created; a resumed order is rebuilt into a
/// fresh cart and re-priced on resubmission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedLine {
    pub id: String,
    pub item: LineItem,
    pub pricing: LinePricing,
}

impl PricedLine {
    /// Prices `item` under an existing line id (cart lines keep theirs).
    pub fn price(id: impl Into<String>, item: LineItem, tax_rate: TaxRate) -> CoreResult<Self> {
        let pricing = price_line(&item, tax_rate)?;
        Ok(PricedLine {
            id: id.into(),
            item,
            pricing,
        })
    }

    #[inline]
    pub fn quantity(&self) -> Quantity {
        self.item.quantity
    }

    #[inline]
    pub fn is_exempt(&self) -> bool {
        self.item.tax_exempt
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
