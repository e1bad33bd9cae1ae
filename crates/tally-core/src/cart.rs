//! # Cart
//!
//! The editable cart keyed at the counter, and the aggregation that turns a
//! list of priced lines into cart-level totals.
//!
//! ## Two-Pass Discounting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Pass 1 (per line, pricing.rs)                                          │
//! │    line discount ──► line_total_before_tax                              │
//! │                                                                         │
//! │  Pass 2 (here)                                                          │
//! │    subtotal = Σ line_total_before_tax                                   │
//! │        ├── taxable base  (non-exempt lines)                             │
//! │        └── exempt base   (exempt lines)                                 │
//! │                                                                         │
//! │    order_discount = discount.resolve(subtotal)                          │
//! │    ratio          = (subtotal − order_discount) / subtotal              │
//! │                                                                         │
//! │    taxable' = taxable × ratio     exempt' = exempt × ratio              │
//! │    tax      = taxable' × rate     (recomputed, never Σ line tax)        │
//! │    total    = subtotal − order_discount + tax                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ratio is kept as the exact fraction `(subtotal − order_discount,
//! subtotal)` and applied with a single rounding per base.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing::{LineItem, PricedLine};
use crate::types::{new_id, Discount, Quantity, TaxRate};
use crate::validation::{validate_cart_size, validate_quantity};

// =============================================================================
// Cart Totals
// =============================================================================

/// Cart-level totals derived from priced lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartTotals {
    /// Σ line_total_before_tax (after line discounts, before order discount).
    pub subtotal: Money,
    /// Σ line discounts, for reporting.
    pub line_discount_total: Money,
    pub order_discount: Money,
    /// Share of the subtotal kept after the order discount, in basis points
    /// (10000 when there is no order discount). Informational only.
    pub discount_ratio_bps: u32,
    /// Taxable base after the order discount.
    pub taxable_amount: Money,
    /// Exempt base after the order discount.
    pub exempt_amount: Money,
    pub tax_amount: Money,
    pub total: Money,
    /// Σ line quantities.
    pub item_count: Quantity,
}

/// Aggregates priced lines into cart totals.
///
/// A zero subtotal keeps a ratio of 1 (nothing to discount).
pub fn aggregate(
    lines: &[PricedLine],
    order_discount: Option<Discount>,
    tax_rate: TaxRate,
) -> CartTotals {
    let subtotal: Money = lines.iter().map(|l| l.pricing.line_total_before_tax).sum();
    let line_discount_total: Money = lines.iter().map(|l| l.pricing.discount_amount).sum();
    let item_count: Quantity = lines.iter().map(PricedLine::quantity).sum();

    let (exempt_lines, taxable_lines): (Vec<&PricedLine>, Vec<&PricedLine>) =
        lines.iter().partition(|l| l.is_exempt());
    let taxable_base: Money = taxable_lines
        .iter()
        .map(|l| l.pricing.line_total_before_tax)
        .sum();
    let exempt_base: Money = exempt_lines
        .iter()
        .map(|l| l.pricing.line_total_before_tax)
        .sum();

    let order_discount = order_discount
        .map(|d| d.resolve(subtotal))
        .unwrap_or_default();
    let kept = subtotal - order_discount;

    let (taxable_amount, exempt_amount, discount_ratio_bps) = if subtotal.is_zero() {
        (taxable_base, exempt_base, 10_000)
    } else {
        (
            taxable_base.pro_rata(kept.cents(), subtotal.cents()),
            exempt_base.pro_rata(kept.cents(), subtotal.cents()),
            Money::from_cents(10_000).pro_rata(kept.cents(), subtotal.cents()).cents() as u32,
        )
    };

    let tax_amount = taxable_amount.calculate_tax(tax_rate);

    CartTotals {
        subtotal,
        line_discount_total,
        order_discount,
        discount_ratio_bps,
        taxable_amount,
        exempt_amount,
        tax_amount,
        total: kept + tax_amount,
        item_count,
    }
}

// =============================================================================
// Editable Cart
// =============================================================================

/// A line in the editable cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CartLine {
    pub id: String,
    pub item: LineItem,
}

/// The mutable cart that becomes an order.
///
/// ## Invariants
/// - Lines with the same product, price, discount and exemption are merged
/// - Every quantity is within `(0, MAX_ITEM_UNITS]`
/// - At most `MAX_CART_LINES` lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Cart {
    lines: Vec<CartLine>,
    order_discount: Option<Discount>,
    customer_id: Option<String>,
}

impl Cart {
    pub fn new() -> Self {
        Cart::default()
    }

    /// Rebuilds an editable cart from an order's lines (resume).
    pub fn from_priced(
        lines: &[PricedLine],
        order_discount: Option<Discount>,
        customer_id: Option<String>,
    ) -> Self {
        Cart {
            lines: lines
                .iter()
                .map(|l| CartLine {
                    id: l.id.clone(),
                    item: l.item.clone(),
                })
                .collect(),
            order_discount,
            customer_id,
        }
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn order_discount(&self) -> Option<Discount> {
        self.order_discount
    }

    pub fn customer_id(&self) -> Option<&str> {
        self.customer_id.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Adds a line, or increases the quantity of a matching one.
    ///
    /// Returns the id of the line that now holds the item.
    pub fn add_item(&mut self, item: LineItem) -> CoreResult<String> {
        validate_quantity(item.quantity)?;

        if let Some(line) = self.lines.iter_mut().find(|l| {
            l.item.product_id == item.product_id
                && l.item.unit_price == item.unit_price
                && l.item.discount == item.discount
                && l.item.tax_exempt == item.tax_exempt
        }) {
            let merged = line.item.quantity + item.quantity;
            validate_quantity(merged)?;
            line.item.quantity = merged;
            return Ok(line.id.clone());
        }

        validate_cart_size(self.lines.len())?;
        let id = new_id();
        self.lines.push(CartLine {
            id: id.clone(),
            item,
        });
        Ok(id)
    }

    /// Sets a line's quantity; zero removes the line.
    pub fn update_quantity(&mut self, line_id: &str, quantity: Quantity) -> CoreResult<()> {
        if quantity.is_zero() {
            return self.remove_line(line_id);
        }
        validate_quantity(quantity)?;
        self.line_mut(line_id)?.item.quantity = quantity;
        Ok(())
    }

    pub fn remove_line(&mut self, line_id: &str) -> CoreResult<()> {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        if self.lines.len() == before {
            return Err(CoreError::CartLineNotFound {
                line_id: line_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn set_line_discount(
        &mut self,
        line_id: &str,
        discount: Option<Discount>,
    ) -> CoreResult<()> {
        self.line_mut(line_id)?.item.discount = discount;
        Ok(())
    }

    pub fn set_order_discount(&mut self, discount: Option<Discount>) {
        self.order_discount = discount;
    }

    pub fn set_customer(&mut self, customer_id: Option<String>) {
        self.customer_id = customer_id;
    }

    /// Empties the cart, including discount and customer.
    pub fn clear(&mut self) {
        *self = Cart::default();
    }

    /// Prices every line and aggregates.
    pub fn price(&self, tax_rate: TaxRate) -> CoreResult<PricedCart> {
        if self.lines.is_empty() {
            return Err(CoreError::EmptyCart);
        }

        let lines = self
            .lines
            .iter()
            .map(|l| PricedLine::price(l.id.clone(), l.item.clone(), tax_rate))
            .collect::<CoreResult<Vec<_>>>()?;
        let totals = aggregate(&lines, self.order_discount, tax_rate);

        Ok(PricedCart {
            lines,
            order_discount: self.order_discount,
            tax_rate,
            totals,
        })
    }

    /// Content fingerprint used to recognise a retried create-order call.
    ///
    /// Line ids are excluded: two carts with the same items, discount and
    /// customer share a fingerprint.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Shape<'a> {
            customer_id: Option<&'a str>,
            order_discount: Option<Discount>,
            items: Vec<&'a LineItem>,
        }

        let shape = Shape {
            customer_id: self.customer_id.as_deref(),
            order_discount: self.order_discount,
            items: self.lines.iter().map(|l| &l.item).collect(),
        };
        serde_json::to_string(&shape).unwrap_or_default()
    }

    fn line_mut(&mut self, line_id: &str) -> CoreResult<&mut CartLine> {
        self.lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| CoreError::CartLineNotFound {
                line_id: line_id.to_string(),
            })
    }
}

/// A fully priced cart, ready to become an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    pub order_discount: Option<Discount>,
    pub tax_rate: TaxRate,
    pub totals: CartTotals,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MAX_CART_LINES;

    const GCT: TaxRate = TaxRate::from_bps(1500);

    fn item(product: &str, units: i64, cents: i64) -> LineItem {
        LineItem::new(
            product,
            product,
            Quantity::from_units(units),
            Money::from_cents(cents),
        )
    }

    #[test]
    fn test_order_discount_split_across_exempt_and_taxable() {
        let mut cart = Cart::new();
        cart.add_item(item("bread", 1, 10000).exempt()).unwrap();
        cart.add_item(item("soap", 1, 10000)).unwrap();
        cart.set_order_discount(Some(Discount::percent_bps(1000)));

        let priced = cart.price(GCT).unwrap();
        let t = priced.totals;
        assert_eq!(t.subtotal.cents(), 20000);
        assert_eq!(t.order_discount.cents(), 2000);
        assert_eq!(t.discount_ratio_bps, 9000);
        assert_eq!(t.taxable_amount.cents(), 9000);
        assert_eq!(t.exempt_amount.cents(), 9000);
        assert_eq!(t.tax_amount.cents(), 1350);
        assert_eq!(t.total.cents(), 19350);
        assert_eq!(t.item_count, Quantity::from_units(2));
    }

    #[test]
    fn test_no_order_discount_keeps_bases() {
        let mut cart = Cart::new();
        cart.add_item(item("a", 2, 10000)).unwrap();
        let t = cart.price(GCT).unwrap().totals;
        assert_eq!(t.subtotal.cents(), 20000);
        assert_eq!(t.discount_ratio_bps, 10_000);
        assert_eq!(t.tax_amount.cents(), 3000);
        assert_eq!(t.total.cents(), 23000);
    }

    #[test]
    fn test_subtotal_is_sum_of_lines_before_tax() {
        let mut cart = Cart::new();
        cart.add_item(item("a", 3, 333).with_discount(Discount::percent_bps(700)))
            .unwrap();
        cart.add_item(item("b", 1, 1999).exempt()).unwrap();
        cart.add_item(item("c", 7, 41)).unwrap();
        let priced = cart.price(GCT).unwrap();
        let sum: Money = priced
            .lines
            .iter()
            .map(|l| l.pricing.line_total_before_tax)
            .sum();
        assert_eq!(priced.totals.subtotal, sum);
    }

    #[test]
    fn test_zero_subtotal_cart() {
        let mut cart = Cart::new();
        cart.add_item(item("freebie", 1, 0)).unwrap();
        cart.set_order_discount(Some(Discount::amount(Money::from_cents(500))));
        let t = cart.price(GCT).unwrap().totals;
        assert_eq!(t.order_discount, Money::zero());
        assert_eq!(t.total, Money::zero());
    }

    #[test]
    fn test_merge_same_product() {
        let mut cart = Cart::new();
        let a = cart.add_item(item("a", 2, 500)).unwrap();
        let b = cart.add_item(item("a", 3, 500)).unwrap();
        assert_eq!(a, b);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.lines()[0].item.quantity, Quantity::from_units(5));

        // Different price is a separate line
        cart.add_item(item("a", 1, 450)).unwrap();
        assert_eq!(cart.lines().len(), 2);
    }

    #[test]
    fn test_merge_respects_max_quantity() {
        let mut cart = Cart::new();
        cart.add_item(item("a", 900, 100)).unwrap();
        let result = cart.add_item(item("a", 100, 100));
        assert!(matches!(result, Err(CoreError::QuantityTooLarge { .. })));
        assert_eq!(cart.lines()[0].item.quantity, Quantity::from_units(900));
    }

    #[test]
    fn test_cart_line_limit() {
        let mut cart = Cart::new();
        for i in 0..MAX_CART_LINES {
            cart.add_item(item(&format!("p{i}"), 1, 100)).unwrap();
        }
        let result = cart.add_item(item("one-more", 1, 100));
        assert!(matches!(result, Err(CoreError::CartTooLarge { .. })));
    }

    #[test]
    fn test_update_and_remove() {
        let mut cart = Cart::new();
        let id = cart.add_item(item("a", 1, 100)).unwrap();
        cart.update_quantity(&id, Quantity::from_units(4)).unwrap();
        assert_eq!(cart.lines()[0].item.quantity, Quantity::from_units(4));

        cart.update_quantity(&id, Quantity::zero()).unwrap();
        assert!(cart.is_empty());

        assert!(matches!(
            cart.remove_line("missing"),
            Err(CoreError::CartLineNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_cart_cannot_be_priced() {
        assert!(matches!(Cart::new().price(GCT), Err(CoreError::EmptyCart)));
    }

    #[test]
    fn test_fingerprint_ignores_line_ids() {
        let mut a = Cart::new();
        a.add_item(item("x", 1, 100)).unwrap();
        let mut b = Cart::new();
        b.add_item(item("x", 1, 100)).unwrap();
        assert_ne!(a.lines()[0].id, b.lines()[0].id);
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.set_order_discount(Some(Discount::percent_bps(500)));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_resume_round_trip_keeps_totals() {
        let mut cart = Cart::new();
        cart.add_item(item("a", 2, 1234)).unwrap();
        cart.add_item(item("b", 1, 999).exempt()).unwrap();
        cart.set_order_discount(Some(Discount::amount(Money::from_cents(300))));
        let priced = cart.price(GCT).unwrap();

        let rebuilt = Cart::from_priced(&priced.lines, priced.order_discount, None);
        assert_eq!(rebuilt.price(GCT).unwrap().totals, priced.totals);
    }
}
