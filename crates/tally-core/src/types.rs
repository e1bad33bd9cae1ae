//! # Shared Value Types
//!
//! Small value types used by every component: rates, quantities, discounts
//! and tender methods.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Value Types                                     │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    TaxRate      │   │    Quantity     │   │    Discount     │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  bps (u32)      │   │  milli (i64)    │   │  Percent { bps }│       │
//! │  │  1500 = 15%     │   │  1250 = 1.250   │   │  Amount { .. }  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐                                                    │
//! │  │  TenderMethod   │   Cash settles synchronously; every other         │
//! │  │  ─────────────  │   tender waits for the capture collaborator.      │
//! │  │  Cash           │                                                    │
//! │  │  Card           │                                                    │
//! │  │  MobileWallet   │                                                    │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Entities carry a UUID v4 `id` for relations and, where people read it,
//! a business number (order number, report number).

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;
use uuid::Uuid;

use crate::money::Money;

/// Generates a new entity identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01% = 1/10000, so 0.15 is stored as 1500 and every
/// tax computation stays in integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Quantity
// =============================================================================

/// A quantity in thousandths of a unit.
///
/// Whole-unit goods use multiples of 1000; weighed goods use the remainder
/// (1.250 kg = 1250). Keeping the scale fixed lets returned quantities be
/// compared and subtracted exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Thousandths per whole unit.
    pub const MILLI_PER_UNIT: i64 = 1000;

    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * Self::MILLI_PER_UNIT)
    }

    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Subtraction floored at zero.
    pub fn saturating_sub(self, other: Quantity) -> Quantity {
        Quantity((self.0 - other.0).max(0))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

impl std::ops::Add for Quantity {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl std::iter::Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let whole = (self.0 / Self::MILLI_PER_UNIT).abs();
        let frac = (self.0 % Self::MILLI_PER_UNIT).abs();
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            write!(f, "{}{}.{:03}", sign, whole, frac)
        }
    }
}

// =============================================================================
// Discount
// =============================================================================

/// A discount on a line or on a whole order.
///
/// Percent and fixed amount are mutually exclusive by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Discount {
    /// Percentage of the base in basis points (1000 = 10%).
    Percent { bps: u32 },
    /// Fixed amount off the base.
    Amount { amount: Money },
}

impl Discount {
    pub const fn percent_bps(bps: u32) -> Self {
        Discount::Percent { bps }
    }

    pub const fn amount(amount: Money) -> Self {
        Discount::Amount { amount }
    }

    /// Resolves the discount against `base`, clamped to `[0, base]`.
    ///
    /// An over-large discount is clamped rather than rejected so a 150% or
    /// "$50 off a $20 line" entry zeroes the line instead of failing the
    /// whole sale.
    pub fn resolve(&self, base: Money) -> Money {
        let raw = match *self {
            Discount::Percent { bps } => base.percentage_of(bps),
            Discount::Amount { amount } => amount,
        };
        raw.clamp_to(Money::zero(), base.non_negative())
    }
}

// =============================================================================
// Tender Method
// =============================================================================

/// A method of payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TenderMethod {
    /// Physical cash into the drawer.
    Cash,
    /// Card on an external terminal.
    Card,
    /// Mobile wallet / QR payment.
    MobileWallet,
}

impl TenderMethod {
    /// All tenders in report order.
    pub const ALL: [TenderMethod; 3] = [
        TenderMethod::Cash,
        TenderMethod::Card,
        TenderMethod::MobileWallet,
    ];

    /// True when the tender settles synchronously at the counter.
    #[inline]
    pub const fn is_cash(&self) -> bool {
        matches!(self, TenderMethod::Cash)
    }
}

impl fmt::Display for TenderMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenderMethod::Cash => write!(f, "cash"),
            TenderMethod::Card => write!(f, "card"),
            TenderMethod::MobileWallet => write!(f, "mobile_wallet"),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
