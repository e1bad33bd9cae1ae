//! # Money Module
//!
//! Provides the `Money` type and the one rounding primitive every monetary
//! value in the engine passes through.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In binary floating point:                                              │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  Over a shift of a few thousand lines the drift shows up as a          │
//! │  phantom cash variance at close.                                        │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents + One Rounding Primitive                   │
//! │    every stored value = round_money(numerator, denominator)            │
//! │    (exact i128 rational, rounded half-up once per step)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::money::Money;
//! use tally_core::types::TaxRate;
//!
//! let base = Money::from_cents(18000);                   // $180.00
//! let tax = base.calculate_tax(TaxRate::from_bps(1500)); // 15%
//! assert_eq!(tax.cents(), 2700);                         // $27.00
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::{Quantity, TaxRate};

/// Basis points in 100%.
pub const BPS_SCALE: i128 = 10_000;

// =============================================================================
// Rounding Primitive
// =============================================================================

/// Divides a rational number of cents and rounds half-up (away from zero).
///
/// This is the only place cents are rounded. Every calculation that yields a
/// storable amount builds its exact numerator/denominator in `i128` and calls
/// this once, which reproduces per-step rounding exactly.
///
/// ```text
///   round_money(2_825, 100)  →  28.25 →  28
///   round_money(2_850, 100)  →  28.50 →  29
///   round_money(-2_850, 100) → -28.50 → -29
/// ```
///
/// A zero denominator yields zero.
pub fn round_money(numerator: i128, denominator: i128) -> Money {
    if denominator == 0 {
        return Money::zero();
    }

    let (num, den) = if denominator < 0 {
        (-numerator, -denominator)
    } else {
        (numerator, denominator)
    };

    let magnitude = (num.abs() * 2 + den) / (den * 2);
    let cents = if num < 0 { -magnitude } else { magnitude };
    Money::from_cents(cents as i64)
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// Signed so that refunds, payouts and drawer adjustments can be expressed
/// directly as negative drawer effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(5_000, 0).cents(), 500_000);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    ///
    /// ## Note
    /// For negative amounts only the major unit carries the sign.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps the value into `[min, max]`.
    pub fn clamp_to(self, min: Money, max: Money) -> Money {
        if self < min {
            min
        } else if self > max {
            max
        } else {
            self
        }
    }

    /// Floors the value at zero.
    #[inline]
    pub fn non_negative(self) -> Money {
        self.max(Money::zero())
    }

    /// Calculates tax at the given rate, rounded half-up.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::TaxRate;
    ///
    /// let base = Money::from_cents(1000);          // $10.00
    /// let tax = base.calculate_tax(TaxRate::from_bps(825));
    /// assert_eq!(tax.cents(), 83);                 // $0.825 → $0.83
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        round_money(self.0 as i128 * rate.bps() as i128, BPS_SCALE)
    }

    /// Returns `bps` basis points of this amount, rounded half-up.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(20000);
    /// assert_eq!(subtotal.percentage_of(1000).cents(), 2000); // 10%
    /// ```
    pub fn percentage_of(&self, bps: u32) -> Money {
        round_money(self.0 as i128 * bps as i128, BPS_SCALE)
    }

    /// Extends a unit price over a (possibly fractional) quantity.
    ///
    /// ```rust
    /// use tally_core::money::Money;
    /// use tally_core::types::Quantity;
    ///
    /// let per_kg = Money::from_cents(399);
    /// let qty = Quantity::from_milli(1_250); // 1.250 kg
    /// assert_eq!(per_kg.times_quantity(qty).cents(), 499); // 4.9875 → 4.99
    /// ```
    pub fn times_quantity(&self, qty: Quantity) -> Money {
        round_money(
            self.0 as i128 * qty.milli() as i128,
            Quantity::MILLI_PER_UNIT as i128,
        )
    }

    /// Scales this amount by `numerator / denominator`, rounded half-up.
    ///
    /// Used for proportional allocations (order discount across bases,
    /// per-unit refunds) so the ratio never has to be materialised.
    pub fn pro_rata(&self, numerator: i64, denominator: i64) -> Money {
        round_money(self.0 as i128 * numerator as i128, denominator as i128)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-grade rendering; localisation belongs to the presentation layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}${}.{:02}",
            sign,
            self.dollars().abs(),
            self.cents_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
