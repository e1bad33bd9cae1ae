//! # Validation Module
//!
//! Input validation run before any state is touched.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Presentation / driver                                        │
//! │  ├── Format checks, immediate feedback                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: tally-core (THIS MODULE)                                     │
//! │  ├── Quantities, prices, amounts, rates, required reasons              │
//! │  └── Fails before mutation: no partial state ever escapes              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: State machines (order / payment / session / return)          │
//! │  └── Reject operations illegal for the current status                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::Quantity;
use crate::{MAX_CART_LINES, MAX_ITEM_UNITS};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_UNITS (999 units)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart: Add Line                                                         │
/// │                                                                         │
/// │  Cashier keys quantity: 5                                              │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(5) ← THIS FUNCTION                                  │
/// │       │                                                                 │
/// │       ├── qty <= 0?   → "quantity must be positive"                    │
/// │       ├── qty > 999?  → QuantityTooLarge                               │
/// │       └── OK → line is priced                                          │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: Quantity) -> CoreResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let max = Quantity::from_units(MAX_ITEM_UNITS);
    if qty > max {
        return Err(CoreError::QuantityTooLarge {
            requested: qty,
            max,
        });
    }

    Ok(())
}

/// Validates a unit price. Zero is allowed (free items).
///
/// ```rust
/// use tally_core::money::Money;
/// use tally_core::validation::validate_unit_price;
///
/// assert!(validate_unit_price(Money::from_cents(1099)).is_ok());
/// assert!(validate_unit_price(Money::zero()).is_ok());
/// assert!(validate_unit_price(Money::from_cents(-100)).is_err());
/// ```
pub fn validate_unit_price(price: Money) -> ValidationResult<()> {
    if price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit price".to_string(),
        });
    }

    Ok(())
}

/// Validates a payment amount: must be positive.
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates a cash amount that must not be negative (float, counted cash).
pub fn validate_cash_count(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points.
///
/// ## Rules
/// - Must be between 0 and 10000 (0% to 100%)
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Collection / Text Validators
// =============================================================================

/// Validates cart size before another line is added.
pub fn validate_cart_size(current_lines: usize) -> CoreResult<()> {
    if current_lines >= MAX_CART_LINES {
        return Err(CoreError::CartTooLarge {
            max: MAX_CART_LINES,
        });
    }

    Ok(())
}

/// Validates that a text field is present and not blank.
pub fn validate_required(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Returns the trimmed reason when present and non-blank.
pub fn normalize_reason(reason: Option<&str>) -> Option<String> {
    reason
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(Quantity::from_units(1)).is_ok());
        assert!(validate_quantity(Quantity::from_milli(250)).is_ok());
        assert!(validate_quantity(Quantity::from_units(999)).is_ok());

        assert!(validate_quantity(Quantity::zero()).is_err());
        assert!(validate_quantity(Quantity::from_units(-1)).is_err());
        assert!(matches!(
            validate_quantity(Quantity::from_units(1000)),
            Err(CoreError::QuantityTooLarge { .. })
        ));
    }

    #[test]
    fn test_validate_amounts() {
        assert!(validate_payment_amount(Money::from_cents(1)).is_ok());
        assert!(validate_payment_amount(Money::zero()).is_err());
        assert!(validate_cash_count("opening cash", Money::zero()).is_ok());
        assert!(validate_cash_count("opening cash", Money::from_cents(-1)).is_err());
    }

    #[test]
    fn test_validate_tax_rate_bps() {
        assert!(validate_tax_rate_bps(0).is_ok());
        assert!(validate_tax_rate_bps(1500).is_ok());
        assert!(validate_tax_rate_bps(10000).is_ok());
        assert!(validate_tax_rate_bps(10001).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(0).is_ok());
        assert!(validate_cart_size(MAX_CART_LINES).is_err());
    }

    #[test]
    fn test_required_and_reason() {
        assert!(validate_required("cashier", "ana").is_ok());
        assert!(validate_required("cashier", "   ").is_err());
        assert_eq!(normalize_reason(Some("  bank ")), Some("bank".to_string()));
        assert_eq!(normalize_reason(Some("   ")), None);
        assert_eq!(normalize_reason(None), None);
    }
}
