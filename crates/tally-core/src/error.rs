//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Workflow / state-transition failures           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-store errors (separate crate)                                   │
//! │  └── StoreError       - Persistence collaborator failures              │
//! │                                                                         │
//! │  tally-engine errors                                                   │
//! │  └── EngineError      - What the calling layer sees (code + message)   │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → Caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every variant maps to a stable [`ErrorCode`] so the calling layer can
//! render an exact message without string matching. Reconciliation findings
//! (cash variance, partial returns) are data, never errors.

use serde::Serialize;
use thiserror::Error;

use crate::money::Money;
use crate::types::{Quantity, TenderMethod};

// =============================================================================
// Error Codes
// =============================================================================

/// Stable machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    EmptyCart,
    CartTooLarge,
    QuantityTooLarge,
    TenderMismatch,
    CashTenderShort,
    NothingDue,
    ReasonRequired,
    ReturnQuantityExceeded,
    SessionRequired,
    InvalidTransition,
    AmountOutstanding,
    PaymentsOutstanding,
    LineNotFound,
    PaymentNotFound,
    NotFound,
    StoreUnavailable,
    StoreFailure,
    ConfigError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::EmptyCart => "EMPTY_CART",
            ErrorCode::CartTooLarge => "CART_TOO_LARGE",
            ErrorCode::QuantityTooLarge => "QUANTITY_TOO_LARGE",
            ErrorCode::TenderMismatch => "TENDER_MISMATCH",
            ErrorCode::CashTenderShort => "CASH_TENDER_SHORT",
            ErrorCode::NothingDue => "NOTHING_DUE",
            ErrorCode::ReasonRequired => "REASON_REQUIRED",
            ErrorCode::ReturnQuantityExceeded => "RETURN_QUANTITY_EXCEEDED",
            ErrorCode::SessionRequired => "SESSION_REQUIRED",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::AmountOutstanding => "AMOUNT_OUTSTANDING",
            ErrorCode::PaymentsOutstanding => "PAYMENTS_OUTSTANDING",
            ErrorCode::LineNotFound => "LINE_NOT_FOUND",
            ErrorCode::PaymentNotFound => "PAYMENT_NOT_FOUND",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::StoreUnavailable => "STORE_UNAVAILABLE",
            ErrorCode::StoreFailure => "STORE_FAILURE",
            ErrorCode::ConfigError => "CONFIG_ERROR",
        }
    }
}

/// Broad error category, used to decide how a caller reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input; nothing was mutated.
    Validation,
    /// Operation illegal for the entity's current status.
    StateTransition,
    /// Referenced entity or child does not exist.
    NotFound,
    /// Persistence or gateway failure; safe to retry.
    Collaborator,
}

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// An order cannot be created from a cart with no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// Line quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: Quantity, max: Quantity },

    /// Non-cash tenders must settle the outstanding amount exactly.
    ///
    /// ## When This Occurs
    /// ```text
    /// Order total $230.00, $30.00 already paid in cash
    ///      │
    ///      ▼
    /// add_payment(Card, $150.00)
    ///      │
    ///      ▼
    /// TenderMismatch { method: card, amount: $150.00, due: $200.00 }
    /// ```
    #[error("{method} payment of {amount} must equal the amount due ({due})")]
    TenderMismatch {
        method: TenderMethod,
        amount: Money,
        due: Money,
    },

    /// Cash handed over is less than the amount being applied.
    #[error("Cash tendered {tendered} is less than the payment amount {amount}")]
    CashTenderShort { tendered: Money, amount: Money },

    /// Payment attempted on an order with nothing left to pay.
    #[error("Order {order_id} has nothing left to pay")]
    NothingDue { order_id: String },

    /// Cash leaving the drawer must be explained.
    #[error("A reason is required for {kind} movements")]
    ReasonRequired { kind: String },

    /// Requested return quantity exceeds what is still returnable.
    #[error("Cannot return {requested} of line {line_id}: only {returnable} returnable")]
    ReturnQuantityExceeded {
        line_id: String,
        requested: Quantity,
        returnable: Quantity,
    },

    /// A cash refund needs an open drawer to come out of.
    #[error("A cash refund requires a session to record the movement against")]
    SessionRequired,

    /// Operation is illegal for the entity's current status.
    ///
    /// ## When This Occurs
    /// - Adding a payment to a voided order
    /// - Resuming an order that was never held
    /// - Closing an already-closed session
    #[error("{entity} {id} is {status}, cannot {action}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        status: String,
        action: String,
    },

    /// Completion attempted while money is still owed.
    #[error("Order {order_id} still has {due} due")]
    AmountOutstanding { order_id: String, due: Money },

    /// Voiding an order that has settled payments.
    #[error("Order {order_id} has {paid} in settled payments; remove them before voiding")]
    PaymentsOutstanding { order_id: String, paid: Money },

    #[error("Line {line_id} not found on order {order_id}")]
    LineNotFound { order_id: String, line_id: String },

    #[error("Line {line_id} not found in cart")]
    CartLineNotFound { line_id: String },

    #[error("Payment {payment_id} not found on order {order_id}")]
    PaymentNotFound { order_id: String, payment_id: String },
}

impl CoreError {
    /// Builds an [`CoreError::InvalidTransition`].
    pub fn transition(
        entity: &'static str,
        id: impl Into<String>,
        status: impl ToString,
        action: impl Into<String>,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            id: id.into(),
            status: status.to_string(),
            action: action.into(),
        }
    }

    /// Stable machine code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::Validation(_) => ErrorCode::ValidationError,
            CoreError::EmptyCart => ErrorCode::EmptyCart,
            CoreError::CartTooLarge { .. } => ErrorCode::CartTooLarge,
            CoreError::QuantityTooLarge { .. } => ErrorCode::QuantityTooLarge,
            CoreError::TenderMismatch { .. } => ErrorCode::TenderMismatch,
            CoreError::CashTenderShort { .. } => ErrorCode::CashTenderShort,
            CoreError::NothingDue { .. } => ErrorCode::NothingDue,
            CoreError::ReasonRequired { .. } => ErrorCode::ReasonRequired,
            CoreError::ReturnQuantityExceeded { .. } => ErrorCode::ReturnQuantityExceeded,
            CoreError::SessionRequired => ErrorCode::SessionRequired,
            CoreError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            CoreError::AmountOutstanding { .. } => ErrorCode::AmountOutstanding,
            CoreError::PaymentsOutstanding { .. } => ErrorCode::PaymentsOutstanding,
            CoreError::LineNotFound { .. } | CoreError::CartLineNotFound { .. } => {
                ErrorCode::LineNotFound
            }
            CoreError::PaymentNotFound { .. } => ErrorCode::PaymentNotFound,
        }
    }

    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::InvalidTransition { .. }
            | CoreError::AmountOutstanding { .. }
            | CoreError::PaymentsOutstanding { .. } => ErrorKind::StateTransition,
            CoreError::LineNotFound { .. }
            | CoreError::CartLineNotFound { .. }
            | CoreError::PaymentNotFound { .. } => ErrorKind::NotFound,
            _ => ErrorKind::Validation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs, so nothing is mutated.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Value must not be zero.
    #[error("{field} must not be zero")]
    MustNotBeZero { field: String },

    /// Value is well-formed but not accepted here.
    #[error("{field} is invalid: {message}")]
    Invalid { field: String, message: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
