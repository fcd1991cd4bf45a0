//! Error types for Peerfund
//!
//! Provides a unified error type and domain-specific error variants

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias using PeerfundError
pub type Result<T> = std::result::Result<T, PeerfundError>;

/// Unified error type for Peerfund operations
#[derive(Debug, Error)]
pub enum PeerfundError {
    // Lookup errors
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    // A ratio was requested with a zero denominator
    #[error("Division by zero: {0}")]
    DivisionByZero(String),

    // Per-loan serialization could not be obtained
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    // A cached computation failed
    #[error("Compute error: {0}")]
    Compute(String),

    // Funding errors
    #[error("Funding error: {0}")]
    Funding(#[from] FundingError),

    // Repayment errors
    #[error("Repayment error: {0}")]
    Repayment(#[from] RepaymentError),

    // Storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PeerfundError {
    /// Shorthand for a division-by-zero error naming the operation
    pub fn division_by_zero(operation: impl Into<String>) -> Self {
        PeerfundError::DivisionByZero(operation.into())
    }

    /// Shorthand for an arithmetic overflow inside a computation
    pub fn overflow(operation: &str) -> Self {
        PeerfundError::Compute(format!("arithmetic overflow in {}", operation))
    }
}

/// Referenced record is absent
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("loan request {0}")]
    Loan(Uuid),

    #[error("user {0}")]
    User(Uuid),
}

/// Errors recording a contribution
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FundingError {
    #[error("Contribution must be positive with at most 2 decimal places, got {0}")]
    InvalidAmount(Decimal),

    #[error("Contribution {requested} exceeds remaining funding {remaining}")]
    Overfunded {
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Loan request {0} is already funded")]
    AlreadyFunded(Uuid),
}

/// Errors validating a repayment before any balance moves
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RepaymentError {
    #[error("Repayment must be positive with at most 2 decimal places, got {0}")]
    InvalidAmount(Decimal),

    #[error("Repayment {requested} exceeds outstanding balance {outstanding}")]
    Overpayment {
        requested: Decimal,
        outstanding: Decimal,
    },

    #[error("User {user} is not the borrower of loan request {loan}")]
    NotBorrower { loan: Uuid, user: Uuid },
}

impl From<serde_json::Error> for PeerfundError {
    fn from(err: serde_json::Error) -> Self {
        PeerfundError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for PeerfundError {
    fn from(err: anyhow::Error) -> Self {
        PeerfundError::Internal(err.to_string())
    }
}
