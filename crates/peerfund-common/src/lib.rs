//! # Peerfund Common
//!
//! Shared types and errors for the Peerfund lending engine.
//!
//! ## Core Types
//!
//! - [`LoanRequest`]: a borrower's request with funding and repayment state
//! - [`Contribution`]: one user's stake in a loan
//! - [`User`]: lender or borrower with a money purse
//! - [`RepaymentEvent`]: a committed proportional repayment
//! - [`Entity`]: unit of write-back to persistence
//!
//! Money is `rust_decimal::Decimal` at cent precision; see [`types::money`].

pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{FundingError, NotFoundError, PeerfundError, RepaymentError, Result};
pub use types::{
    contribution::Contribution,
    entity::Entity,
    loan_request::{LoanRequest, LoanStatus, RepaymentRate},
    money::MONEY_SCALE,
    repayment::{Allocation, RepaymentEvent},
    user::User,
};

/// Peerfund version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Weeks between the start of repayment and the due date
pub const REPAYMENT_TERM_WEEKS: u64 = 12;

/// TTL for cached contributor listings, in seconds
pub const CONTRIBUTORS_TTL_SECS: u64 = 3600;

/// Default wait for a per-loan lock, in milliseconds
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

/// Default bound on memoized entries
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
