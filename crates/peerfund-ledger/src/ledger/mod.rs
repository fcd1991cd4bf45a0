//! Funding and repayment accounting
//!
//! - [`contributions`]: who funded a loan and with how much
//! - [`metrics`]: derived values over a loan's state
//! - [`distributor`]: proportional repayment execution
//! - [`locks`]: per-loan and per-user serialization

pub mod contributions;
pub mod distributor;
pub mod locks;
pub mod metrics;

pub use contributions::{to_sentence, ContributionLedger};
pub use distributor::{allocate, RepaymentDistributor};
pub use locks::{LockGuard, LockRegistry};
pub use metrics::{format_long_date, FundingMetrics};
