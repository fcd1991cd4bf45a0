//! # Peerfund Ledger
//!
//! Funding and repayment accounting for peer-funded loans.
//!
//! ## Repayment Rule
//!
//! ```text
//! lender_i receives  amount * share_i / contributed
//! ```
//!
//! computed in whole cents with the rounding residue assigned by largest
//! remainder, so lenders always receive exactly what the borrower pays.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                  LendingEngine                    │
//! │   ┌──────────────┐ ┌────────────┐ ┌───────────┐   │
//! │   │ Repayment    │ │ Funding    │ │ Loan      │   │
//! │   │ Distributor  │ │ Metrics    │ │ Locks     │   │
//! │   └──────┬───────┘ └─────┬──────┘ └───────────┘   │
//! │          │               │                        │
//! │   ┌──────┴───────┐ ┌─────┴──────┐                 │
//! │   │ Contribution │─│ MemoCache  │                 │
//! │   │ Ledger       │ │            │                 │
//! │   └──────┬───────┘ └────────────┘                 │
//! │          │                                        │
//! │   ┌──────┴────────────────────────────────────┐   │
//! │   │          LoanStore (injected)             │   │
//! │   └───────────────────────────────────────────┘   │
//! └───────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod store;

pub use cache::{CacheStats, MemoCache};
pub use config::EngineConfig;
pub use engine::LendingEngine;
pub use ledger::{
    allocate, format_long_date, to_sentence, ContributionLedger, FundingMetrics, LockRegistry,
    RepaymentDistributor,
};
pub use store::{InMemoryLoanStore, LoanStore};
