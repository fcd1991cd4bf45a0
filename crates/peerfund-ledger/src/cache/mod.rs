//! Memoization module
//!
//! Provides the fetch-or-compute cache consumed by funding metrics and the
//! contribution ledger, plus the key conventions they share.

pub mod memo;

pub use memo::{CacheStats, MemoCache};

use uuid::Uuid;

/// Key for a value that only depends on the loan's identity
pub fn loan_key(prefix: &str, loan_id: &Uuid) -> String {
    format!("{}-{}", prefix, loan_id)
}

/// Key for a value derived from one version of a loan's state
pub fn versioned_key(prefix: &str, loan_id: &Uuid, version: u64) -> String {
    format!("{}-{}@v{}", prefix, loan_id, version)
}
