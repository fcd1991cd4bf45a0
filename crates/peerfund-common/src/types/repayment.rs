//! RepaymentEvent - the outcome of one proportional repayment

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Money routed to one lender by a repayment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub lender_id: Uuid,

    /// The lender's total contribution to the loan
    pub share: Decimal,

    /// Amount credited to the lender
    pub amount: Decimal,
}

/// A committed repayment
///
/// The allocation amounts always sum to `amount` exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepaymentEvent {
    pub loan_id: Uuid,

    pub borrower_id: Uuid,

    pub amount: Decimal,

    /// Per-lender split in ledger order
    pub allocations: Vec<Allocation>,

    /// `loan.repaid` after this event
    pub repaid_after: Decimal,

    /// Commit timestamp (Unix milliseconds)
    pub occurred_at: i64,
}

impl RepaymentEvent {
    /// Sum of all allocations
    pub fn distributed(&self) -> Decimal {
        self.allocations.iter().map(|a| a.amount).sum()
    }

    /// Amount credited to one lender, zero when absent
    pub fn allocated_to(&self, lender_id: &Uuid) -> Decimal {
        self.allocations
            .iter()
            .filter(|a| &a.lender_id == lender_id)
            .map(|a| a.amount)
            .sum()
    }
}
