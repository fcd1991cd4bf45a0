//! LoanRequest - A borrower's request funded by many contributors
//!
//! Key characteristics:
//! - `amount` is fixed at creation
//! - `contributed` only grows, up to `amount`
//! - `repaid` only grows, up to `contributed`
//! - Version field for optimistic concurrency and cache keys

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::money::is_positive_money;
use crate::error::{FundingError, PeerfundError, RepaymentError, Result};

/// Number of payments a weekly schedule is spread over
pub const WEEKLY_PAYMENT_DIVISOR: u32 = 12;

/// Number of payments a monthly schedule is spread over
pub const MONTHLY_PAYMENT_DIVISOR: u32 = 3;

/// How often the borrower repays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentRate {
    Weekly,
    Monthly,
}

impl RepaymentRate {
    /// Number of installments the outstanding balance is split into
    pub fn divisor(&self) -> u32 {
        match self {
            RepaymentRate::Weekly => WEEKLY_PAYMENT_DIVISOR,
            RepaymentRate::Monthly => MONTHLY_PAYMENT_DIVISOR,
        }
    }
}

impl std::fmt::Display for RepaymentRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepaymentRate::Weekly => write!(f, "weekly"),
            RepaymentRate::Monthly => write!(f, "monthly"),
        }
    }
}

/// Funding lifecycle of a loan request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Still accepting contributions
    Active,
    /// Contributions reached the requested amount
    Funded,
}

/// A loan request and its funding/repayment state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanRequest {
    pub id: Uuid,

    pub title: String,

    /// Owning user; the one whose purse is debited on repayment
    pub borrower_id: Uuid,

    /// Total requested
    pub amount: Decimal,

    /// Sum of all contributions
    pub contributed: Decimal,

    /// Cumulative amount returned to lenders
    pub repaid: Decimal,

    pub repayment_rate: RepaymentRate,

    pub requested_by_date: NaiveDate,

    pub repayment_begin_date: NaiveDate,

    pub status: LoanStatus,

    /// Version for optimistic concurrency control
    pub version: u64,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Timestamp of last modification
    pub updated_at: i64,
}

impl LoanRequest {
    /// Create a new, unfunded loan request
    pub fn new(
        title: impl Into<String>,
        borrower_id: Uuid,
        amount: Decimal,
        repayment_rate: RepaymentRate,
        requested_by_date: NaiveDate,
        repayment_begin_date: NaiveDate,
    ) -> Result<Self> {
        if !is_positive_money(amount) {
            return Err(FundingError::InvalidAmount(amount).into());
        }

        let now = chrono::Utc::now().timestamp_millis();
        Ok(Self {
            id: Uuid::now_v7(),
            title: title.into(),
            borrower_id,
            amount,
            contributed: Decimal::ZERO,
            repaid: Decimal::ZERO,
            repayment_rate,
            requested_by_date,
            repayment_begin_date,
            status: LoanStatus::Active,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Contributed but not yet repaid
    #[inline]
    pub fn outstanding(&self) -> Decimal {
        self.contributed - self.repaid
    }

    /// Whether every contributed unit has been returned
    pub fn is_fully_repaid(&self) -> bool {
        self.contributed > Decimal::ZERO && self.repaid >= self.contributed
    }

    pub fn is_funded(&self) -> bool {
        self.status == LoanStatus::Funded
    }

    /// Add a contribution, flipping to `Funded` when the amount is reached
    pub fn apply_contribution(&mut self, amount: Decimal) -> Result<()> {
        if !is_positive_money(amount) {
            return Err(FundingError::InvalidAmount(amount).into());
        }

        if self.is_funded() {
            return Err(FundingError::AlreadyFunded(self.id).into());
        }

        let remaining = self.amount - self.contributed;
        if amount > remaining {
            return Err(FundingError::Overfunded {
                requested: amount,
                remaining,
            }
            .into());
        }

        self.contributed = self
            .contributed
            .checked_add(amount)
            .ok_or_else(|| PeerfundError::overflow("apply_contribution"))?;
        if self.contributed == self.amount {
            self.status = LoanStatus::Funded;
        }
        self.touch();
        Ok(())
    }

    /// Record a repayment against the outstanding balance
    pub fn apply_repayment(&mut self, amount: Decimal) -> Result<()> {
        if !is_positive_money(amount) {
            return Err(RepaymentError::InvalidAmount(amount).into());
        }

        let outstanding = self.outstanding();
        if amount > outstanding {
            return Err(RepaymentError::Overpayment {
                requested: amount,
                outstanding,
            }
            .into());
        }

        self.repaid = self
            .repaid
            .checked_add(amount)
            .ok_or_else(|| PeerfundError::overflow("apply_repayment"))?;
        self.touch();
        Ok(())
    }

    /// Update version and timestamp
    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}
