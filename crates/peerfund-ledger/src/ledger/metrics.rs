//! Funding metrics
//!
//! Pure functions over a loan's amount/contributed/repaid state, and a
//! memoizing wrapper that caches each under a key carrying the loan version.
//! Because every mutation bumps the version, a cached metric can never
//! describe an older state than the loan it is asked about.

use chrono::{Days, NaiveDate};
use peerfund_common::types::money::truncate_to_cents;
use peerfund_common::{LoanRequest, PeerfundError, Result, REPAYMENT_TERM_WEEKS};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{versioned_key, MemoCache};

/// Long date format, e.g. "March 01, 2024"
pub const LONG_DATE_FORMAT: &str = "%B %d, %Y";

/// Amount still to be raised
pub fn funding_remaining(loan: &LoanRequest) -> Result<Decimal> {
    loan.amount
        .checked_sub(loan.contributed)
        .ok_or_else(|| PeerfundError::overflow("funding_remaining"))
}

/// Whole percent of the requested amount already raised, truncated
pub fn progress_percentage(loan: &LoanRequest) -> Result<u8> {
    if loan.amount.is_zero() {
        return Err(PeerfundError::division_by_zero(format!(
            "progress_percentage: loan request {} has zero amount",
            loan.id
        )));
    }

    // floor((1 - remaining / amount) * 100) == trunc(contributed * 100 / amount)
    loan.contributed
        .checked_mul(Decimal::from(100))
        .and_then(|scaled| scaled.checked_div(loan.amount))
        .and_then(|ratio| ratio.trunc().to_u8())
        .ok_or_else(|| PeerfundError::overflow("progress_percentage"))
}

/// Outstanding balance spread over the rate's installment count
pub fn minimum_payment(loan: &LoanRequest) -> Result<Decimal> {
    let divisor = Decimal::from(loan.repayment_rate.divisor());
    loan.outstanding()
        .checked_div(divisor)
        .map(truncate_to_cents)
        .ok_or_else(|| PeerfundError::overflow("minimum_payment"))
}

/// Twelve weeks after repayment begins
pub fn repayment_due_date(loan: &LoanRequest) -> Result<NaiveDate> {
    loan.repayment_begin_date
        .checked_add_days(Days::new(REPAYMENT_TERM_WEEKS * 7))
        .ok_or_else(|| PeerfundError::overflow("repayment_due_date"))
}

/// Installments of `minimum_payment` left, truncated
///
/// A fully repaid loan has a zero minimum payment and yields
/// `DivisionByZero`; callers report such a loan as having no payments left.
pub fn remaining_payments(loan: &LoanRequest) -> Result<u32> {
    let installment = minimum_payment(loan)?;
    if installment.is_zero() {
        return Err(PeerfundError::division_by_zero(format!(
            "remaining_payments: minimum payment of loan request {} is zero",
            loan.id
        )));
    }

    loan.outstanding()
        .checked_div(installment)
        .and_then(|count| count.trunc().to_u32())
        .ok_or_else(|| PeerfundError::overflow("remaining_payments"))
}

/// Render a date as "%B %d, %Y"
pub fn format_long_date(date: NaiveDate) -> String {
    date.format(LONG_DATE_FORMAT).to_string()
}

/// Memoizing front for the metric functions
pub struct FundingMetrics {
    cache: Arc<MemoCache>,
    ttl: Option<Duration>,
}

impl FundingMetrics {
    pub fn new(cache: Arc<MemoCache>, ttl: Option<Duration>) -> Self {
        Self { cache, ttl }
    }

    pub fn funding_remaining(&self, loan: &LoanRequest) -> Result<Decimal> {
        self.memoized("remaining", loan, funding_remaining)
    }

    pub fn progress_percentage(&self, loan: &LoanRequest) -> Result<u8> {
        self.memoized("percent", loan, progress_percentage)
    }

    pub fn minimum_payment(&self, loan: &LoanRequest) -> Result<Decimal> {
        self.memoized("min-pay", loan, minimum_payment)
    }

    pub fn repayment_due_date(&self, loan: &LoanRequest) -> Result<NaiveDate> {
        self.memoized("due-date", loan, repayment_due_date)
    }

    pub fn remaining_payments(&self, loan: &LoanRequest) -> Result<u32> {
        self.memoized("remain-pay", loan, remaining_payments)
    }

    fn memoized<V>(
        &self,
        prefix: &str,
        loan: &LoanRequest,
        metric: fn(&LoanRequest) -> Result<V>,
    ) -> Result<V>
    where
        V: serde::Serialize + serde::de::DeserializeOwned,
    {
        let key = versioned_key(prefix, &loan.id, loan.version);
        self.cache.fetch(&key, self.ttl, || metric(loan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerfund_common::RepaymentRate;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn loan(
        amount: Decimal,
        contributed: Decimal,
        repaid: Decimal,
        rate: RepaymentRate,
    ) -> LoanRequest {
        let mut loan = LoanRequest::new(
            "Sewing machines",
            Uuid::now_v7(),
            amount,
            rate,
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap();
        loan.contributed = contributed;
        loan.repaid = repaid;
        loan
    }

    #[test]
    fn test_funding_remaining_complements_contributed() {
        let loan = loan(dec!(1000), dec!(375.25), dec!(0), RepaymentRate::Weekly);
        let remaining = funding_remaining(&loan).unwrap();
        assert_eq!(remaining, dec!(624.75));
        assert_eq!(remaining + loan.contributed, loan.amount);
    }

    #[test]
    fn test_progress_percentage_truncates() {
        let percent = |amount, contributed| {
            progress_percentage(&loan(amount, contributed, dec!(0), RepaymentRate::Weekly)).unwrap()
        };
        assert_eq!(percent(dec!(100), dec!(29)), 29);
        assert_eq!(percent(dec!(100), dec!(57)), 57);
        assert_eq!(percent(dec!(300), dec!(299.99)), 99);
        assert_eq!(percent(dec!(300), dec!(300)), 100);
        assert_eq!(percent(dec!(300), dec!(0)), 0);
    }

    #[test]
    fn test_progress_percentage_zero_amount() {
        let mut loan = loan(dec!(100), dec!(0), dec!(0), RepaymentRate::Weekly);
        loan.amount = Decimal::ZERO;
        assert!(matches!(
            progress_percentage(&loan),
            Err(PeerfundError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_minimum_payment_by_rate() {
        let weekly = loan(dec!(1000), dec!(1000), dec!(0), RepaymentRate::Weekly);
        let monthly = loan(dec!(1000), dec!(1000), dec!(100), RepaymentRate::Monthly);

        // 1000 / 12 = 83.333..
        assert_eq!(minimum_payment(&weekly).unwrap(), dec!(83.33));
        // 900 / 3
        assert_eq!(minimum_payment(&monthly).unwrap(), dec!(300));
    }

    #[test]
    fn test_due_date_crosses_month_boundaries() {
        let loan = loan(dec!(1000), dec!(0), dec!(0), RepaymentRate::Weekly);
        // Jan 31 2024 + 84 days = Apr 24 2024 (leap February)
        let due = repayment_due_date(&loan).unwrap();
        assert_eq!(due, NaiveDate::from_ymd_opt(2024, 4, 24).unwrap());
        assert_eq!(format_long_date(due), "April 24, 2024");
    }

    #[test]
    fn test_remaining_payments() {
        let weekly = loan(dec!(1000), dec!(1000), dec!(0), RepaymentRate::Weekly);
        assert_eq!(remaining_payments(&weekly).unwrap(), 12);

        let monthly = loan(dec!(900), dec!(900), dec!(300), RepaymentRate::Monthly);
        assert_eq!(remaining_payments(&monthly).unwrap(), 3);
    }

    #[test]
    fn test_remaining_payments_on_repaid_loan() {
        let loan = loan(dec!(500), dec!(500), dec!(500), RepaymentRate::Monthly);
        assert!(matches!(
            remaining_payments(&loan),
            Err(PeerfundError::DivisionByZero(_))
        ));
    }

    #[test]
    fn test_memoized_metric_is_stable_per_version() {
        let cache = Arc::new(MemoCache::new(100));
        let metrics = FundingMetrics::new(cache.clone(), None);
        let mut loan = loan(dec!(1000), dec!(400), dec!(0), RepaymentRate::Weekly);

        assert_eq!(metrics.progress_percentage(&loan).unwrap(), 40);
        assert_eq!(metrics.progress_percentage(&loan).unwrap(), 40);
        assert_eq!(cache.len(), 1);

        loan.apply_contribution(dec!(100)).unwrap();
        assert_eq!(metrics.progress_percentage(&loan).unwrap(), 50);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_memoized_error_not_cached() {
        let cache = Arc::new(MemoCache::new(100));
        let metrics = FundingMetrics::new(cache.clone(), None);
        let loan = loan(dec!(500), dec!(500), dec!(500), RepaymentRate::Weekly);

        assert!(metrics.remaining_payments(&loan).is_err());
        assert!(cache.is_empty());
    }
}
