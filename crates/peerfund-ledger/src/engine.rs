//! Lending engine facade
//!
//! Wires the store, cache, ledger, metrics, distributor and locks together
//! and exposes the operations callers use, addressed by id.

use chrono::NaiveDate;
use peerfund_common::{Contribution, LoanRequest, PeerfundError, RepaymentEvent, Result, User};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cache::{loan_key, MemoCache};
use crate::config::EngineConfig;
use crate::ledger::{
    format_long_date, ContributionLedger, FundingMetrics, LockRegistry, RepaymentDistributor,
};
use crate::store::LoanStore;

/// Funding/repayment accounting over an injected [`LoanStore`]
pub struct LendingEngine<S: LoanStore> {
    store: Arc<S>,
    cache: Arc<MemoCache>,
    ledger: Arc<ContributionLedger<S>>,
    metrics: FundingMetrics,
    distributor: RepaymentDistributor<S>,
    /// Per-loan locks; users are locked by the distributor
    locks: LockRegistry,
    config: EngineConfig,
}

impl<S: LoanStore> LendingEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        let cache = Arc::new(MemoCache::new(config.cache_max_entries));
        let ledger = Arc::new(ContributionLedger::new(
            store.clone(),
            cache.clone(),
            config.contributors_ttl(),
        ));

        info!(
            lock_timeout_ms = config.lock_timeout_ms,
            contributors_ttl_secs = config.contributors_ttl_secs,
            "Lending engine ready"
        );

        Self {
            metrics: FundingMetrics::new(cache.clone(), config.metrics_ttl()),
            distributor: RepaymentDistributor::new(
                store.clone(),
                ledger.clone(),
                config.lock_timeout(),
            ),
            locks: LockRegistry::new(config.lock_timeout()),
            store,
            cache,
            ledger,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn cache(&self) -> &MemoCache {
        &self.cache
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // Funding metrics

    pub async fn funding_remaining(&self, loan_id: &Uuid) -> Result<Decimal> {
        let loan = self.store.load_loan(loan_id).await?;
        self.metrics.funding_remaining(&loan)
    }

    pub async fn progress_percentage(&self, loan_id: &Uuid) -> Result<u8> {
        let loan = self.store.load_loan(loan_id).await?;
        self.metrics.progress_percentage(&loan)
    }

    pub async fn minimum_payment(&self, loan_id: &Uuid) -> Result<Decimal> {
        let loan = self.store.load_loan(loan_id).await?;
        self.metrics.minimum_payment(&loan)
    }

    pub async fn repayment_due_date(&self, loan_id: &Uuid) -> Result<NaiveDate> {
        let loan = self.store.load_loan(loan_id).await?;
        self.metrics.repayment_due_date(&loan)
    }

    pub async fn remaining_payments(&self, loan_id: &Uuid) -> Result<u32> {
        let loan = self.store.load_loan(loan_id).await?;
        self.metrics.remaining_payments(&loan)
    }

    /// Due date rendered as e.g. "April 24, 2024"
    pub async fn repayment_due_date_label(&self, loan_id: &Uuid) -> Result<String> {
        self.repayment_due_date(loan_id).await.map(format_long_date)
    }

    /// Requested-by date rendered as e.g. "January 15, 2024"
    pub async fn requested_by_label(&self, loan_id: &Uuid) -> Result<String> {
        let loan = self.store.load_loan(loan_id).await?;
        Ok(format_long_date(loan.requested_by_date))
    }

    // Contribution ledger

    pub async fn contributors_of(&self, loan_id: &Uuid) -> Result<Vec<User>> {
        self.ledger.contributors_of(loan_id).await
    }

    pub async fn share_of(&self, loan_id: &Uuid, user_id: &Uuid) -> Result<Decimal> {
        self.ledger.share_of(loan_id, user_id).await
    }

    pub async fn list_names(&self, loan_id: &Uuid) -> Result<String> {
        self.ledger.list_names(loan_id).await
    }

    /// Name of the loan's borrower
    pub async fn owner_name(&self, loan_id: &Uuid) -> Result<String> {
        let key = loan_key("owner", loan_id);
        self.cache
            .fetch_async(&key, None, || async {
                let loan = self.store.load_loan(loan_id).await?;
                let borrower = self.store.load_user(&loan.borrower_id).await?;
                Ok::<_, PeerfundError>(borrower.name)
            })
            .await
    }

    /// Loans that have received at least one contribution
    ///
    /// A direct query; the answer changes with every contribution, so it is
    /// not memoized.
    pub async fn loans_with_contributions(&self) -> Result<Vec<LoanRequest>> {
        Ok(self
            .store
            .list_loans()
            .await?
            .into_iter()
            .filter(|loan| loan.contributed > Decimal::ZERO)
            .collect())
    }

    // Mutations

    /// Record `user_id` funding `amount` of the loan
    #[instrument(skip(self))]
    pub async fn fund(
        &self,
        loan_id: Uuid,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<Contribution> {
        let _guard = self.locks.acquire(loan_id).await?;
        let loan = self.store.load_loan(&loan_id).await?;
        let (_, contribution) = self.ledger.record_contribution(&loan, user_id, amount).await?;
        Ok(contribution)
    }

    /// Repay `amount` of the loan from its borrower to all lenders
    ///
    /// Calls on the same loan are serialized; the loan is re-read under the
    /// lock so each call sees the previous call's result. Calls on different
    /// loans run in parallel unless they share a borrower or lender, whose
    /// balance updates are serialized per user.
    #[instrument(skip(self))]
    pub async fn pay(
        &self,
        loan_id: Uuid,
        amount: Decimal,
        borrower_id: Uuid,
    ) -> Result<RepaymentEvent> {
        let _guard = self.locks.acquire(loan_id).await?;
        self.distributor.pay(loan_id, amount, borrower_id).await
    }
}
