//! Contribution ledger
//!
//! Answers who funded a loan and with how much, and records new
//! contributions. Contributor order is the order of each user's first
//! contribution and is what repayments are allocated in.

use peerfund_common::{Contribution, Entity, LoanRequest, PeerfundError, Result, User};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::cache::{versioned_key, MemoCache};
use crate::store::LoanStore;

/// Contribution tracking over a [`LoanStore`]
pub struct ContributionLedger<S: LoanStore> {
    store: Arc<S>,
    cache: Arc<MemoCache>,
    contributors_ttl: Duration,
}

impl<S: LoanStore> ContributionLedger<S> {
    pub fn new(store: Arc<S>, cache: Arc<MemoCache>, contributors_ttl: Duration) -> Self {
        Self {
            store,
            cache,
            contributors_ttl,
        }
    }

    /// Distinct contributing user ids in first-contribution order
    ///
    /// Cached per loan version for the contributors TTL. A listing computed
    /// while a contribution is being recorded lands under the older version
    /// and is never served once the new version is visible.
    pub async fn contributor_ids(&self, loan_id: &Uuid) -> Result<Vec<Uuid>> {
        let loan = self.store.load_loan(loan_id).await?;

        let key = versioned_key("loan_contributors", loan_id, loan.version);
        self.cache
            .fetch_async(&key, Some(self.contributors_ttl), || async {
                let rows = self.store.load_contributions(loan_id).await?;
                Ok::<_, PeerfundError>(
                    shares_in_order(&rows)
                        .into_iter()
                        .map(|(user_id, _)| user_id)
                        .collect::<Vec<Uuid>>(),
                )
            })
            .await
    }

    /// Users holding a contribution on the loan, in first-contribution order
    #[instrument(skip(self))]
    pub async fn contributors_of(&self, loan_id: &Uuid) -> Result<Vec<User>> {
        let ids = self.contributor_ids(loan_id).await?;
        let mut users = Vec::with_capacity(ids.len());
        for id in &ids {
            users.push(self.store.load_user(id).await?);
        }
        Ok(users)
    }

    /// Total contributed by `user_id`; zero if the user never contributed
    pub async fn share_of(&self, loan_id: &Uuid, user_id: &Uuid) -> Result<Decimal> {
        self.store.load_loan(loan_id).await?;
        let rows = self.store.load_contributions(loan_id).await?;
        Ok(rows
            .iter()
            .filter(|c| &c.user_id == user_id)
            .map(|c| c.amount)
            .sum())
    }

    /// Every contributor with their total share, read fresh from the store
    pub async fn shares_of(&self, loan_id: &Uuid) -> Result<Vec<(Uuid, Decimal)>> {
        let rows = self.store.load_contributions(loan_id).await?;
        Ok(shares_in_order(&rows))
    }

    /// Contributor names joined as a sentence ("A, B, and C")
    #[instrument(skip(self))]
    pub async fn list_names(&self, loan_id: &Uuid) -> Result<String> {
        let loan = self.store.load_loan(loan_id).await?;
        let key = versioned_key("contributors", loan_id, loan.version);
        self.cache
            .fetch_async(&key, Some(self.contributors_ttl), || async {
                let names: Vec<String> = self
                    .contributors_of(loan_id)
                    .await?
                    .into_iter()
                    .map(|user| user.name)
                    .collect();
                Ok::<_, PeerfundError>(to_sentence(&names))
            })
            .await
    }

    /// Fund `loan` with `amount` from `user_id`
    ///
    /// The new contribution and the loan are written in one batch, the row
    /// first, so a reader that sees the new loan version also sees the row.
    /// Callers hold the loan's lock and pass its freshly loaded state.
    #[instrument(skip(self, loan), fields(loan_id = %loan.id))]
    pub async fn record_contribution(
        &self,
        loan: &LoanRequest,
        user_id: Uuid,
        amount: Decimal,
    ) -> Result<(LoanRequest, Contribution)> {
        self.store.load_user(&user_id).await?;

        let mut updated = loan.clone();
        updated.apply_contribution(amount)?;
        let contribution = Contribution::new(loan.id, user_id, amount);

        let persisted = self
            .store
            .persist_batch(vec![
                Entity::Contribution(contribution.clone()),
                Entity::Loan(updated.clone()),
            ])
            .await;
        self.invalidate(&loan.id);
        persisted?;

        info!(
            %user_id,
            %amount,
            contributed = %updated.contributed,
            status = ?updated.status,
            "Recorded contribution"
        );
        Ok((updated, contribution))
    }

    /// Drop every cached value derived from this loan
    pub fn invalidate(&self, loan_id: &Uuid) -> usize {
        self.cache.invalidate_matching(&loan_id.to_string())
    }
}

/// Check that the ledger agrees with the loan's `contributed` total
pub fn ensure_balanced(loan: &LoanRequest, shares: &[(Uuid, Decimal)]) -> Result<()> {
    let total: Decimal = shares.iter().map(|(_, share)| *share).sum();
    if total != loan.contributed {
        return Err(PeerfundError::Internal(format!(
            "ledger for loan request {} sums to {}, loan records {}",
            loan.id, total, loan.contributed
        )));
    }
    Ok(())
}

/// Sum contribution rows per user, keeping first-contribution order
fn shares_in_order(rows: &[Contribution]) -> Vec<(Uuid, Decimal)> {
    let mut shares: Vec<(Uuid, Decimal)> = Vec::new();
    for row in rows {
        match shares.iter_mut().find(|(user_id, _)| *user_id == row.user_id) {
            Some((_, share)) => *share += row.amount,
            None => shares.push((row.user_id, row.amount)),
        }
    }
    shares
}

/// Join names as "A", "A and B", "A, B, and C"
pub fn to_sentence(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLoanStore;
    use chrono::NaiveDate;
    use peerfund_common::{FundingError, LoanStatus, NotFoundError, RepaymentRate};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<InMemoryLoanStore>,
        ledger: ContributionLedger<InMemoryLoanStore>,
        loan: LoanRequest,
    }

    fn fixture(amount: Decimal) -> Fixture {
        let store = Arc::new(InMemoryLoanStore::new());
        let cache = Arc::new(MemoCache::new(100));
        let borrower = User::new("Borrower");
        let loan = LoanRequest::new(
            "Delivery van",
            borrower.id,
            amount,
            RepaymentRate::Monthly,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        )
        .unwrap();
        store.insert_user(borrower);
        store.insert_loan(loan.clone());
        let ledger = ContributionLedger::new(store.clone(), cache, Duration::from_secs(3600));
        Fixture { store, ledger, loan }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_to_sentence() {
        assert_eq!(to_sentence(&[]), "");
        assert_eq!(to_sentence(&names(&["Ada"])), "Ada");
        assert_eq!(to_sentence(&names(&["Ada", "Grace"])), "Ada and Grace");
        assert_eq!(
            to_sentence(&names(&["Ada", "Grace", "Linus"])),
            "Ada, Grace, and Linus"
        );
    }

    #[test]
    fn test_shares_merge_repeat_contributors() {
        let loan_id = Uuid::now_v7();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let rows = vec![
            Contribution::new(loan_id, a, dec!(100)),
            Contribution::new(loan_id, b, dec!(50)),
            Contribution::new(loan_id, a, dec!(25)),
        ];
        assert_eq!(shares_in_order(&rows), vec![(a, dec!(125)), (b, dec!(50))]);
    }

    #[tokio::test]
    async fn test_record_contribution_and_query() {
        let Fixture { store, ledger, loan } = fixture(dec!(1000));
        let ada = User::new("Ada");
        let grace = User::new("Grace");
        store.insert_user(ada.clone());
        store.insert_user(grace.clone());

        let (loan, _) = ledger.record_contribution(&loan, ada.id, dec!(600)).await.unwrap();
        let (loan, _) = ledger.record_contribution(&loan, grace.id, dec!(400)).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Funded);

        let contributors = ledger.contributors_of(&loan.id).await.unwrap();
        assert_eq!(
            contributors.iter().map(|u| u.id).collect::<Vec<_>>(),
            vec![ada.id, grace.id]
        );
        assert_eq!(ledger.share_of(&loan.id, &ada.id).await.unwrap(), dec!(600));
        assert_eq!(ledger.list_names(&loan.id).await.unwrap(), "Ada and Grace");

        let shares = ledger.shares_of(&loan.id).await.unwrap();
        let stored = store.load_loan(&loan.id).await.unwrap();
        ensure_balanced(&stored, &shares).unwrap();
    }

    #[tokio::test]
    async fn test_share_of_non_contributor_is_zero() {
        let Fixture { ledger, loan, .. } = fixture(dec!(1000));
        let share = ledger.share_of(&loan.id, &Uuid::now_v7()).await.unwrap();
        assert_eq!(share, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_contributors_of_unknown_loan() {
        let Fixture { ledger, .. } = fixture(dec!(1000));
        let result = ledger.contributors_of(&Uuid::now_v7()).await;
        assert!(matches!(
            result,
            Err(PeerfundError::NotFound(NotFoundError::Loan(_)))
        ));
    }

    #[tokio::test]
    async fn test_new_contribution_refreshes_cached_listing() {
        let Fixture { store, ledger, loan } = fixture(dec!(1000));
        let ada = User::new("Ada");
        let grace = User::new("Grace");
        store.insert_user(ada.clone());
        store.insert_user(grace.clone());

        let (loan, _) = ledger.record_contribution(&loan, ada.id, dec!(100)).await.unwrap();
        assert_eq!(ledger.list_names(&loan.id).await.unwrap(), "Ada");

        ledger.record_contribution(&loan, grace.id, dec!(100)).await.unwrap();
        assert_eq!(ledger.list_names(&loan.id).await.unwrap(), "Ada and Grace");
    }

    #[tokio::test]
    async fn test_listing_follows_loan_version_without_invalidation() {
        let Fixture { store, ledger, loan } = fixture(dec!(1000));
        let ada = User::new("Ada");
        let grace = User::new("Grace");
        store.insert_user(ada.clone());
        store.insert_user(grace.clone());

        let (loan, _) = ledger.record_contribution(&loan, ada.id, dec!(100)).await.unwrap();
        assert_eq!(ledger.contributor_ids(&loan.id).await.unwrap(), vec![ada.id]);

        // Written behind the ledger's back, leaving the cached listing in place
        let mut funded = loan.clone();
        funded.apply_contribution(dec!(50)).unwrap();
        store.insert_contribution(Contribution::new(loan.id, grace.id, dec!(50)));
        store.insert_loan(funded);

        assert_eq!(
            ledger.contributor_ids(&loan.id).await.unwrap(),
            vec![ada.id, grace.id]
        );
        assert_eq!(ledger.list_names(&loan.id).await.unwrap(), "Ada and Grace");
    }

    #[tokio::test]
    async fn test_overfunding_writes_nothing() {
        let Fixture { store, ledger, loan } = fixture(dec!(100));
        let ada = User::new("Ada");
        store.insert_user(ada.clone());

        let result = ledger.record_contribution(&loan, ada.id, dec!(100.01)).await;
        assert!(matches!(
            result,
            Err(PeerfundError::Funding(FundingError::Overfunded { .. }))
        ));
        assert!(store.load_contributions(&loan.id).await.unwrap().is_empty());
        assert_eq!(store.load_loan(&loan.id).await.unwrap().contributed, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_unknown_contributor_rejected() {
        let Fixture { ledger, loan, .. } = fixture(dec!(100));
        let result = ledger.record_contribution(&loan, Uuid::now_v7(), dec!(10)).await;
        assert!(matches!(
            result,
            Err(PeerfundError::NotFound(NotFoundError::User(_)))
        ));
    }
}
