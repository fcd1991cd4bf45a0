//! Repayment distribution
//!
//! Splits one repayment across a loan's lenders in proportion to their
//! contribution and commits every balance change in a single batch.
//!
//! ## Allocation
//!
//! ```text
//! exact_i  = share_i * amount / contributed
//! alloc_i  = floor(exact_i)             (in cents)
//! residue  = amount - sum(alloc_i)      (< number of lenders)
//! ```
//!
//! The residue is handed out one cent at a time to the lenders with the
//! largest division remainder, ties going to the earliest contributor, so
//! the allocations always sum to the repayment exactly.

use peerfund_common::types::money::{from_minor_units, is_positive_money, to_minor_units};
use peerfund_common::{
    Allocation, Entity, LoanRequest, PeerfundError, RepaymentError, RepaymentEvent, Result, User,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::contributions::{ensure_balanced, ContributionLedger};
use super::locks::LockRegistry;
use crate::store::LoanStore;

/// Split `amount` over `shares` whose sum is `total`
pub fn allocate(
    amount: Decimal,
    shares: &[(Uuid, Decimal)],
    total: Decimal,
) -> Result<Vec<Allocation>> {
    let amount_units = to_minor_units(amount).ok_or(RepaymentError::InvalidAmount(amount))?;
    let total_units = to_minor_units(total).ok_or_else(|| {
        PeerfundError::Internal(format!("contributed total {} is not money", total))
    })?;
    if total_units == 0 {
        return Err(PeerfundError::division_by_zero("allocate: nothing was contributed"));
    }

    // (floor in cents, remainder of the division)
    let mut parts = Vec::with_capacity(shares.len());
    for (lender_id, share) in shares {
        let share_units = to_minor_units(*share).ok_or_else(|| {
            PeerfundError::Internal(format!("share of {} is not money", lender_id))
        })?;
        let product = share_units
            .checked_mul(amount_units)
            .ok_or_else(|| PeerfundError::overflow("allocate"))?;
        parts.push((product / total_units, product % total_units));
    }

    let floored: i128 = parts.iter().map(|(units, _)| units).sum();
    let residue = amount_units - floored;
    if residue < 0 || residue as usize >= parts.len().max(1) {
        return Err(PeerfundError::Internal(format!(
            "shares do not add up to contributed total {}",
            total
        )));
    }

    let mut order: Vec<usize> = (0..parts.len()).collect();
    order.sort_by(|&a, &b| parts[b].1.cmp(&parts[a].1).then(a.cmp(&b)));
    for &index in order.iter().take(residue as usize) {
        parts[index].0 += 1;
    }

    shares
        .iter()
        .zip(parts)
        .map(|((lender_id, share), (units, _))| {
            Ok(Allocation {
                lender_id: *lender_id,
                share: *share,
                amount: from_minor_units(units)
                    .ok_or_else(|| PeerfundError::overflow("allocate"))?,
            })
        })
        .collect()
}

/// Commit attempts for one repayment when the store reports a version conflict
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Outcome of one commit attempt
enum Commit {
    Done(RepaymentEvent),
    Conflict(String),
}

/// Executes repayment events against a [`LoanStore`]
pub struct RepaymentDistributor<S: LoanStore> {
    store: Arc<S>,
    ledger: Arc<ContributionLedger<S>>,
    user_locks: LockRegistry,
}

impl<S: LoanStore> RepaymentDistributor<S> {
    pub fn new(store: Arc<S>, ledger: Arc<ContributionLedger<S>>, lock_timeout: Duration) -> Self {
        Self {
            store,
            ledger,
            user_locks: LockRegistry::new(lock_timeout),
        }
    }

    /// Repay `amount` of the loan from `borrower_id` to its lenders
    ///
    /// Every check and computation happens on snapshots before anything is
    /// written; the loan, borrower and lenders are then persisted as one
    /// batch. On any error no balance has changed. Callers hold the loan's
    /// lock; the borrower and lenders are locked here, since they may take
    /// part in repayments of other loans at the same time.
    ///
    /// A batch rejected for a version conflict is rebuilt from fresh
    /// snapshots, a bounded number of times.
    #[instrument(skip(self))]
    pub async fn pay(
        &self,
        loan_id: Uuid,
        amount: Decimal,
        borrower_id: Uuid,
    ) -> Result<RepaymentEvent> {
        let mut attempt = 1;
        loop {
            let loan = self.store.load_loan(&loan_id).await?;
            match self.try_pay(&loan, amount, borrower_id).await? {
                Commit::Done(event) => return Ok(event),
                Commit::Conflict(reason) if attempt < MAX_COMMIT_ATTEMPTS => {
                    warn!(attempt, %reason, "Repayment conflicted, retrying");
                    attempt += 1;
                }
                Commit::Conflict(reason) => return Err(PeerfundError::Concurrency(reason)),
            }
        }
    }

    async fn try_pay(
        &self,
        loan: &LoanRequest,
        amount: Decimal,
        borrower_id: Uuid,
    ) -> Result<Commit> {
        if loan.contributed.is_zero() {
            return Err(PeerfundError::division_by_zero(format!(
                "pay: loan request {} has no contributions",
                loan.id
            )));
        }
        if !is_positive_money(amount) {
            return Err(RepaymentError::InvalidAmount(amount).into());
        }
        if borrower_id != loan.borrower_id {
            return Err(RepaymentError::NotBorrower {
                loan: loan.id,
                user: borrower_id,
            }
            .into());
        }

        let mut updated_loan = loan.clone();
        updated_loan.apply_repayment(amount)?;

        let shares = self.ledger.shares_of(&loan.id).await?;
        ensure_balanced(loan, &shares)?;
        let allocations = allocate(amount, &shares, loan.contributed)?;

        let participants =
            std::iter::once(borrower_id).chain(allocations.iter().map(|a| a.lender_id));
        let _user_guards = self.user_locks.acquire_all(participants).await?;

        // Snapshots in first-touch order so the batch is deterministic
        let mut order: Vec<Uuid> = vec![borrower_id];
        let mut users: HashMap<Uuid, User> = HashMap::new();
        users.insert(borrower_id, self.store.load_user(&borrower_id).await?);

        for allocation in &allocations {
            if !users.contains_key(&allocation.lender_id) {
                let lender = self.store.load_user(&allocation.lender_id).await?;
                users.insert(lender.id, lender);
                order.push(allocation.lender_id);
            }
            apply_allocation(&mut users, allocation, borrower_id)?;
        }

        let mut batch = Vec::with_capacity(order.len() + 1);
        batch.push(Entity::Loan(updated_loan.clone()));
        for id in &order {
            if let Some(mut user) = users.remove(id) {
                user.touch();
                batch.push(Entity::User(user));
            }
        }

        match self.store.persist_batch(batch).await {
            Ok(()) => {}
            Err(PeerfundError::Concurrency(reason)) => return Ok(Commit::Conflict(reason)),
            Err(err) => {
                warn!(error = %err, %amount, "Repayment rolled back");
                return Err(err);
            }
        }
        self.ledger.invalidate(&loan.id);

        info!(
            %amount,
            lenders = allocations.len(),
            repaid = %updated_loan.repaid,
            "Distributed repayment"
        );

        Ok(Commit::Done(RepaymentEvent {
            loan_id: loan.id,
            borrower_id,
            amount,
            allocations,
            repaid_after: updated_loan.repaid,
            occurred_at: chrono::Utc::now().timestamp_millis(),
        }))
    }
}

/// Credit the lender and debit the borrower for one allocation
fn apply_allocation(
    users: &mut HashMap<Uuid, User>,
    allocation: &Allocation,
    borrower_id: Uuid,
) -> Result<()> {
    let missing = |id: Uuid| PeerfundError::Internal(format!("user {} not loaded", id));

    users
        .get_mut(&allocation.lender_id)
        .ok_or_else(|| missing(allocation.lender_id))?
        .credit(allocation.amount)?;
    users
        .get_mut(&borrower_id)
        .ok_or_else(|| missing(borrower_id))?
        .debit(allocation.amount)
}
