//! In-memory storage implementation
//!
//! All tables sit behind one lock so a batch commit is atomic, and batch
//! writes are checked against stored versions for optimistic concurrency.

use async_trait::async_trait;
use parking_lot::RwLock;
use peerfund_common::{
    Contribution, Entity, LoanRequest, NotFoundError, PeerfundError, Result, User,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

use super::LoanStore;

#[derive(Debug, Default)]
struct Tables {
    loans: HashMap<Uuid, LoanRequest>,
    users: HashMap<Uuid, User>,
    /// Contributions by loan, in insertion order
    contributions: HashMap<Uuid, Vec<Contribution>>,
}

impl Tables {
    /// The incoming entity must be exactly one version ahead of the stored one
    fn check_version(&self, entity: &Entity) -> Result<()> {
        let (stored, incoming) = match entity {
            Entity::Loan(loan) => (
                self.loans
                    .get(&loan.id)
                    .map(|l| l.version)
                    .ok_or(NotFoundError::Loan(loan.id))?,
                loan.version,
            ),
            Entity::User(user) => (
                self.users
                    .get(&user.id)
                    .map(|u| u.version)
                    .ok_or(NotFoundError::User(user.id))?,
                user.version,
            ),
            Entity::Contribution(contribution) => {
                if !self.loans.contains_key(&contribution.loan_id) {
                    return Err(NotFoundError::Loan(contribution.loan_id).into());
                }
                return Ok(());
            }
        };

        if stored + 1 != incoming {
            return Err(PeerfundError::Concurrency(format!(
                "stale {} {}: stored version {}, incoming {}",
                entity.kind(),
                entity.id(),
                stored,
                incoming
            )));
        }
        Ok(())
    }

    fn apply(&mut self, entity: Entity) {
        match entity {
            Entity::Loan(loan) => {
                self.loans.insert(loan.id, loan);
            }
            Entity::User(user) => {
                self.users.insert(user.id, user);
            }
            Entity::Contribution(contribution) => {
                let rows = self.contributions.entry(contribution.loan_id).or_default();
                match rows.iter_mut().find(|c| c.id == contribution.id) {
                    Some(existing) => *existing = contribution,
                    None => rows.push(contribution),
                }
            }
        }
    }
}

/// In-process [`LoanStore`]
#[derive(Debug, Default)]
pub struct InMemoryLoanStore {
    tables: RwLock<Tables>,
    /// Fail the next write with a storage error
    fail_next_persist: AtomicBool,
}

impl InMemoryLoanStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a loan request
    pub fn insert_loan(&self, loan: LoanRequest) {
        self.tables.write().loans.insert(loan.id, loan);
    }

    /// Seed a user
    pub fn insert_user(&self, user: User) {
        self.tables.write().users.insert(user.id, user);
    }

    /// Seed a contribution without touching the loan's totals
    pub fn insert_contribution(&self, contribution: Contribution) {
        self.tables.write().apply(Entity::Contribution(contribution));
    }

    /// Make the next `persist` or `persist_batch` call fail
    pub fn fail_next_persist(&self) {
        self.fail_next_persist.store(true, Ordering::SeqCst);
    }

    pub fn loan_count(&self) -> usize {
        self.tables.read().loans.len()
    }

    fn take_injected_failure(&self) -> Result<()> {
        if self.fail_next_persist.swap(false, Ordering::SeqCst) {
            warn!("Injected persist failure");
            return Err(PeerfundError::Storage("injected persist failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LoanStore for InMemoryLoanStore {
    async fn load_loan(&self, id: &Uuid) -> Result<LoanRequest> {
        self.tables
            .read()
            .loans
            .get(id)
            .cloned()
            .ok_or_else(|| NotFoundError::Loan(*id).into())
    }

    async fn load_contributions(&self, loan_id: &Uuid) -> Result<Vec<Contribution>> {
        Ok(self
            .tables
            .read()
            .contributions
            .get(loan_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_user(&self, id: &Uuid) -> Result<User> {
        self.tables
            .read()
            .users
            .get(id)
            .cloned()
            .ok_or_else(|| NotFoundError::User(*id).into())
    }

    async fn list_loans(&self) -> Result<Vec<LoanRequest>> {
        let mut loans: Vec<LoanRequest> = self.tables.read().loans.values().cloned().collect();
        loans.sort_by_key(|loan| loan.created_at);
        Ok(loans)
    }

    async fn persist(&self, entity: Entity) -> Result<()> {
        self.take_injected_failure()?;
        self.tables.write().apply(entity);
        Ok(())
    }

    async fn delete_contribution(&self, id: &Uuid) -> Result<()> {
        let mut tables = self.tables.write();
        for rows in tables.contributions.values_mut() {
            rows.retain(|c| &c.id != id);
        }
        Ok(())
    }

    async fn persist_batch(&self, batch: Vec<Entity>) -> Result<()> {
        self.take_injected_failure()?;

        let mut tables = self.tables.write();
        for entity in &batch {
            tables.check_version(entity)?;
        }

        let size = batch.len();
        for entity in batch {
            tables.apply(entity);
        }
        debug!(size, "Committed batch");
        Ok(())
    }
}
