//! Persistence collaborator
//!
//! The engine never owns records; it loads them through [`LoanStore`] and
//! writes mutated snapshots back in one batch per operation.

pub mod memory;

pub use memory::InMemoryLoanStore;

use async_trait::async_trait;
use peerfund_common::{Contribution, Entity, LoanRequest, PeerfundError, Result, User};
use tracing::{error, warn};
use uuid::Uuid;

/// Trait for loan/user/contribution storage backends
#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Load a loan request, `NotFound` when absent
    async fn load_loan(&self, id: &Uuid) -> Result<LoanRequest>;

    /// All contributions to a loan in insertion order
    async fn load_contributions(&self, loan_id: &Uuid) -> Result<Vec<Contribution>>;

    /// Load a user, `NotFound` when absent
    async fn load_user(&self, id: &Uuid) -> Result<User>;

    /// Every stored loan request
    async fn list_loans(&self) -> Result<Vec<LoanRequest>>;

    /// Durable write-back of one entity (upsert)
    async fn persist(&self, entity: Entity) -> Result<()>;

    /// Remove a contribution; only used to undo a partially written batch
    async fn delete_contribution(&self, id: &Uuid) -> Result<()>;

    /// Write a set of entities so that either all or none remain applied
    ///
    /// The default writes one entity at a time. Before the first write each
    /// versioned entity must be exactly one version ahead of the stored copy,
    /// else nothing is written and `Concurrency` is returned. When a write
    /// fails, the entities already written are restored to the snapshots
    /// taken before the batch started and the original failure is returned.
    /// Backends with real transactions should override this.
    async fn persist_batch(&self, batch: Vec<Entity>) -> Result<()> {
        let mut priors = Vec::with_capacity(batch.len());
        for entity in &batch {
            let prior = self.snapshot(entity).await?;
            check_version(&prior, entity)?;
            priors.push(prior);
        }

        for (written, entity) in batch.into_iter().enumerate() {
            let id = entity.id();
            let kind = entity.kind();
            if let Err(err) = self.persist(entity).await {
                warn!(%id, kind, written, "Batch write failed, restoring prior state");
                for prior in priors.into_iter().take(written).rev() {
                    let restored = match prior {
                        Prior::Existing(entity) => self.persist(entity).await,
                        Prior::Absent(id) => self.delete_contribution(&id).await,
                    };
                    if let Err(restore_err) = restored {
                        error!(error = %restore_err, "Failed to restore entity after batch");
                    }
                }
                return Err(err);
            }
        }
        Ok(())
    }

    /// State of `entity` in the store before it is overwritten
    async fn snapshot(&self, entity: &Entity) -> Result<Prior> {
        Ok(match entity {
            Entity::Loan(loan) => Prior::Existing(Entity::Loan(self.load_loan(&loan.id).await?)),
            Entity::User(user) => Prior::Existing(Entity::User(self.load_user(&user.id).await?)),
            // Contributions are immutable, so any written in a batch are new
            Entity::Contribution(contribution) => Prior::Absent(contribution.id),
        })
    }
}

/// Reject a write built from a snapshot older than the stored entity
fn check_version(prior: &Prior, incoming: &Entity) -> Result<()> {
    let stored = match prior {
        Prior::Existing(stored) => stored,
        Prior::Absent(_) => return Ok(()),
    };
    match (stored.version(), incoming.version()) {
        (Some(stored_version), Some(incoming_version))
            if stored_version + 1 != incoming_version =>
        {
            Err(PeerfundError::Concurrency(format!(
                "stale {} {}: stored version {}, incoming {}",
                incoming.kind(),
                incoming.id(),
                stored_version,
                incoming_version
            )))
        }
        _ => Ok(()),
    }
}

/// Pre-batch state used to undo a partial write
#[derive(Debug, Clone)]
pub enum Prior {
    /// The entity existed with this value
    Existing(Entity),
    /// A contribution with this id did not exist yet
    Absent(Uuid),
}
