//! Persistable records

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{contribution::Contribution, loan_request::LoanRequest, user::User};

/// Unit of write-back handed to the persistence collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Entity {
    Loan(LoanRequest),
    User(User),
    Contribution(Contribution),
}

impl Entity {
    pub fn id(&self) -> Uuid {
        match self {
            Entity::Loan(loan) => loan.id,
            Entity::User(user) => user.id,
            Entity::Contribution(contribution) => contribution.id,
        }
    }

    /// Version carried by the entity; contributions are immutable and unversioned
    pub fn version(&self) -> Option<u64> {
        match self {
            Entity::Loan(loan) => Some(loan.version),
            Entity::User(user) => Some(user.version),
            Entity::Contribution(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Loan(_) => "loan",
            Entity::User(_) => "user",
            Entity::Contribution(_) => "contribution",
        }
    }
}

impl From<LoanRequest> for Entity {
    fn from(loan: LoanRequest) -> Self {
        Entity::Loan(loan)
    }
}

impl From<User> for Entity {
    fn from(user: User) -> Self {
        Entity::User(user)
    }
}

impl From<Contribution> for Entity {
    fn from(contribution: Contribution) -> Self {
        Entity::Contribution(contribution)
    }
}
