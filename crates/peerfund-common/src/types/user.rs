//! User - a lender or borrower with a money purse
//!
//! The purse is the only field the engine mutates. A borrower's purse may go
//! negative; repayment is not gated on balance.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PeerfundError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,

    pub name: String,

    /// Spendable money balance
    pub purse: Decimal,

    /// Version for optimistic concurrency control
    pub version: u64,

    /// Timestamp of last modification
    pub updated_at: i64,
}

impl User {
    /// Create a user with an empty purse
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            purse: Decimal::ZERO,
            version: 0,
            updated_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a user with an initial purse
    pub fn with_purse(name: impl Into<String>, purse: Decimal) -> Self {
        let mut user = Self::new(name);
        user.purse = purse;
        user
    }

    /// Add money to the purse
    ///
    /// Does not bump the version; callers mark the snapshot once with
    /// [`User::touch`] after all mutations of one operation.
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(PeerfundError::Internal(format!(
                "negative credit {} to user {}",
                amount, self.id
            )));
        }

        self.purse = self
            .purse
            .checked_add(amount)
            .ok_or_else(|| PeerfundError::overflow("purse credit"))?;
        Ok(())
    }

    /// Remove money from the purse
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(PeerfundError::Internal(format!(
                "negative debit {} from user {}",
                amount, self.id
            )));
        }

        self.purse = self
            .purse
            .checked_sub(amount)
            .ok_or_else(|| PeerfundError::overflow("purse debit"))?;
        Ok(())
    }

    /// Update version and timestamp
    pub fn touch(&mut self) {
        self.version += 1;
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "User({}, purse={})", self.name, self.purse)
    }
}
