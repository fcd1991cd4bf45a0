//! Contribution - one user's stake in funding one loan

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable record of a user funding a loan request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: Uuid,

    pub loan_id: Uuid,

    /// Contributing user, referenced by id only
    pub user_id: Uuid,

    pub amount: Decimal,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Contribution {
    pub fn new(loan_id: Uuid, user_id: Uuid, amount: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(),
            loan_id,
            user_id,
            amount,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ids_are_time_based() {
        let contribution = Contribution::new(Uuid::now_v7(), Uuid::now_v7(), dec!(10));
        assert_eq!(contribution.id.get_version_num(), 7);
        assert_eq!(contribution.amount, dec!(10));
    }
}
