use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::LedgerId;
use crate::UserId;

/// A registered owner of ledgers, tokens, and channel bindings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// An isolated book of accounts belonging to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub id: LedgerId,
    pub user_id: UserId,
    pub name: String,
    pub initial_balance: Decimal,
    pub created_at: DateTime<Utc>,
}
