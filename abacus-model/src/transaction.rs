use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::AccountId;
use crate::AccountType;
use crate::Channel;
use crate::InstallmentPlanId;
use crate::LedgerId;
use crate::RecurringTemplateId;
use crate::TagId;
use crate::TransactionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Expense,
    Income,
    Transfer,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::Expense => write!(f, "EXPENSE"),
            TransactionType::Income => write!(f, "INCOME"),
            TransactionType::Transfer => write!(f, "TRANSFER"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EXPENSE" => Ok(TransactionType::Expense),
            "INCOME" => Ok(TransactionType::Income),
            "TRANSFER" => Ok(TransactionType::Transfer),
            _ => Err(format!("invalid transaction type: {s}")),
        }
    }
}

/// The `(from.type, to.type)` pairs a transaction type accepts.
///
/// | type     | from                | to                  |
/// |----------|---------------------|---------------------|
/// | EXPENSE  | ASSET or LIABILITY  | EXPENSE             |
/// | INCOME   | INCOME              | ASSET or LIABILITY  |
/// | TRANSFER | ASSET or LIABILITY  | ASSET or LIABILITY  |
#[must_use]
pub fn transaction_type_matches(
    transaction_type: TransactionType,
    from_type: AccountType,
    to_type: AccountType,
) -> bool {
    let holds_funds = |account_type: AccountType| {
        matches!(account_type, AccountType::Asset | AccountType::Liability)
    };
    match transaction_type {
        TransactionType::Expense => holds_funds(from_type) && to_type == AccountType::Expense,
        TransactionType::Income => from_type == AccountType::Income && holds_funds(to_type),
        TransactionType::Transfer => holds_funds(from_type) && holds_funds(to_type),
    }
}

/// A single financial event affecting exactly two accounts.
///
/// The amount is always positive; direction is encoded by the from/to pair,
/// never by sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub ledger_id: LedgerId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub transaction_type: TransactionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_expression: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_template_id: Option<RecurringTemplateId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_plan_id: Option<InstallmentPlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_number: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_channel: Option<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tag_ids: Vec<TagId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expense_pairs() {
        assert!(transaction_type_matches(
            TransactionType::Expense,
            AccountType::Asset,
            AccountType::Expense
        ));
        assert!(transaction_type_matches(
            TransactionType::Expense,
            AccountType::Liability,
            AccountType::Expense
        ));
        assert!(!transaction_type_matches(
            TransactionType::Expense,
            AccountType::Income,
            AccountType::Expense
        ));
        assert!(!transaction_type_matches(
            TransactionType::Expense,
            AccountType::Asset,
            AccountType::Asset
        ));
    }

    #[test]
    fn income_pairs() {
        assert!(transaction_type_matches(
            TransactionType::Income,
            AccountType::Income,
            AccountType::Asset
        ));
        assert!(transaction_type_matches(
            TransactionType::Income,
            AccountType::Income,
            AccountType::Liability
        ));
        assert!(!transaction_type_matches(
            TransactionType::Income,
            AccountType::Asset,
            AccountType::Income
        ));
    }

    #[test]
    fn transfer_pairs() {
        assert!(transaction_type_matches(
            TransactionType::Transfer,
            AccountType::Asset,
            AccountType::Liability
        ));
        assert!(transaction_type_matches(
            TransactionType::Transfer,
            AccountType::Liability,
            AccountType::Asset
        ));
        assert!(!transaction_type_matches(
            TransactionType::Transfer,
            AccountType::Expense,
            AccountType::Asset
        ));
        assert!(!transaction_type_matches(
            TransactionType::Transfer,
            AccountType::Asset,
            AccountType::Income
        ));
    }
}
