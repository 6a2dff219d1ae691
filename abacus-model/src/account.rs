use chrono::DateTime;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::AccountId;
use crate::LedgerId;

/// Hierarchy is capped at three levels: root, child, grandchild.
pub const MAX_ACCOUNT_DEPTH: i32 = 3;

/// Sibling ordering leaves gaps so an account can be slotted between two
/// existing ones without renumbering the rest.
pub const SORT_ORDER_GAP: i64 = 1000;

pub const SYSTEM_CASH_NAME: &str = "Cash";
pub const SYSTEM_EQUITY_NAME: &str = "Equity";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    Asset,
    Liability,
    Income,
    Expense,
}

impl AccountType {
    /// The side on which this account type naturally increases.
    #[must_use]
    pub fn normal_side(self) -> EntrySide {
        match self {
            AccountType::Asset | AccountType::Expense => EntrySide::Debit,
            AccountType::Liability | AccountType::Income => EntrySide::Credit,
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountType::Asset => write!(f, "ASSET"),
            AccountType::Liability => write!(f, "LIABILITY"),
            AccountType::Income => write!(f, "INCOME"),
            AccountType::Expense => write!(f, "EXPENSE"),
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ASSET" => Ok(AccountType::Asset),
            "LIABILITY" => Ok(AccountType::Liability),
            "INCOME" => Ok(AccountType::Income),
            "EXPENSE" => Ok(AccountType::Expense),
            _ => Err(format!("invalid account type: {s}")),
        }
    }
}

/// The two posting sides of a transaction: the `to` account is debited and
/// the `from` account is credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySide {
    Debit,
    Credit,
}

/// Contribution of one posting to an account's balance. An account grows on
/// its normal side and shrinks on the opposite one.
#[must_use]
pub fn balance_contribution(
    account_type: AccountType,
    side: EntrySide,
    amount: Decimal,
) -> Decimal {
    if account_type.normal_side() == side {
        amount
    } else {
        -amount
    }
}

/// A named bucket in a ledger's chart of accounts.
///
/// `balance_cache` is advisory; the authoritative balance is always derived
/// from the transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub ledger_id: LedgerId,
    pub name: String,
    pub account_type: AccountType,
    pub balance_cache: Decimal,
    pub is_system: bool,
    pub parent_id: Option<AccountId>,
    pub depth: i32,
    pub sort_order: i64,
    pub is_archived: bool,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Depth and parent linkage must agree: roots have no parent, children
    /// sit exactly one level below their parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dec(value: &str) -> Decimal {
        value.parse().expect("decimal literal")
    }

    #[test]
    fn normal_sides_follow_the_account_class() {
        assert_eq!(AccountType::Asset.normal_side(), EntrySide::Debit);
        assert_eq!(AccountType::Expense.normal_side(), EntrySide::Debit);
        assert_eq!(AccountType::Liability.normal_side(), EntrySide::Credit);
        assert_eq!(AccountType::Income.normal_side(), EntrySide::Credit);
    }

    #[test]
    fn contribution_grows_on_the_normal_side() {
        let amount = dec("50.00");
        assert_eq!(
            balance_contribution(AccountType::Asset, EntrySide::Debit, amount),
            amount
        );
        assert_eq!(
            balance_contribution(AccountType::Asset, EntrySide::Credit, amount),
            -amount
        );
        assert_eq!(
            balance_contribution(AccountType::Liability, EntrySide::Credit, amount),
            amount
        );
        assert_eq!(
            balance_contribution(AccountType::Income, EntrySide::Credit, amount),
            amount
        );
        assert_eq!(
            balance_contribution(AccountType::Income, EntrySide::Debit, amount),
            -amount
        );
    }

    #[test]
    fn account_types_round_trip_their_persisted_identifiers() {
        for (value, text) in [
            (AccountType::Asset, "ASSET"),
            (AccountType::Liability, "LIABILITY"),
            (AccountType::Income, "INCOME"),
            (AccountType::Expense, "EXPENSE"),
        ] {
            assert_eq!(value.to_string(), text);
            assert_eq!(text.parse::<AccountType>(), Ok(value));
            assert_eq!(
                serde_json::to_string(&value).expect("serialize"),
                format!("\"{text}\"")
            );
        }
    }
}
