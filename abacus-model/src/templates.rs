use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;

use crate::AccountId;
use crate::InstallmentPlanId;
use crate::LedgerId;
use crate::RecurringTemplateId;
use crate::TagId;
use crate::TemplateId;
use crate::TransactionType;

/// A reusable preset applied with a single click; applying one posts a
/// transaction with the stored defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionTemplate {
    pub id: TemplateId,
    pub ledger_id: LedgerId,
    pub name: String,
    pub transaction_type: TransactionType,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub description: String,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

/// A schedule that generates one transaction per period once approved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTemplate {
    pub id: RecurringTemplateId,
    pub ledger_id: LedgerId,
    pub name: String,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_generated_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A purchase split into monthly installments; creation expands the plan
/// into its full set of dated transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub id: InstallmentPlanId,
    pub ledger_id: LedgerId,
    pub name: String,
    pub total_amount: Decimal,
    pub installment_count: i32,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}
