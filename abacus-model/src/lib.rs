#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Domain model for the accounting core.
//!
//! Entities are plain data: the store keeps them in tables joined by id and
//! the engines enforce the invariants. The pure rules that every engine
//! shares live here — the transaction type matrix, the normal-side
//! contribution table, and the money conventions.

use uuid::Uuid;

mod account;
mod audit;
mod auth;
mod email;
mod import;
mod ledger;
mod money;
mod templates;
mod transaction;

pub use account::Account;
pub use account::AccountType;
pub use account::EntrySide;
pub use account::MAX_ACCOUNT_DEPTH;
pub use account::SORT_ORDER_GAP;
pub use account::SYSTEM_CASH_NAME;
pub use account::SYSTEM_EQUITY_NAME;
pub use account::balance_contribution;
pub use audit::AuditAction;
pub use audit::AuditLog;
pub use auth::ApiToken;
pub use auth::Channel;
pub use auth::ChannelBinding;
pub use email::ConnectionStatus;
pub use email::EmailConnection;
pub use email::ScanFrequency;
pub use import::ImportSession;
pub use import::ImportStatus;
pub use import::ImportType;
pub use ledger::Ledger;
pub use ledger::User;
pub use money::MONEY_SCALE;
pub use money::is_valid_amount;
pub use money::round_money;
pub use templates::Frequency;
pub use templates::InstallmentPlan;
pub use templates::RecurringTemplate;
pub use templates::Tag;
pub use templates::TransactionTemplate;
pub use transaction::Transaction;
pub use transaction::TransactionType;
pub use transaction::transaction_type_matches;

pub type UserId = Uuid;
pub type LedgerId = Uuid;
pub type AccountId = Uuid;
pub type TransactionId = Uuid;
pub type TemplateId = Uuid;
pub type RecurringTemplateId = Uuid;
pub type InstallmentPlanId = Uuid;
pub type TagId = Uuid;
pub type AuditLogId = Uuid;
pub type ImportSessionId = Uuid;
pub type ApiTokenId = Uuid;
pub type ChannelBindingId = Uuid;
pub type EmailConnectionId = Uuid;
