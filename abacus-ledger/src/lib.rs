#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The ledger, account, and transaction engines.
//!
//! Every operation runs inside one unit of work on the store: validate
//! against the working state, stage the writes, record the audit row, then
//! commit. A failure at any point drops the unit and the prior state stands.

use abacus_model::Ledger;
use abacus_model::LedgerId;
use abacus_model::UserId;
use abacus_store::State;

mod accounts;
mod balance;
mod cursor;
mod ledgers;
mod tags;
mod templates;
mod transactions;

pub use accounts::AccountEngine;
pub use accounts::AccountNode;
pub use accounts::AccountUpdate;
pub use accounts::DeletionCheck;
pub use accounts::NewAccount;
pub use balance::aggregated_balance;
pub use balance::leaf_balances;
pub use cursor::decode_cursor;
pub use cursor::encode_cursor;
pub use ledgers::ClearAccountsOutcome;
pub use ledgers::LedgerEngine;
pub use tags::DEFAULT_TAG_COLOR;
pub use tags::TagEngine;
pub use templates::NewTemplate;
pub use templates::TemplateEngine;
pub use transactions::MAX_PAGE_SIZE;
pub use transactions::NewTransaction;
pub use transactions::TransactionEngine;
pub use transactions::TransactionFilter;
pub use transactions::TransactionPage;
pub use transactions::validate_posting;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("operation not permitted on system account: {0}")]
    ForbiddenSystem(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Ownership gate every engine call passes through: a ledger another user
/// owns is indistinguishable from a missing one.
pub(crate) fn owned_ledger(
    state: &State,
    user_id: UserId,
    ledger_id: LedgerId,
) -> LedgerResult<Ledger> {
    state
        .ledgers
        .get(&ledger_id)
        .filter(|ledger| ledger.user_id == user_id)
        .cloned()
        .ok_or_else(|| LedgerError::NotFound(format!("ledger {ledger_id}")))
}
