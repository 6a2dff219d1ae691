#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Background scheduling: recurring transaction templates, installment
//! plan expansion, and the periodic email-statement scans.
//!
//! The dispatcher itself is deliberately thin — `tick(now)` is the whole
//! runtime contract, and the spawned loop merely feeds it the wall clock.
//! Everything date-related is pure and testable without sleeping.

use thiserror::Error;

mod email;
mod installments;
mod recurring;
mod scan;

pub use email::EmailConnectionEngine;
pub use installments::InstallmentEngine;
pub use installments::NewInstallmentPlan;
pub use installments::installment_amounts;
pub use recurring::DueTemplate;
pub use recurring::NewRecurringTemplate;
pub use recurring::RecurringEngine;
pub use recurring::advance_date;
pub use recurring::next_due_date;
pub use scan::EmailScanRunner;
pub use scan::MISFIRE_GRACE_SECONDS;
pub use scan::NullScanRunner;
pub use scan::ScanReport;
pub use scan::ScanScheduler;
pub use scan::TickEvent;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<abacus_ledger::LedgerError> for SchedulerError {
    fn from(err: abacus_ledger::LedgerError) -> Self {
        use abacus_ledger::LedgerError;
        match err {
            LedgerError::NotFound(message) => SchedulerError::NotFound(message),
            LedgerError::Validation(message) | LedgerError::Conflict(message) => {
                SchedulerError::Validation(message)
            }
            LedgerError::ForbiddenSystem(message) => SchedulerError::Validation(format!(
                "system account not usable here: {message}"
            )),
            LedgerError::Internal(message) => SchedulerError::Internal(message),
        }
    }
}
