#![deny(clippy::print_stdout, clippy::print_stderr)]

//! The import pipeline: parse → map → preview → execute.
//!
//! A preview never writes a transaction; it persists an import session in
//! PENDING plus the raw source, proposes account mappings, and flags
//! likely duplicates. Execute re-parses the retained source — the file is
//! the source of truth, not the preview — and posts everything inside one
//! unit of work, so a failure anywhere leaves the ledger exactly as it
//! was.

use thiserror::Error;

mod banks;
mod myab;
mod parser;
mod pipeline;
mod suggest;

pub use banks::BANK_RECORD_SOURCE_ACCOUNT;
pub use banks::BankCsvConfig;
pub use banks::BankRecordParser;
pub use banks::CreditCardParser;
pub use banks::STATEMENT_YEAR_PATTERN;
pub use banks::bank_config;
pub use banks::supported_banks;
pub use myab::MYAB_HEADER;
pub use myab::MyabCsvParser;
pub use myab::export_myab_csv;
pub use parser::ParsedAccountPath;
pub use parser::ParsedTransaction;
pub use parser::RowError;
pub use parser::RowErrorKind;
pub use parser::StatementParser;
pub use pipeline::AccountMapping;
pub use pipeline::DuplicateWarning;
pub use pipeline::ExecuteOutcome;
pub use pipeline::ImportConfig;
pub use pipeline::ImportEngine;
pub use pipeline::ImportPreview;
pub use suggest::CategoryEnhancer;
pub use suggest::CategorySuggester;
pub use suggest::CategorySuggestion;

pub type ImportResult<T> = Result<T, ImportError>;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("import source is no longer available")]
    ImportExpired,
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<abacus_ledger::LedgerError> for ImportError {
    fn from(err: abacus_ledger::LedgerError) -> Self {
        use abacus_ledger::LedgerError;
        match err {
            LedgerError::NotFound(message) => ImportError::NotFound(message),
            LedgerError::Validation(message) => ImportError::Validation(message),
            LedgerError::Conflict(message) => ImportError::Conflict(message),
            LedgerError::ForbiddenSystem(message) => ImportError::Validation(format!(
                "system account cannot participate in an import: {message}"
            )),
            LedgerError::Internal(message) => ImportError::Internal(message),
        }
    }
}
