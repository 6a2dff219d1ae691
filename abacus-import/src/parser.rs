use abacus_model::AccountType;
use abacus_model::TransactionType;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::suggest::CategorySuggestion;

/// A hierarchical account reference parsed from an input file.
///
/// The typed form is `<prefix>-<seg>.<seg>.<seg>` where the prefix is one
/// of `A` / `L` / `I` / `E`. Paths deeper than three levels fold their
/// tail into the leaf name so the chart's depth cap is never violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAccountPath {
    pub account_type: AccountType,
    pub segments: Vec<String>,
    pub raw: String,
}

impl ParsedAccountPath {
    #[must_use]
    pub fn new(account_type: AccountType, segments: Vec<String>, raw: &str) -> Self {
        Self {
            account_type,
            segments: fold_to_depth(segments),
            raw: raw.to_string(),
        }
    }

    /// A reference whose concrete account is chosen later — credit-card
    /// expense categories resolved by the suggester, for example.
    #[must_use]
    pub fn unresolved(account_type: AccountType) -> Self {
        Self {
            account_type,
            segments: Vec::new(),
            raw: String::new(),
        }
    }

    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.segments.is_empty()
    }

    /// The deepest segment; the name the transaction actually posts to.
    #[must_use]
    pub fn leaf_name(&self) -> &str {
        self.segments.last().map_or(self.raw.as_str(), String::as_str)
    }

    #[must_use]
    pub fn full_path(&self) -> String {
        self.segments.join(".")
    }

    /// Parse a typed name. Without a recognized prefix the name is taken
    /// verbatim with `fallback` as its type.
    #[must_use]
    pub fn parse(raw: &str, fallback: AccountType) -> Self {
        let trimmed = raw.trim();
        let (account_type, rest) = match trimmed.split_once('-') {
            Some(("A", rest)) => (AccountType::Asset, rest),
            Some(("L", rest)) => (AccountType::Liability, rest),
            Some(("I", rest)) => (AccountType::Income, rest),
            Some(("E", rest)) => (AccountType::Expense, rest),
            _ => (fallback, trimmed),
        };
        let segments = rest
            .split('.')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(account_type, segments, trimmed)
    }
}

fn fold_to_depth(mut segments: Vec<String>) -> Vec<String> {
    const MAX: usize = abacus_model::MAX_ACCOUNT_DEPTH as usize;
    if segments.len() > MAX {
        let tail = segments.split_off(MAX - 1);
        segments.push(tail.join("."));
    }
    segments
}

/// One normalized input row, numbered from 1 in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTransaction {
    pub row_number: usize,
    pub date: NaiveDate,
    pub transaction_type: TransactionType,
    pub amount: Decimal,
    pub description: String,
    pub invoice_number: Option<String>,
    pub from_account: ParsedAccountPath,
    pub to_account: ParsedAccountPath,
    pub category_suggestion: Option<CategorySuggestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowErrorKind {
    InvalidDate,
    InvalidAmount,
    MissingColumn,
    UnknownAccountType,
    InvalidFormat,
}

/// A malformed row becomes one of these instead of aborting the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row_number: usize,
    pub kind: RowErrorKind,
    pub message: String,
}

impl RowError {
    #[must_use]
    pub fn new(row_number: usize, kind: RowErrorKind, message: impl Into<String>) -> Self {
        Self {
            row_number,
            kind,
            message: message.into(),
        }
    }
}

/// A statement parser pluggable into the pipeline. Parsers tolerate
/// malformed rows by emitting per-row errors rather than failing the file.
pub trait StatementParser: Send + Sync {
    fn bank_code(&self) -> &str;

    fn bank_name(&self) -> &str;

    /// Query used by the mailbox scanner to find this bank's statements.
    fn email_query(&self) -> Option<&str> {
        None
    }

    /// Where users usually find the PDF password for this bank.
    fn password_hint(&self) -> Option<&str> {
        None
    }

    fn parse(&self, content: &str) -> (Vec<ParsedTransaction>, Vec<RowError>);

    /// Statement billing window, when the format carries one.
    fn detect_billing_period(&self, _content: &str) -> Option<(NaiveDate, NaiveDate)> {
        None
    }
}

/// Flexible date handling shared by the CSV parsers: the formats seen in
/// exported files are `YYYY/MM/DD`, `YYYY-MM-DD`, and `MM/DD/YYYY`.
pub(crate) fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 3] = ["%Y/%m/%d", "%Y-%m-%d", "%m/%d/%Y"];
    let trimmed = raw.trim();
    FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
}

/// Amounts may carry comma grouping and surrounding quotes.
pub(crate) fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|ch| *ch != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}
