use abacus_model::AccountType;
use abacus_model::TransactionType;
use chrono::Days;
use chrono::NaiveDate;
use csv::StringRecord;
use regex_lite::Regex;
use rust_decimal::Decimal;

use crate::parser::ParsedAccountPath;
use crate::parser::ParsedTransaction;
use crate::parser::RowError;
use crate::parser::RowErrorKind;
use crate::parser::StatementParser;
use crate::parser::parse_amount;
use crate::parser::parse_flexible_date;

/// Per-bank layout of a credit-card statement CSV: column offsets, date
/// format, how to find the header row, and how to recover the statement
/// year when dates omit it.
#[derive(Debug, Clone)]
pub struct BankCsvConfig {
    pub code: &'static str,
    pub name: &'static str,
    pub date_column: usize,
    pub date_format: &'static str,
    pub description_column: usize,
    pub amount_column: usize,
    pub skip_rows: usize,
    pub encoding: &'static str,
    /// When set, the header row is located by this marker instead of a
    /// fixed skip count.
    pub header_marker: Option<&'static str>,
    /// Payment records show up as negative amounts on some statements and
    /// are not expenses.
    pub skip_negative_amounts: bool,
    /// Pattern extracting `(year, month)` from the bill header line, for
    /// statements whose transaction dates omit the year.
    pub statement_year_pattern: Option<&'static str>,
    pub email_query: Option<&'static str>,
    pub password_hint: Option<&'static str>,
}

pub const STATEMENT_YEAR_PATTERN: &str = r"(\d{4})/(\d{2})信用卡對帳單";

const BANK_CONFIGS: [BankCsvConfig; 5] = [
    BankCsvConfig {
        code: "CATHAY",
        name: "國泰世華",
        date_column: 0,
        date_format: "%m/%d",
        description_column: 1,
        amount_column: 2,
        skip_rows: 1,
        encoding: "utf-8",
        header_marker: Some("消費日"),
        skip_negative_amounts: true,
        statement_year_pattern: Some(STATEMENT_YEAR_PATTERN),
        email_query: Some("from:bank@cathaybk.com.tw 信用卡電子對帳單"),
        password_hint: Some("身分證字號"),
    },
    BankCsvConfig {
        code: "CTBC",
        name: "中國信託",
        date_column: 0,
        date_format: "%Y-%m-%d",
        description_column: 1,
        amount_column: 2,
        skip_rows: 1,
        encoding: "utf-8",
        header_marker: None,
        skip_negative_amounts: false,
        statement_year_pattern: None,
        email_query: Some("from:ebill@ctbcbank.com 電子帳單"),
        password_hint: None,
    },
    BankCsvConfig {
        code: "ESUN",
        name: "玉山銀行",
        date_column: 0,
        date_format: "%Y/%m/%d",
        description_column: 1,
        amount_column: 2,
        skip_rows: 1,
        encoding: "utf-8",
        header_marker: None,
        skip_negative_amounts: false,
        statement_year_pattern: None,
        email_query: Some("from:estatement@esunbank.com.tw"),
        password_hint: None,
    },
    BankCsvConfig {
        code: "TAISHIN",
        name: "台新銀行",
        date_column: 0,
        date_format: "%Y/%m/%d",
        description_column: 2,
        amount_column: 3,
        skip_rows: 1,
        encoding: "big5",
        header_marker: None,
        skip_negative_amounts: false,
        statement_year_pattern: None,
        email_query: None,
        password_hint: None,
    },
    BankCsvConfig {
        code: "FUBON",
        name: "富邦銀行",
        date_column: 0,
        date_format: "%Y-%m-%d",
        description_column: 1,
        amount_column: 2,
        skip_rows: 1,
        encoding: "utf-8",
        header_marker: None,
        skip_negative_amounts: false,
        statement_year_pattern: None,
        email_query: None,
        password_hint: None,
    },
];

#[must_use]
pub fn supported_banks() -> &'static [BankCsvConfig] {
    &BANK_CONFIGS
}

#[must_use]
pub fn bank_config(code: &str) -> Option<&'static BankCsvConfig> {
    BANK_CONFIGS.iter().find(|config| config.code == code)
}

/// Credit-card statement parser driven by a [`BankCsvConfig`]. Every data
/// row becomes a LIABILITY → EXPENSE posting against the bank's card
/// account; the expense category is resolved later by the mapping step.
pub struct CreditCardParser {
    config: &'static BankCsvConfig,
}

impl CreditCardParser {
    #[must_use]
    pub fn new(config: &'static BankCsvConfig) -> Self {
        Self { config }
    }

    fn card_account(&self) -> ParsedAccountPath {
        let name = format!("{}信用卡", self.config.name);
        ParsedAccountPath::new(AccountType::Liability, vec![name.clone()], &name)
    }

    fn statement_period(&self, content: &str) -> Option<(i32, u32)> {
        let pattern = self.config.statement_year_pattern?;
        let regex = Regex::new(pattern).ok()?;
        let captures = regex.captures(content)?;
        let year = captures.get(1)?.as_str().parse().ok()?;
        let month = captures.get(2)?.as_str().parse().ok()?;
        Some((year, month))
    }

    /// Dates printed as `MM/DD` take the statement year; a transaction
    /// month greater than the bill month belongs to the previous year.
    fn resolve_date(&self, raw: &str, period: Option<(i32, u32)>) -> Option<NaiveDate> {
        if self.config.date_format.contains("%Y") {
            return parse_flexible_date(raw);
        }
        let (bill_year, bill_month) = period?;
        let (month, day) = raw.trim().split_once('/')?;
        let month: u32 = month.parse().ok()?;
        let day: u32 = day.parse().ok()?;
        let year = if month > bill_month {
            bill_year - 1
        } else {
            bill_year
        };
        NaiveDate::from_ymd_opt(year, month, day)
    }
}

impl StatementParser for CreditCardParser {
    fn bank_code(&self) -> &str {
        self.config.code
    }

    fn bank_name(&self) -> &str {
        self.config.name
    }

    fn email_query(&self) -> Option<&str> {
        self.config.email_query
    }

    fn password_hint(&self) -> Option<&str> {
        self.config.password_hint
    }

    fn parse(&self, content: &str) -> (Vec<ParsedTransaction>, Vec<RowError>) {
        let period = self.statement_period(content);
        if self.config.statement_year_pattern.is_some() && period.is_none() {
            return (
                Vec::new(),
                vec![RowError::new(
                    0,
                    RowErrorKind::InvalidFormat,
                    "statement header with billing year not found",
                )],
            );
        }

        let records = read_records(content);
        let data_start = match self.config.header_marker {
            Some(marker) => {
                match records.iter().position(|record| {
                    record.iter().any(|field| field.contains(marker))
                }) {
                    Some(index) => index + 1,
                    None => {
                        return (
                            Vec::new(),
                            vec![RowError::new(
                                0,
                                RowErrorKind::MissingColumn,
                                format!("header row marked by '{marker}' not found"),
                            )],
                        );
                    }
                }
            }
            None => self.config.skip_rows,
        };

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate().skip(data_start) {
            let row_number = index + 1 - data_start;
            if record.len() <= self.config.amount_column.max(self.config.description_column) {
                continue; // trailing summary lines
            }
            let field = |column: usize| record.get(column).unwrap_or("").trim();

            let date_raw = field(self.config.date_column);
            if date_raw.is_empty() || date_raw == "−" || date_raw == "-" {
                continue;
            }
            let Some(date) = self.resolve_date(date_raw, period) else {
                errors.push(RowError::new(
                    row_number,
                    RowErrorKind::InvalidDate,
                    format!("Invalid date format: {date_raw}"),
                ));
                continue;
            };

            let amount_raw = field(self.config.amount_column);
            let Some(amount) = parse_amount(amount_raw) else {
                errors.push(RowError::new(
                    row_number,
                    RowErrorKind::InvalidAmount,
                    format!("Invalid amount format: {amount_raw}"),
                ));
                continue;
            };
            if amount < Decimal::ZERO {
                if self.config.skip_negative_amounts {
                    continue; // payment record, not an expense
                }
                errors.push(RowError::new(
                    row_number,
                    RowErrorKind::InvalidAmount,
                    "negative amount on a purchase row",
                ));
                continue;
            }

            rows.push(ParsedTransaction {
                row_number,
                date,
                transaction_type: TransactionType::Expense,
                amount,
                description: field(self.config.description_column).to_string(),
                invoice_number: None,
                from_account: self.card_account(),
                to_account: ParsedAccountPath::unresolved(AccountType::Expense),
                category_suggestion: None,
            });
        }
        (rows, errors)
    }

    fn detect_billing_period(&self, content: &str) -> Option<(NaiveDate, NaiveDate)> {
        let (year, month) = self.statement_period(content)?;
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };
        Some((start, next - Days::new(1)))
    }
}

/// Plain bank-account debit records: `交易日,商店,消費金額` with a header
/// row. Rows post ASSET → EXPENSE from the holder's bank account.
#[derive(Debug, Clone, Default)]
pub struct BankRecordParser;

pub const BANK_RECORD_SOURCE_ACCOUNT: &str = "銀行帳戶";

impl StatementParser for BankRecordParser {
    fn bank_code(&self) -> &str {
        "BANK_RECORD"
    }

    fn bank_name(&self) -> &str {
        "銀行交易紀錄"
    }

    fn parse(&self, content: &str) -> (Vec<ParsedTransaction>, Vec<RowError>) {
        let records = read_records(content);
        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for (index, record) in records.iter().enumerate().skip(1) {
            let row_number = index;
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let field = |column: usize| record.get(column).unwrap_or("").trim();

            let Some(date) = parse_flexible_date(field(0)) else {
                errors.push(RowError::new(
                    row_number,
                    RowErrorKind::InvalidDate,
                    format!("Invalid date format: {}", field(0)),
                ));
                continue;
            };
            let Some(amount) = parse_amount(field(2)).filter(|amount| *amount > Decimal::ZERO)
            else {
                errors.push(RowError::new(
                    row_number,
                    RowErrorKind::InvalidAmount,
                    format!("Invalid amount format: {}", field(2)),
                ));
                continue;
            };

            rows.push(ParsedTransaction {
                row_number,
                date,
                transaction_type: TransactionType::Expense,
                amount,
                description: field(1).to_string(),
                invoice_number: None,
                from_account: ParsedAccountPath::new(
                    AccountType::Asset,
                    vec![BANK_RECORD_SOURCE_ACCOUNT.to_string()],
                    BANK_RECORD_SOURCE_ACCOUNT,
                ),
                to_account: ParsedAccountPath::unresolved(AccountType::Expense),
                category_suggestion: None,
            });
        }
        (rows, errors)
    }
}

fn read_records(content: &str) -> Vec<StringRecord> {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
        .records()
        .filter_map(Result::ok)
        .collect()
}
