use abacus_model::AccountId;
use abacus_model::AccountType;
use abacus_model::LedgerId;
use abacus_model::TransactionType;
use abacus_store::State;
use csv::StringRecord;

use crate::ImportError;
use crate::ImportResult;
use crate::parser::ParsedAccountPath;
use crate::parser::ParsedTransaction;
use crate::parser::RowError;
use crate::parser::RowErrorKind;
use crate::parser::StatementParser;
use crate::parser::parse_amount;
use crate::parser::parse_flexible_date;

pub const MYAB_HEADER: [&str; 9] = [
    "日期",
    "交易類型",
    "支出科目",
    "收入科目",
    "從科目",
    "到科目",
    "金額",
    "明細",
    "發票號碼",
];

struct Columns {
    date: usize,
    kind: usize,
    expense_account: usize,
    income_account: usize,
    from_account: usize,
    to_account: usize,
    amount: usize,
    description: usize,
    invoice: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> ImportResult<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|candidate| candidate.trim() == name)
                .ok_or_else(|| ImportError::Validation(format!("missing column {name}")))
        };
        Ok(Self {
            date: find("日期")?,
            kind: find("交易類型")?,
            expense_account: find("支出科目")?,
            income_account: find("收入科目")?,
            from_account: find("從科目")?,
            to_account: find("到科目")?,
            amount: find("金額")?,
            description: find("明細")?,
            invoice: find("發票號碼")?,
        })
    }
}

/// Parser for the application's own CSV interchange format. Round-trips
/// with [`export_myab_csv`].
#[derive(Debug, Clone, Default)]
pub struct MyabCsvParser;

impl MyabCsvParser {
    fn build_row(
        columns: &Columns,
        record: &StringRecord,
        row_number: usize,
    ) -> Result<ParsedTransaction, RowError> {
        let field = |index: usize| record.get(index).unwrap_or("").trim();

        let date = parse_flexible_date(field(columns.date)).ok_or_else(|| {
            RowError::new(
                row_number,
                RowErrorKind::InvalidDate,
                format!("Invalid date format: {}", field(columns.date)),
            )
        })?;

        let transaction_type = match field(columns.kind) {
            "支出" | "EXPENSE" => TransactionType::Expense,
            "收入" | "INCOME" => TransactionType::Income,
            "轉帳" | "TRANSFER" => TransactionType::Transfer,
            other => {
                return Err(RowError::new(
                    row_number,
                    RowErrorKind::InvalidFormat,
                    format!("unknown transaction type: {other}"),
                ));
            }
        };

        let amount = parse_amount(field(columns.amount)).ok_or_else(|| {
            RowError::new(
                row_number,
                RowErrorKind::InvalidAmount,
                format!("Invalid amount format: {}", field(columns.amount)),
            )
        })?;

        let (from_raw, from_fallback, to_raw, to_fallback) = match transaction_type {
            TransactionType::Expense => (
                field(columns.from_account),
                AccountType::Asset,
                field(columns.expense_account),
                AccountType::Expense,
            ),
            TransactionType::Income => (
                field(columns.income_account),
                AccountType::Income,
                field(columns.to_account),
                AccountType::Asset,
            ),
            TransactionType::Transfer => (
                field(columns.from_account),
                AccountType::Asset,
                field(columns.to_account),
                AccountType::Asset,
            ),
        };
        if from_raw.is_empty() || to_raw.is_empty() {
            return Err(RowError::new(
                row_number,
                RowErrorKind::MissingColumn,
                "both account columns are required for this row type",
            ));
        }

        Ok(ParsedTransaction {
            row_number,
            date,
            transaction_type,
            amount,
            description: field(columns.description).to_string(),
            invoice_number: Some(field(columns.invoice).to_string())
                .filter(|value| !value.is_empty()),
            from_account: ParsedAccountPath::parse(from_raw, from_fallback),
            to_account: ParsedAccountPath::parse(to_raw, to_fallback),
            category_suggestion: None,
        })
    }
}

impl StatementParser for MyabCsvParser {
    fn bank_code(&self) -> &str {
        "MYAB"
    }

    fn bank_name(&self) -> &str {
        "MyAB CSV"
    }

    fn parse(&self, content: &str) -> (Vec<ParsedTransaction>, Vec<RowError>) {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let columns = match reader
            .headers()
            .map_err(|err| ImportError::Validation(err.to_string()))
            .and_then(Columns::locate)
        {
            Ok(columns) => columns,
            Err(err) => {
                return (
                    Vec::new(),
                    vec![RowError::new(0, RowErrorKind::MissingColumn, err.to_string())],
                );
            }
        };

        let mut rows = Vec::new();
        let mut errors = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let row_number = index + 1;
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    errors.push(RowError::new(
                        row_number,
                        RowErrorKind::InvalidFormat,
                        err.to_string(),
                    ));
                    continue;
                }
            };
            if record.iter().all(|value| value.trim().is_empty()) {
                continue;
            }
            match Self::build_row(&columns, &record, row_number) {
                Ok(row) => rows.push(row),
                Err(error) => errors.push(error),
            }
        }
        (rows, errors)
    }
}

/// Serialize a ledger's transactions to the MYAB interchange format with
/// typed, fully-pathed account names, so an export can be re-imported
/// losslessly.
pub fn export_myab_csv(state: &State, ledger_id: LedgerId) -> ImportResult<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(MYAB_HEADER)
        .map_err(|err| ImportError::Internal(err.to_string()))?;

    let mut rows = state.transactions_in_ledger(ledger_id);
    rows.reverse(); // oldest first reads naturally in a spreadsheet

    for tx in rows {
        let from_name = typed_account_name(state, tx.from_account_id);
        let to_name = typed_account_name(state, tx.to_account_id);
        let (Some(from_name), Some(to_name)) = (from_name, to_name) else {
            continue;
        };
        let kind = match tx.transaction_type {
            TransactionType::Expense => "支出",
            TransactionType::Income => "收入",
            TransactionType::Transfer => "轉帳",
        };
        let (expense_col, income_col, from_col, to_col) = match tx.transaction_type {
            TransactionType::Expense => (to_name.clone(), String::new(), from_name, String::new()),
            TransactionType::Income => (String::new(), from_name, String::new(), to_name.clone()),
            TransactionType::Transfer => (String::new(), String::new(), from_name, to_name.clone()),
        };
        writer
            .write_record([
                tx.date.format("%Y/%m/%d").to_string(),
                kind.to_string(),
                expense_col,
                income_col,
                from_col,
                to_col,
                tx.amount.to_string(),
                tx.description.clone(),
                String::new(),
            ])
            .map_err(|err| ImportError::Internal(err.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ImportError::Internal(err.to_string()))?;
    String::from_utf8(bytes).map_err(|err| ImportError::Internal(err.to_string()))
}

/// `E-Food.Groceries` style name: type prefix plus the parent chain.
fn typed_account_name(state: &State, account_id: AccountId) -> Option<String> {
    let account = state.accounts.get(&account_id)?;
    let mut segments = vec![account.name.clone()];
    let mut cursor = account.parent_id;
    while let Some(parent_id) = cursor {
        let parent = state.accounts.get(&parent_id)?;
        segments.push(parent.name.clone());
        cursor = parent.parent_id;
    }
    segments.reverse();
    let prefix = match account.account_type {
        AccountType::Asset => "A",
        AccountType::Liability => "L",
        AccountType::Income => "I",
        AccountType::Expense => "E",
    };
    Some(format!("{prefix}-{}", segments.join(".")))
}
