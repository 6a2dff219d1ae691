use std::sync::Arc;

use abacus_ledger::AccountEngine;
use abacus_ledger::LedgerEngine;
use abacus_ledger::NewTransaction;
use abacus_ledger::TransactionEngine;
use abacus_ledger::TransactionFilter;
use abacus_model::AccountId;
use abacus_model::AccountType;
use abacus_model::LedgerId;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_reports::ReportEngine;
use abacus_store::MemoryStore;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::AssistantError;
use crate::AssistantResult;
use crate::ToolCall;
use crate::ToolDefinition;

/// Executes tool calls against the engines on behalf of the authenticated
/// user. One tool per engine operation; arguments arrive as JSON and are
/// deserialized into per-tool structs.
pub struct ToolRouter {
    ledgers: LedgerEngine,
    accounts: AccountEngine,
    transactions: TransactionEngine,
    reports: ReportEngine,
}

#[derive(Debug, Deserialize)]
struct ListAccountsArgs {
    ledger_id: LedgerId,
    #[serde(default)]
    account_type: Option<AccountType>,
}

#[derive(Debug, Deserialize)]
struct CreateTransactionArgs {
    ledger_id: LedgerId,
    date: NaiveDate,
    description: String,
    amount: Decimal,
    from_account_id: AccountId,
    to_account_id: AccountId,
    transaction_type: TransactionType,
}

#[derive(Debug, Deserialize)]
struct ListTransactionsArgs {
    ledger_id: LedgerId,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    from_date: Option<NaiveDate>,
    #[serde(default)]
    to_date: Option<NaiveDate>,
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BalanceSheetArgs {
    ledger_id: LedgerId,
    as_of: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct IncomeStatementArgs {
    ledger_id: LedgerId,
    start_date: NaiveDate,
    end_date: NaiveDate,
}

impl ToolRouter {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self {
            ledgers: LedgerEngine::new(store.clone()),
            accounts: AccountEngine::new(store.clone()),
            transactions: TransactionEngine::new(store.clone()),
            reports: ReportEngine::new(store),
        }
    }

    /// The tool surface advertised to every provider.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let object = |properties: serde_json::Value| {
            serde_json::json!({ "type": "object", "properties": properties })
        };
        vec![
            ToolDefinition {
                name: "list_ledgers".into(),
                description: "List the user's ledgers with their ids and names.".into(),
                parameters: object(serde_json::json!({})),
                required: Vec::new(),
            },
            ToolDefinition {
                name: "list_accounts".into(),
                description: "List accounts in a ledger, optionally filtered by type.".into(),
                parameters: object(serde_json::json!({
                    "ledger_id": { "type": "string" },
                    "account_type": { "type": "string", "enum": ["ASSET", "LIABILITY", "INCOME", "EXPENSE"] },
                })),
                required: vec!["ledger_id".into()],
            },
            ToolDefinition {
                name: "create_transaction".into(),
                description: "Record a double-entry transaction between two leaf accounts."
                    .into(),
                parameters: object(serde_json::json!({
                    "ledger_id": { "type": "string" },
                    "date": { "type": "string", "format": "date" },
                    "description": { "type": "string" },
                    "amount": { "type": "string" },
                    "from_account_id": { "type": "string" },
                    "to_account_id": { "type": "string" },
                    "transaction_type": { "type": "string", "enum": ["EXPENSE", "INCOME", "TRANSFER"] },
                })),
                required: vec![
                    "ledger_id".into(),
                    "date".into(),
                    "description".into(),
                    "amount".into(),
                    "from_account_id".into(),
                    "to_account_id".into(),
                    "transaction_type".into(),
                ],
            },
            ToolDefinition {
                name: "list_transactions".into(),
                description: "List recent transactions, newest first, with optional filters."
                    .into(),
                parameters: object(serde_json::json!({
                    "ledger_id": { "type": "string" },
                    "search": { "type": "string" },
                    "from_date": { "type": "string", "format": "date" },
                    "to_date": { "type": "string", "format": "date" },
                    "limit": { "type": "integer" },
                })),
                required: vec!["ledger_id".into()],
            },
            ToolDefinition {
                name: "balance_sheet".into(),
                description: "Balance sheet for a ledger at a reference date.".into(),
                parameters: object(serde_json::json!({
                    "ledger_id": { "type": "string" },
                    "as_of": { "type": "string", "format": "date" },
                })),
                required: vec!["ledger_id".into(), "as_of".into()],
            },
            ToolDefinition {
                name: "income_statement".into(),
                description: "Income statement for a ledger over an inclusive date range.".into(),
                parameters: object(serde_json::json!({
                    "ledger_id": { "type": "string" },
                    "start_date": { "type": "string", "format": "date" },
                    "end_date": { "type": "string", "format": "date" },
                })),
                required: vec!["ledger_id".into(), "start_date".into(), "end_date".into()],
            },
        ]
    }

    pub async fn execute(
        &self,
        user_id: UserId,
        call: &ToolCall,
    ) -> AssistantResult<serde_json::Value> {
        match call.name.as_str() {
            "list_ledgers" => {
                let ledgers = self.ledgers.list_ledgers_for_user(user_id).await;
                Ok(serde_json::json!({
                    "ledgers": ledgers
                        .iter()
                        .map(|ledger| serde_json::json!({
                            "id": ledger.id,
                            "name": ledger.name,
                        }))
                        .collect::<Vec<_>>(),
                }))
            }
            "list_accounts" => {
                let args: ListAccountsArgs = parse_args(&call.arguments)?;
                let accounts = self
                    .accounts
                    .list_accounts(user_id, args.ledger_id, args.account_type, false)
                    .await?;
                Ok(serde_json::json!({
                    "accounts": accounts
                        .iter()
                        .map(|account| serde_json::json!({
                            "id": account.id,
                            "name": account.name,
                            "type": account.account_type,
                            "depth": account.depth,
                            "is_system": account.is_system,
                        }))
                        .collect::<Vec<_>>(),
                }))
            }
            "create_transaction" => {
                let args: CreateTransactionArgs = parse_args(&call.arguments)?;
                let tx = self
                    .transactions
                    .create_transaction(
                        user_id,
                        args.ledger_id,
                        NewTransaction::new(
                            args.date,
                            &args.description,
                            args.amount,
                            args.from_account_id,
                            args.to_account_id,
                            args.transaction_type,
                        ),
                    )
                    .await?;
                Ok(serde_json::json!({
                    "transaction_id": tx.id,
                    "date": tx.date,
                    "amount": tx.amount,
                }))
            }
            "list_transactions" => {
                let args: ListTransactionsArgs = parse_args(&call.arguments)?;
                let filter = TransactionFilter {
                    search: args.search,
                    from_date: args.from_date,
                    to_date: args.to_date,
                    account_id: None,
                    transaction_type: None,
                };
                let page = self
                    .transactions
                    .list_transactions(
                        user_id,
                        args.ledger_id,
                        &filter,
                        args.limit.unwrap_or(20),
                        None,
                    )
                    .await?;
                Ok(serde_json::json!({
                    "transactions": page
                        .items
                        .iter()
                        .map(|tx| serde_json::json!({
                            "id": tx.id,
                            "date": tx.date,
                            "description": tx.description,
                            "amount": tx.amount,
                            "type": tx.transaction_type,
                        }))
                        .collect::<Vec<_>>(),
                    "has_more": page.has_more,
                }))
            }
            "balance_sheet" => {
                let args: BalanceSheetArgs = parse_args(&call.arguments)?;
                let sheet = self
                    .reports
                    .balance_sheet(user_id, args.ledger_id, args.as_of)
                    .await?;
                Ok(serde_json::json!({
                    "as_of": sheet.as_of,
                    "total_assets": sheet.total_assets,
                    "total_liabilities": sheet.total_liabilities,
                    "total_equity": sheet.total_equity,
                }))
            }
            "income_statement" => {
                let args: IncomeStatementArgs = parse_args(&call.arguments)?;
                let statement = self
                    .reports
                    .income_statement(user_id, args.ledger_id, args.start_date, args.end_date)
                    .await?;
                Ok(serde_json::json!({
                    "total_income": statement.total_income,
                    "total_expenses": statement.total_expenses,
                    "net_income": statement.net_income,
                }))
            }
            other => Err(AssistantError::UnknownTool(other.to_string())),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: &serde_json::Value) -> AssistantResult<T> {
    serde_json::from_value(arguments.clone())
        .map_err(|err| AssistantError::InvalidArgs(err.to_string()))
}
