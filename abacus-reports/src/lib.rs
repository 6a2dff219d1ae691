#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Financial reporting: point-in-time balance sheets and period income
//! statements, both derived from a single traversal of the ledger's
//! transaction log. Nothing here reads `balance_cache`.

use std::collections::HashMap;
use std::sync::Arc;

use abacus_ledger::LedgerResult;
use abacus_ledger::leaf_balances;
use abacus_model::Account;
use abacus_model::AccountId;
use abacus_model::AccountType;
use abacus_model::EntrySide;
use abacus_model::LedgerId;
use abacus_model::SYSTEM_EQUITY_NAME;
use abacus_model::UserId;
use abacus_model::balance_contribution;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// One line of a report tree. `account_id` is absent on synthesized lines
/// (the Net Worth equity entry). Amounts roll up from children;
/// `depth_level` is zero-based.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportNode {
    pub account_id: Option<AccountId>,
    pub name: String,
    pub amount: Decimal,
    pub depth_level: i32,
    pub children: Vec<ReportNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSheet {
    pub as_of: NaiveDate,
    pub assets: Vec<ReportNode>,
    pub liabilities: Vec<ReportNode>,
    pub equity: Vec<ReportNode>,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeStatement {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub income: Vec<ReportNode>,
    pub expenses: Vec<ReportNode>,
    pub total_income: Decimal,
    pub total_expenses: Decimal,
    pub net_income: Decimal,
}

#[derive(Clone)]
pub struct ReportEngine {
    store: Arc<MemoryStore>,
}

impl ReportEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Balance sheet at `as_of`. The system Equity account is credit-normal
    /// in substance, so it is kept out of the asset tree; the equity
    /// section is the synthesized Net Worth line, and the accounting
    /// identity `assets == liabilities + equity` holds by construction.
    pub async fn balance_sheet(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        as_of: NaiveDate,
    ) -> LedgerResult<BalanceSheet> {
        let state = self.store.read().await;
        owned(&state, user_id, ledger_id)?;

        let balances = leaf_balances(&state, ledger_id, Some(as_of));
        let accounts = state.accounts_in_ledger(ledger_id);

        let assets = build_trees(
            accounts.iter().copied().filter(|account| {
                account.account_type == AccountType::Asset
                    && !(account.is_system && account.name == SYSTEM_EQUITY_NAME)
            }),
            &balances,
        );
        let liabilities = build_trees(
            accounts
                .iter()
                .copied()
                .filter(|account| account.account_type == AccountType::Liability),
            &balances,
        );

        let total_assets: Decimal = assets.iter().map(|node| node.amount).sum();
        let total_liabilities: Decimal = liabilities.iter().map(|node| node.amount).sum();
        let total_equity = total_assets - total_liabilities;
        let equity = vec![ReportNode {
            account_id: None,
            name: "Net Worth".into(),
            amount: total_equity,
            depth_level: 0,
            children: Vec::new(),
        }];

        Ok(BalanceSheet {
            as_of,
            assets,
            liabilities,
            equity,
            total_assets,
            total_liabilities,
            total_equity,
        })
    }

    /// Income statement for the inclusive `[start, end]` window, projecting
    /// only INCOME and EXPENSE accounts.
    pub async fn income_statement(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> LedgerResult<IncomeStatement> {
        let state = self.store.read().await;
        owned(&state, user_id, ledger_id)?;

        let balances = period_balances(&state, ledger_id, start_date, end_date);
        let accounts = state.accounts_in_ledger(ledger_id);

        let income = build_trees(
            accounts
                .iter()
                .copied()
                .filter(|account| account.account_type == AccountType::Income),
            &balances,
        );
        let expenses = build_trees(
            accounts
                .iter()
                .copied()
                .filter(|account| account.account_type == AccountType::Expense),
            &balances,
        );

        let total_income: Decimal = income.iter().map(|node| node.amount).sum();
        let total_expenses: Decimal = expenses.iter().map(|node| node.amount).sum();
        Ok(IncomeStatement {
            start_date,
            end_date,
            income,
            expenses,
            total_income,
            total_expenses,
            net_income: total_income - total_expenses,
        })
    }
}

fn owned(state: &State, user_id: UserId, ledger_id: LedgerId) -> LedgerResult<()> {
    state
        .ledgers
        .get(&ledger_id)
        .filter(|ledger| ledger.user_id == user_id)
        .map(|_| ())
        .ok_or_else(|| abacus_ledger::LedgerError::NotFound(format!("ledger {ledger_id}")))
}

/// Direct balances over `[start, end]`, same contribution rules as the
/// point-in-time fold but bounded on both sides.
fn period_balances(
    state: &State,
    ledger_id: LedgerId,
    start: NaiveDate,
    end: NaiveDate,
) -> HashMap<AccountId, Decimal> {
    let mut balances: HashMap<AccountId, Decimal> = state
        .accounts
        .values()
        .filter(|account| account.ledger_id == ledger_id)
        .map(|account| (account.id, Decimal::ZERO))
        .collect();

    for tx in state.transactions.values() {
        if tx.ledger_id != ledger_id || tx.date < start || tx.date > end {
            continue;
        }
        if let Some(to) = state.accounts.get(&tx.to_account_id) {
            *balances.entry(tx.to_account_id).or_default() +=
                balance_contribution(to.account_type, EntrySide::Debit, tx.amount);
        }
        if let Some(from) = state.accounts.get(&tx.from_account_id) {
            *balances.entry(tx.from_account_id).or_default() +=
                balance_contribution(from.account_type, EntrySide::Credit, tx.amount);
        }
    }

    balances
}

/// Group the flat account list by parent, then fold amounts bottom-up.
/// Children are ordered by `sort_order` at every level and zero-balance
/// accounts stay in so callers can filter for themselves.
fn build_trees<'a>(
    accounts: impl Iterator<Item = &'a Account>,
    balances: &HashMap<AccountId, Decimal>,
) -> Vec<ReportNode> {
    let accounts: Vec<&Account> = accounts.collect();
    let mut children_of: HashMap<AccountId, Vec<&Account>> = HashMap::new();
    let mut roots: Vec<&Account> = Vec::new();
    for &account in &accounts {
        match account.parent_id {
            Some(parent) => children_of.entry(parent).or_default().push(account),
            None => roots.push(account),
        }
    }
    for siblings in children_of.values_mut() {
        siblings.sort_by_key(|account| (account.sort_order, account.id));
    }
    roots.sort_by_key(|account| (account.sort_order, account.id));

    fn build(
        account: &Account,
        children_of: &HashMap<AccountId, Vec<&Account>>,
        balances: &HashMap<AccountId, Decimal>,
    ) -> ReportNode {
        let children: Vec<ReportNode> = children_of
            .get(&account.id)
            .map(|kids| {
                kids.iter()
                    .map(|child| build(child, children_of, balances))
                    .collect()
            })
            .unwrap_or_default();
        let own = balances.get(&account.id).copied().unwrap_or(Decimal::ZERO);
        let rolled: Decimal = children.iter().map(|child| child.amount).sum();
        ReportNode {
            account_id: Some(account.id),
            name: account.name.clone(),
            amount: own + rolled,
            depth_level: account.depth - 1,
            children,
        }
    }

    roots
        .into_iter()
        .map(|root| build(root, &children_of, balances))
        .collect()
}
