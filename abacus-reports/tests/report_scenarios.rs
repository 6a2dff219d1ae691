use std::sync::Arc;

use abacus_ledger::AccountEngine;
use abacus_ledger::LedgerEngine;
use abacus_ledger::NewAccount;
use abacus_ledger::NewTransaction;
use abacus_ledger::TransactionEngine;
use abacus_model::Account;
use abacus_model::AccountType;
use abacus_model::LedgerId;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_reports::ReportEngine;
use abacus_store::MemoryStore;
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use uuid::Uuid;

struct Harness {
    ledgers: LedgerEngine,
    accounts: AccountEngine,
    transactions: TransactionEngine,
    reports: ReportEngine,
    user_id: UserId,
}

impl Harness {
    fn new() -> Self {
        let store: Arc<MemoryStore> = MemoryStore::shared();
        Self {
            ledgers: LedgerEngine::new(store.clone()),
            accounts: AccountEngine::new(store.clone()),
            transactions: TransactionEngine::new(store.clone()),
            reports: ReportEngine::new(store),
            user_id: Uuid::new_v4(),
        }
    }

    async fn account(&self, ledger_id: LedgerId, new: NewAccount) -> Account {
        self.accounts
            .create_account(self.user_id, ledger_id, new)
            .await
            .expect("create account")
    }

    async fn named(&self, ledger_id: LedgerId, name: &str) -> Account {
        self.accounts
            .list_accounts(self.user_id, ledger_id, None, false)
            .await
            .expect("list accounts")
            .into_iter()
            .find(|account| account.name == name)
            .expect("account present")
    }

    async fn post(
        &self,
        ledger_id: LedgerId,
        date: NaiveDate,
        amount: &str,
        from: &Account,
        to: &Account,
        transaction_type: TransactionType,
    ) {
        self.transactions
            .create_transaction(
                self.user_id,
                ledger_id,
                NewTransaction::new(date, "entry", money(amount), from.id, to.id, transaction_type),
            )
            .await
            .expect("post transaction");
    }
}

fn money(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

#[tokio::test]
async fn balance_sheet_holds_the_accounting_identity() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("1000.00"))
        .await
        .expect("ledger");
    let cash = h.named(ledger.id, "Cash").await;

    let card = h
        .account(
            ledger.id,
            NewAccount::new("Credit Card", AccountType::Liability),
        )
        .await;
    let food = h
        .account(ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await;

    h.post(
        ledger.id,
        date(2026, 3, 1),
        "50.00",
        &cash,
        &food,
        TransactionType::Expense,
    )
    .await;
    h.post(
        ledger.id,
        date(2026, 3, 2),
        "120.00",
        &card,
        &food,
        TransactionType::Expense,
    )
    .await;

    let sheet = h
        .reports
        .balance_sheet(h.user_id, ledger.id, date(2026, 3, 31))
        .await
        .expect("balance sheet");

    assert_eq!(sheet.total_assets, money("950.00"));
    assert_eq!(sheet.total_liabilities, money("120.00"));
    assert_eq!(sheet.total_equity, money("830.00"));
    assert_eq!(
        sheet.total_assets,
        sheet.total_liabilities + sheet.total_equity
    );

    // The synthesized equity line carries no account id.
    assert_eq!(sheet.equity.len(), 1);
    assert_eq!(sheet.equity[0].name, "Net Worth");
    assert!(sheet.equity[0].account_id.is_none());

    // The asset tree reports Cash but not the credit-normal Equity account.
    let asset_names: Vec<&str> = sheet.assets.iter().map(|node| node.name.as_str()).collect();
    assert!(asset_names.contains(&"Cash"));
    assert!(!asset_names.contains(&"Equity"));
}

#[tokio::test]
async fn balance_sheet_is_cut_at_the_reference_date() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", Decimal::ZERO)
        .await
        .expect("ledger");
    let cash = h.named(ledger.id, "Cash").await;
    let food = h
        .account(ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await;
    let salary = h
        .account(ledger.id, NewAccount::new("Salary", AccountType::Income))
        .await;

    h.post(
        ledger.id,
        date(2026, 1, 10),
        "1000.00",
        &salary,
        &cash,
        TransactionType::Income,
    )
    .await;
    h.post(
        ledger.id,
        date(2026, 2, 20),
        "300.00",
        &cash,
        &food,
        TransactionType::Expense,
    )
    .await;

    let january = h
        .reports
        .balance_sheet(h.user_id, ledger.id, date(2026, 1, 31))
        .await
        .expect("january sheet");
    assert_eq!(january.total_assets, money("1000.00"));

    let february = h
        .reports
        .balance_sheet(h.user_id, ledger.id, date(2026, 2, 28))
        .await
        .expect("february sheet");
    assert_eq!(february.total_assets, money("700.00"));
}

#[tokio::test]
async fn income_statement_rolls_up_hierarchies_and_respects_the_window() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("500.00"))
        .await
        .expect("ledger");
    let cash = h.named(ledger.id, "Cash").await;

    let salary = h
        .account(ledger.id, NewAccount::new("Salary", AccountType::Income))
        .await;
    let food = h
        .account(ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await;
    let groceries = h
        .account(
            ledger.id,
            NewAccount::new("Groceries", AccountType::Expense).under(food.id),
        )
        .await;
    let restaurants = h
        .account(
            ledger.id,
            NewAccount::new("Restaurants", AccountType::Expense).under(food.id),
        )
        .await;

    h.post(
        ledger.id,
        date(2026, 4, 1),
        "50000.00",
        &salary,
        &cash,
        TransactionType::Income,
    )
    .await;
    h.post(
        ledger.id,
        date(2026, 4, 5),
        "100.00",
        &cash,
        &groceries,
        TransactionType::Expense,
    )
    .await;
    h.post(
        ledger.id,
        date(2026, 4, 9),
        "75.00",
        &cash,
        &restaurants,
        TransactionType::Expense,
    )
    .await;
    // Outside the window; must not appear.
    h.post(
        ledger.id,
        date(2026, 5, 1),
        "999.00",
        &cash,
        &groceries,
        TransactionType::Expense,
    )
    .await;

    let statement = h
        .reports
        .income_statement(h.user_id, ledger.id, date(2026, 4, 1), date(2026, 4, 30))
        .await
        .expect("income statement");

    assert_eq!(statement.total_income, money("50000.00"));
    assert_eq!(statement.total_expenses, money("175.00"));
    assert_eq!(statement.net_income, money("49825.00"));

    let food_node = statement
        .expenses
        .iter()
        .find(|node| node.name == "Food")
        .expect("food node");
    assert_eq!(food_node.amount, money("175.00"));
    assert_eq!(food_node.depth_level, 0);
    assert_eq!(food_node.children.len(), 2);
    assert!(
        food_node
            .children
            .iter()
            .all(|child| child.depth_level == 1)
    );

    // Zero-balance accounts stay visible for the caller to filter.
    let may = h
        .reports
        .income_statement(h.user_id, ledger.id, date(2026, 6, 1), date(2026, 6, 30))
        .await
        .expect("empty window");
    assert_eq!(may.total_expenses, Decimal::ZERO);
    assert!(may.expenses.iter().any(|node| node.name == "Food"));
}
