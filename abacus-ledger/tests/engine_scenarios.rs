use std::sync::Arc;

use abacus_audit::AuditLogFilter;
use abacus_ledger::AccountEngine;
use abacus_ledger::LedgerEngine;
use abacus_ledger::LedgerError;
use abacus_ledger::NewAccount;
use abacus_ledger::NewTransaction;
use abacus_ledger::TransactionEngine;
use abacus_ledger::TransactionFilter;
use abacus_model::Account;
use abacus_model::AccountType;
use abacus_model::AuditAction;
use abacus_model::LedgerId;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::NaiveDate;
use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryStore>,
    ledgers: LedgerEngine,
    accounts: AccountEngine,
    transactions: TransactionEngine,
    user_id: UserId,
}

impl Harness {
    fn new() -> Self {
        let store = MemoryStore::shared();
        Self {
            ledgers: LedgerEngine::new(store.clone()),
            accounts: AccountEngine::new(store.clone()),
            transactions: TransactionEngine::new(store.clone()),
            store,
            user_id: Uuid::new_v4(),
        }
    }

    async fn system_account(&self, ledger_id: LedgerId, name: &str) -> Account {
        self.accounts
            .list_accounts(self.user_id, ledger_id, None, false)
            .await
            .expect("list accounts")
            .into_iter()
            .find(|account| account.name == name)
            .expect("system account present")
    }

    async fn spend(
        &self,
        ledger_id: LedgerId,
        from: &Account,
        to: &Account,
        amount: &str,
        description: &str,
    ) {
        self.transactions
            .create_transaction(
                self.user_id,
                ledger_id,
                NewTransaction::new(
                    Utc::now().date_naive(),
                    description,
                    money(amount),
                    from.id,
                    to.id,
                    TransactionType::Expense,
                ),
            )
            .await
            .expect("post expense");
    }
}

fn money(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

#[tokio::test]
async fn scenario_create_ledger_and_spend() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "P", money("1000.00"))
        .await
        .expect("create ledger");

    let cash = h.system_account(ledger.id, "Cash").await;
    let equity = h.system_account(ledger.id, "Equity").await;
    assert!(cash.is_system);
    assert!(equity.is_system);

    let cash_balance = h
        .accounts
        .balance_of(h.user_id, ledger.id, cash.id, None)
        .await
        .expect("cash balance");
    assert_eq!(cash_balance, money("1000.00"));
    let equity_balance = h
        .accounts
        .balance_of(h.user_id, ledger.id, equity.id, None)
        .await
        .expect("equity balance");
    assert_eq!(equity_balance, money("-1000.00"));

    // The ledger creation left a CREATE audit row and the opening transfer.
    let state = h.store.read().await;
    let rows = abacus_audit::list(
        &state,
        &AuditLogFilter {
            ledger_id: Some(ledger.id),
            entity_type: Some("Ledger".into()),
            action: Some(AuditAction::Create),
            ..AuditLogFilter::default()
        },
    );
    assert_eq!(rows.len(), 1);
    let opening: Vec<_> = state
        .transactions_in_ledger(ledger.id)
        .into_iter()
        .filter(|tx| tx.transaction_type == TransactionType::Transfer)
        .collect();
    assert_eq!(opening.len(), 1);
    assert_eq!(opening[0].amount, money("1000.00"));
    assert_eq!(opening[0].from_account_id, equity.id);
    assert_eq!(opening[0].to_account_id, cash.id);
    drop(state);

    let food = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await
        .expect("create food");
    h.spend(ledger.id, &cash, &food, "50.00", "lunch").await;

    assert_eq!(
        h.accounts
            .balance_of(h.user_id, ledger.id, cash.id, None)
            .await
            .expect("cash after lunch"),
        money("950.00")
    );
    assert_eq!(
        h.accounts
            .balance_of(h.user_id, ledger.id, food.id, None)
            .await
            .expect("food after lunch"),
        money("50.00")
    );
}

#[tokio::test]
async fn scenario_hierarchy_rollup_and_depth_cap() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("500.00"))
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;

    let food = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await
        .expect("food");
    let groceries = h
        .accounts
        .create_account(
            h.user_id,
            ledger.id,
            NewAccount::new("Groceries", AccountType::Expense).under(food.id),
        )
        .await
        .expect("groceries");
    let restaurants = h
        .accounts
        .create_account(
            h.user_id,
            ledger.id,
            NewAccount::new("Restaurants", AccountType::Expense).under(food.id),
        )
        .await
        .expect("restaurants");
    assert_eq!(groceries.depth, 2);

    h.spend(ledger.id, &cash, &groceries, "100.00", "weekly shop").await;
    h.spend(ledger.id, &cash, &restaurants, "75.00", "dinner out").await;

    for (account, expected) in [
        (&food, "175.00"),
        (&groceries, "100.00"),
        (&restaurants, "75.00"),
    ] {
        assert_eq!(
            h.accounts
                .balance_of(h.user_id, ledger.id, account.id, None)
                .await
                .expect("balance"),
            money(expected),
            "balance of {}",
            account.name
        );
    }

    // Depth 3 is allowed, a fourth level is not.
    let produce = h
        .accounts
        .create_account(
            h.user_id,
            ledger.id,
            NewAccount::new("Produce", AccountType::Expense).under(groceries.id),
        )
        .await
        .expect("grandchild at depth 3");
    assert_eq!(produce.depth, 3);

    let too_deep = h
        .accounts
        .create_account(
            h.user_id,
            ledger.id,
            NewAccount::new("Herbs", AccountType::Expense).under(produce.id),
        )
        .await;
    assert!(matches!(too_deep, Err(LedgerError::Validation(_))));
}

#[tokio::test]
async fn scenario_delete_with_reassignment() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("1000.00"))
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;

    let a = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("A", AccountType::Expense))
        .await
        .expect("a");
    let b = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("B", AccountType::Expense))
        .await
        .expect("b");

    for amount in ["10.00", "20.00", "30.00"] {
        h.spend(ledger.id, &cash, &a, amount, "spend").await;
    }

    let check = h
        .accounts
        .check_deletion(h.user_id, ledger.id, a.id)
        .await
        .expect("check");
    assert!(!check.can_delete);
    assert!(check.has_transactions);
    assert_eq!(check.transaction_count, 3);

    let refused = h.accounts.delete_account(h.user_id, ledger.id, a.id, None).await;
    assert!(matches!(refused, Err(LedgerError::Conflict(_))));

    h.accounts
        .delete_account(h.user_id, ledger.id, a.id, Some(b.id))
        .await
        .expect("delete with reassignment");

    let state = h.store.read().await;
    assert!(!state.accounts.contains_key(&a.id));
    assert_eq!(state.account_transaction_count(b.id), 3);
    let rows = abacus_audit::list(
        &state,
        &AuditLogFilter {
            ledger_id: Some(ledger.id),
            action: Some(AuditAction::Reassign),
            ..AuditLogFilter::default()
        },
    );
    assert_eq!(rows.len(), 1);
    let extra = rows[0].extra.as_ref().expect("extra");
    assert_eq!(extra["transaction_count"], 3);
    assert_eq!(extra["target"], serde_json::json!(b.id));
}

#[tokio::test]
async fn system_accounts_refuse_deletion_and_edits() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", Decimal::ZERO)
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;

    let deleted = h.accounts.delete_account(h.user_id, ledger.id, cash.id, None).await;
    assert!(matches!(deleted, Err(LedgerError::ForbiddenSystem(_))));
    let archived = h.accounts.archive_account(h.user_id, ledger.id, cash.id).await;
    assert!(matches!(archived, Err(LedgerError::ForbiddenSystem(_))));
}

#[tokio::test]
async fn clear_operations_preserve_what_they_promise() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("100.00"))
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;
    let food = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await
        .expect("food");
    h.spend(ledger.id, &cash, &food, "10.00", "snack").await;

    let deleted = h
        .ledgers
        .clear_transactions(h.user_id, ledger.id)
        .await
        .expect("clear transactions");
    assert_eq!(deleted, 2); // opening transfer + snack
    let state = h.store.read().await;
    assert_eq!(state.ledger_transaction_count(ledger.id), 0);
    assert_eq!(state.ledger_account_count(ledger.id), 3);
    drop(state);

    let outcome = h
        .ledgers
        .clear_accounts(h.user_id, ledger.id)
        .await
        .expect("clear accounts");
    assert_eq!(outcome.accounts_deleted, 3);
    let state = h.store.read().await;
    // The ledger survives with freshly recreated system accounts.
    assert!(state.ledgers.contains_key(&ledger.id));
    assert_eq!(state.ledger_account_count(ledger.id), 2);
    let names: Vec<&str> = state
        .accounts_in_ledger(ledger.id)
        .into_iter()
        .map(|account| account.name.as_str())
        .collect();
    assert!(names.contains(&"Cash"));
    assert!(names.contains(&"Equity"));
}

#[tokio::test]
async fn cascade_delete_removes_every_ledger_row() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("100.00"))
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;
    let food = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await
        .expect("food");
    h.spend(ledger.id, &cash, &food, "10.00", "snack").await;

    h.ledgers
        .delete_ledger(h.user_id, ledger.id)
        .await
        .expect("delete ledger");

    let state = h.store.read().await;
    assert!(!state.ledgers.contains_key(&ledger.id));
    assert_eq!(state.ledger_transaction_count(ledger.id), 0);
    assert_eq!(state.ledger_account_count(ledger.id), 0);
    // Only the terminal DELETE row remains for the ledger.
    let rows = abacus_audit::list(
        &state,
        &AuditLogFilter {
            ledger_id: Some(ledger.id),
            ..AuditLogFilter::default()
        },
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].action, AuditAction::Delete);
}

#[tokio::test]
async fn failed_mutations_leave_no_audit_rows() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("100.00"))
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;
    let equity = h.system_account(ledger.id, "Equity").await;

    let before = h.store.read().await.audit_logs.len();
    // EXPENSE into an ASSET account violates the type matrix.
    let refused = h
        .transactions
        .create_transaction(
            h.user_id,
            ledger.id,
            NewTransaction::new(
                Utc::now().date_naive(),
                "bad",
                money("5.00"),
                cash.id,
                equity.id,
                TransactionType::Expense,
            ),
        )
        .await;
    assert!(matches!(refused, Err(LedgerError::Validation(_))));
    assert_eq!(h.store.read().await.audit_logs.len(), before);
}

#[tokio::test]
async fn pagination_visits_each_row_once_and_absorbs_late_inserts() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", Decimal::ZERO)
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;
    let food = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await
        .expect("food");

    let base = NaiveDate::from_ymd_opt(2026, 1, 1).expect("date");
    for day in 0u64..25 {
        h.transactions
            .create_transaction(
                h.user_id,
                ledger.id,
                NewTransaction::new(
                    base + chrono::Days::new(day),
                    &format!("tx {day}"),
                    money("1.00"),
                    cash.id,
                    food.id,
                    TransactionType::Expense,
                ),
            )
            .await
            .expect("seed transaction");
    }

    let filter = TransactionFilter::default();
    let mut seen = std::collections::HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0;
    loop {
        let page = h
            .transactions
            .list_transactions(h.user_id, ledger.id, &filter, 10, cursor.as_deref())
            .await
            .expect("page");
        for tx in &page.items {
            assert!(seen.insert(tx.id), "row visited twice");
        }
        pages += 1;

        if pages == 1 {
            // A row dated before the cursor boundary, inserted between
            // pages, must still be served later.
            h.transactions
                .create_transaction(
                    h.user_id,
                    ledger.id,
                    NewTransaction::new(
                        base - chrono::Days::new(1),
                        "late insert",
                        money("1.00"),
                        cash.id,
                        food.id,
                        TransactionType::Expense,
                    ),
                )
                .await
                .expect("late insert");
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    assert!(pages <= 4, "cursor loop ran away: {pages} pages");
    assert_eq!(seen.len(), 26);
}

#[tokio::test]
async fn corrupt_cursors_degrade_to_first_page() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("10.00"))
        .await
        .expect("create ledger");

    let page = h
        .transactions
        .list_transactions(
            h.user_id,
            ledger.id,
            &TransactionFilter::default(),
            50,
            Some("!!not-a-cursor!!"),
        )
        .await
        .expect("listing with corrupt cursor");
    assert_eq!(page.items.len(), 1); // the opening transfer
    assert!(!page.has_more);
}

#[tokio::test]
async fn reparenting_revalidates_the_whole_subtree() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", Decimal::ZERO)
        .await
        .expect("create ledger");

    let top = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Top", AccountType::Expense))
        .await
        .expect("top");
    let mid = h
        .accounts
        .create_account(
            h.user_id,
            ledger.id,
            NewAccount::new("Mid", AccountType::Expense).under(top.id),
        )
        .await
        .expect("mid");
    h.accounts
        .create_account(
            h.user_id,
            ledger.id,
            NewAccount::new("Leaf", AccountType::Expense).under(mid.id),
        )
        .await
        .expect("leaf");
    let other = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Other", AccountType::Expense))
        .await
        .expect("other");

    // Top has height 3; placing it under another root would need 4 levels.
    let refused = h
        .accounts
        .update_account(
            h.user_id,
            ledger.id,
            top.id,
            abacus_ledger::AccountUpdate {
                parent_id: Some(Some(other.id)),
                ..abacus_ledger::AccountUpdate::default()
            },
        )
        .await;
    assert!(matches!(refused, Err(LedgerError::Validation(_))));

    // Mid (height 2) fits under Other (depth 1) and its leaf lands at 3.
    let moved = h
        .accounts
        .update_account(
            h.user_id,
            ledger.id,
            mid.id,
            abacus_ledger::AccountUpdate {
                parent_id: Some(Some(other.id)),
                ..abacus_ledger::AccountUpdate::default()
            },
        )
        .await
        .expect("move mid");
    assert_eq!(moved.depth, 2);
    let state = h.store.read().await;
    let leaf_depths: Vec<i32> = state
        .accounts_in_ledger(ledger.id)
        .into_iter()
        .filter(|account| account.name == "Leaf")
        .map(|account| account.depth)
        .collect();
    assert_eq!(leaf_depths, vec![3]);
}

#[tokio::test]
async fn transactions_carry_tags_and_deleted_tags_detach() {
    let h = Harness::new();
    let tags = abacus_ledger::TagEngine::new(h.store.clone());
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", money("100.00"))
        .await
        .expect("create ledger");
    let cash = h.system_account(ledger.id, "Cash").await;
    let food = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Food", AccountType::Expense))
        .await
        .expect("food");

    let work = tags.create_tag("work", None).await.expect("work tag");
    let travel = tags.create_tag("travel", None).await.expect("travel tag");

    let mut new = NewTransaction::new(
        Utc::now().date_naive(),
        "client lunch",
        money("45.00"),
        cash.id,
        food.id,
        TransactionType::Expense,
    );
    new.tag_ids = vec![work.id, travel.id];
    let tx = h
        .transactions
        .create_transaction(h.user_id, ledger.id, new.clone())
        .await
        .expect("tagged transaction");
    assert_eq!(tx.tag_ids, vec![work.id, travel.id]);

    // Unknown tag ids are rejected before anything is written.
    let mut bogus = new.clone();
    bogus.tag_ids = vec![Uuid::new_v4()];
    let refused = h
        .transactions
        .create_transaction(h.user_id, ledger.id, bogus)
        .await;
    assert!(matches!(refused, Err(LedgerError::NotFound(_))));

    // An update can retag.
    let mut retagged = new;
    retagged.tag_ids = vec![work.id];
    let updated = h
        .transactions
        .update_transaction(h.user_id, ledger.id, tx.id, retagged)
        .await
        .expect("retag");
    assert_eq!(updated.tag_ids, vec![work.id]);

    // Deleting the tag detaches it without touching the transaction.
    tags.delete_tag(work.id).await.expect("delete tag");
    let stored = h
        .transactions
        .get_transaction(h.user_id, ledger.id, tx.id)
        .await
        .expect("transaction survives");
    assert!(stored.tag_ids.is_empty());
}

#[tokio::test]
async fn archived_names_can_be_reused() {
    let h = Harness::new();
    let ledger = h
        .ledgers
        .create_ledger(h.user_id, "Book", Decimal::ZERO)
        .await
        .expect("create ledger");

    let first = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Gym", AccountType::Expense))
        .await
        .expect("gym");
    let duplicate = h
        .accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Gym", AccountType::Expense))
        .await;
    assert!(matches!(duplicate, Err(LedgerError::Conflict(_))));

    h.accounts
        .archive_account(h.user_id, ledger.id, first.id)
        .await
        .expect("archive");
    h.accounts
        .create_account(h.user_id, ledger.id, NewAccount::new("Gym", AccountType::Expense))
        .await
        .expect("name reusable after archive");

    // But the archived row cannot come back while the name is taken.
    let blocked = h.accounts.unarchive_account(h.user_id, ledger.id, first.id).await;
    assert!(matches!(blocked, Err(LedgerError::Conflict(_))));
}
