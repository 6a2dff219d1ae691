use std::sync::Arc;

use abacus_audit::ENTITY_LEDGER;
use abacus_audit::record_action;
use abacus_audit::record_create;
use abacus_audit::record_delete;
use abacus_audit::record_update;
use abacus_audit::snapshot;
use abacus_model::Account;
use abacus_model::AccountType;
use abacus_model::AuditAction;
use abacus_model::Ledger;
use abacus_model::LedgerId;
use abacus_model::SORT_ORDER_GAP;
use abacus_model::SYSTEM_CASH_NAME;
use abacus_model::SYSTEM_EQUITY_NAME;
use abacus_model::Transaction;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_model::round_money;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::LedgerError;
use crate::LedgerResult;
use crate::owned_ledger;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearAccountsOutcome {
    pub transactions_deleted: usize,
    pub accounts_deleted: usize,
}

#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<MemoryStore>,
}

impl LedgerEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    /// Creates the ledger, its two system accounts, and — when the initial
    /// balance is positive — the Equity→Cash opening transfer, in one unit.
    pub async fn create_ledger(
        &self,
        user_id: UserId,
        name: &str,
        initial_balance: Decimal,
    ) -> LedgerResult<Ledger> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("ledger name cannot be empty".into()));
        }
        if initial_balance < Decimal::ZERO {
            return Err(LedgerError::Validation(
                "initial balance cannot be negative".into(),
            ));
        }
        let initial_balance = round_money(initial_balance);

        let mut uow = self.store.unit_of_work().await;
        let now = Utc::now();
        let ledger = Ledger {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            initial_balance,
            created_at: now,
        };
        uow.ledgers.insert(ledger.id, ledger.clone());

        let cash = system_account(ledger.id, SYSTEM_CASH_NAME, SORT_ORDER_GAP);
        let equity = system_account(ledger.id, SYSTEM_EQUITY_NAME, SORT_ORDER_GAP * 2);
        uow.accounts.insert(cash.id, cash.clone());
        uow.accounts.insert(equity.id, equity.clone());

        if initial_balance > Decimal::ZERO {
            let opening = Transaction {
                id: Uuid::new_v4(),
                ledger_id: ledger.id,
                date: now.date_naive(),
                description: "Initial balance".into(),
                amount: initial_balance,
                from_account_id: equity.id,
                to_account_id: cash.id,
                transaction_type: TransactionType::Transfer,
                notes: None,
                amount_expression: None,
                recurring_template_id: None,
                installment_plan_id: None,
                installment_number: None,
                source_channel: None,
                channel_message_id: None,
                tag_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            uow.transactions.insert(opening.id, opening);
        }

        record_create(&mut uow, ledger.id, ENTITY_LEDGER, ledger.id, snapshot(&ledger));
        uow.commit();
        info!(ledger_id = %ledger.id, "created ledger");
        Ok(ledger)
    }

    pub async fn get_ledger(&self, user_id: UserId, ledger_id: LedgerId) -> LedgerResult<Ledger> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)
    }

    pub async fn list_ledgers_for_user(&self, user_id: UserId) -> Vec<Ledger> {
        let state = self.store.read().await;
        let mut ledgers: Vec<Ledger> = state
            .ledgers
            .values()
            .filter(|ledger| ledger.user_id == user_id)
            .cloned()
            .collect();
        ledgers.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        ledgers
    }

    pub async fn update_name(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        name: &str,
    ) -> LedgerResult<Ledger> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("ledger name cannot be empty".into()));
        }

        let mut uow = self.store.unit_of_work().await;
        let old = owned_ledger(&uow, user_id, ledger_id)?;
        let mut updated = old.clone();
        updated.name = name.to_string();
        uow.ledgers.insert(ledger_id, updated.clone());
        record_update(
            &mut uow,
            ledger_id,
            ENTITY_LEDGER,
            ledger_id,
            snapshot(&old),
            snapshot(&updated),
        );
        uow.commit();
        Ok(updated)
    }

    /// Cascade: transactions → templates → accounts → audit rows → import
    /// sessions → ledger, leaves first, one unit. The closing DELETE row is
    /// appended after the purge so the deletion itself stays on record.
    pub async fn delete_ledger(&self, user_id: UserId, ledger_id: LedgerId) -> LedgerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        let ledger = owned_ledger(&uow, user_id, ledger_id)?;

        purge_ledger_rows(&mut uow, ledger_id);
        uow.ledgers.remove(&ledger_id);
        record_delete(&mut uow, ledger_id, ENTITY_LEDGER, ledger_id, snapshot(&ledger));
        uow.commit();
        info!(ledger_id = %ledger_id, "deleted ledger");
        Ok(())
    }

    /// Deletes every transaction but preserves the chart of accounts,
    /// system accounts included.
    pub async fn clear_transactions(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> LedgerResult<usize> {
        let mut uow = self.store.unit_of_work().await;
        let ledger = owned_ledger(&uow, user_id, ledger_id)?;

        let before = uow.transactions.len();
        uow.transactions.retain(|_, tx| tx.ledger_id != ledger_id);
        let deleted = before - uow.transactions.len();

        record_action(
            &mut uow,
            ledger_id,
            ENTITY_LEDGER,
            ledger_id,
            AuditAction::Update,
            Some(snapshot(&ledger)),
            Some(snapshot(&ledger)),
            Some(serde_json::json!({ "transactions_deleted": deleted })),
        );
        uow.commit();
        Ok(deleted)
    }

    /// Deletes all transactions and all accounts, then recreates the two
    /// system accounts with zero balance. Unlike `delete_ledger`, the
    /// ledger row itself survives.
    pub async fn clear_accounts(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> LedgerResult<ClearAccountsOutcome> {
        let mut uow = self.store.unit_of_work().await;
        let ledger = owned_ledger(&uow, user_id, ledger_id)?;

        let tx_before = uow.transactions.len();
        uow.transactions.retain(|_, tx| tx.ledger_id != ledger_id);
        let transactions_deleted = tx_before - uow.transactions.len();

        let acc_before = uow.accounts.len();
        uow.accounts
            .retain(|_, account| account.ledger_id != ledger_id);
        let accounts_deleted = acc_before - uow.accounts.len();

        let cash = system_account(ledger_id, SYSTEM_CASH_NAME, SORT_ORDER_GAP);
        let equity = system_account(ledger_id, SYSTEM_EQUITY_NAME, SORT_ORDER_GAP * 2);
        uow.accounts.insert(cash.id, cash);
        uow.accounts.insert(equity.id, equity);

        record_action(
            &mut uow,
            ledger_id,
            ENTITY_LEDGER,
            ledger_id,
            AuditAction::Update,
            Some(snapshot(&ledger)),
            Some(snapshot(&ledger)),
            Some(serde_json::json!({
                "transactions_deleted": transactions_deleted,
                "accounts_deleted": accounts_deleted,
            })),
        );
        uow.commit();
        Ok(ClearAccountsOutcome {
            transactions_deleted,
            accounts_deleted,
        })
    }
}

fn system_account(ledger_id: LedgerId, name: &str, sort_order: i64) -> Account {
    let now = Utc::now();
    Account {
        id: Uuid::new_v4(),
        ledger_id,
        name: name.to_string(),
        account_type: AccountType::Asset,
        balance_cache: Decimal::ZERO,
        is_system: true,
        parent_id: None,
        depth: 1,
        sort_order,
        is_archived: false,
        archived_at: None,
        created_at: now,
        updated_at: now,
    }
}

fn purge_ledger_rows(state: &mut State, ledger_id: LedgerId) {
    state.transactions.retain(|_, tx| tx.ledger_id != ledger_id);
    state.templates.retain(|_, t| t.ledger_id != ledger_id);
    state
        .recurring_templates
        .retain(|_, t| t.ledger_id != ledger_id);
    state
        .installment_plans
        .retain(|_, plan| plan.ledger_id != ledger_id);
    state
        .accounts
        .retain(|_, account| account.ledger_id != ledger_id);
    state.audit_logs.retain(|row| row.ledger_id != ledger_id);
    let expired: Vec<Uuid> = state
        .import_sessions
        .values()
        .filter(|session| session.ledger_id == ledger_id)
        .map(|session| session.id)
        .collect();
    for session_id in expired {
        state.import_sessions.remove(&session_id);
        state.import_sources.remove(&session_id);
    }
    state
        .email_connections
        .retain(|_, conn| conn.ledger_id != ledger_id);
}
