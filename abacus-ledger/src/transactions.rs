use std::sync::Arc;

use abacus_audit::ENTITY_TRANSACTION;
use abacus_audit::record_create;
use abacus_audit::record_delete;
use abacus_audit::record_update;
use abacus_audit::snapshot;
use abacus_model::AccountId;
use abacus_model::Channel;
use abacus_model::InstallmentPlanId;
use abacus_model::LedgerId;
use abacus_model::RecurringTemplateId;
use abacus_model::TagId;
use abacus_model::Transaction;
use abacus_model::TransactionId;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_model::is_valid_amount;
use abacus_model::transaction_type_matches;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::LedgerError;
use crate::LedgerResult;
use crate::accounts::account_in_ledger;
use crate::cursor::decode_cursor;
use crate::cursor::encode_cursor;
use crate::owned_ledger;
use crate::tags::ensure_tags_exist;

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub transaction_type: TransactionType,
    pub notes: Option<String>,
    pub amount_expression: Option<String>,
    pub recurring_template_id: Option<RecurringTemplateId>,
    pub installment_plan_id: Option<InstallmentPlanId>,
    pub installment_number: Option<i32>,
    pub source_channel: Option<Channel>,
    pub channel_message_id: Option<String>,
    pub tag_ids: Vec<TagId>,
}

impl NewTransaction {
    #[must_use]
    pub fn new(
        date: NaiveDate,
        description: &str,
        amount: Decimal,
        from_account_id: AccountId,
        to_account_id: AccountId,
        transaction_type: TransactionType,
    ) -> Self {
        Self {
            date,
            description: description.to_string(),
            amount,
            from_account_id,
            to_account_id,
            transaction_type,
            notes: None,
            amount_expression: None,
            recurring_template_id: None,
            installment_plan_id: None,
            installment_number: None,
            source_channel: None,
            channel_message_id: None,
            tag_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Case-insensitive substring match against the description.
    pub search: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// Matches the account on either side of the posting.
    pub account_id: Option<AccountId>,
    pub transaction_type: Option<TransactionType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionPage {
    pub items: Vec<Transaction>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// The double-entry gate. Checks amount, account distinctness, ledger
/// membership, leaf-ness, archival, and the `(type, from.type, to.type)`
/// matrix; shared by every path that posts — manual entry, templates,
/// imports, and the scheduler.
pub fn validate_posting(
    state: &State,
    ledger_id: LedgerId,
    amount: Decimal,
    from_account_id: AccountId,
    to_account_id: AccountId,
    transaction_type: TransactionType,
) -> LedgerResult<()> {
    if !is_valid_amount(amount) {
        return Err(LedgerError::Validation(
            "amount must be positive with at most two decimal places".into(),
        ));
    }
    if from_account_id == to_account_id {
        return Err(LedgerError::Validation(
            "from and to accounts must be different".into(),
        ));
    }
    let from = account_in_ledger(state, ledger_id, from_account_id)?;
    let to = account_in_ledger(state, ledger_id, to_account_id)?;
    for account in [&from, &to] {
        if state.has_child_accounts(account.id) {
            return Err(LedgerError::Validation(format!(
                "account '{}' is not a leaf account",
                account.name
            )));
        }
        if account.is_archived {
            return Err(LedgerError::Validation(format!(
                "account '{}' is archived",
                account.name
            )));
        }
    }
    if !transaction_type_matches(transaction_type, from.account_type, to.account_type) {
        return Err(LedgerError::Validation(format!(
            "{} does not accept {} -> {}",
            transaction_type, from.account_type, to.account_type
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct TransactionEngine {
    store: Arc<MemoryStore>,
}

impl TransactionEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_transaction(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        new: NewTransaction,
    ) -> LedgerResult<Transaction> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        validate_posting(
            &uow,
            ledger_id,
            new.amount,
            new.from_account_id,
            new.to_account_id,
            new.transaction_type,
        )?;
        ensure_tags_exist(&uow, &new.tag_ids)?;

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            ledger_id,
            date: new.date,
            description: new.description,
            amount: new.amount,
            from_account_id: new.from_account_id,
            to_account_id: new.to_account_id,
            transaction_type: new.transaction_type,
            notes: new.notes,
            amount_expression: new.amount_expression,
            recurring_template_id: new.recurring_template_id,
            installment_plan_id: new.installment_plan_id,
            installment_number: new.installment_number,
            source_channel: new.source_channel,
            channel_message_id: new.channel_message_id,
            tag_ids: new.tag_ids,
            created_at: now,
            updated_at: now,
        };
        uow.transactions.insert(tx.id, tx.clone());
        record_create(&mut uow, ledger_id, ENTITY_TRANSACTION, tx.id, snapshot(&tx));
        uow.commit();
        Ok(tx)
    }

    pub async fn get_transaction(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        transaction_id: TransactionId,
    ) -> LedgerResult<Transaction> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        transaction_in_ledger(&state, ledger_id, transaction_id)
    }

    /// Full replacement of the mutable posting fields.
    pub async fn update_transaction(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        transaction_id: TransactionId,
        new: NewTransaction,
    ) -> LedgerResult<Transaction> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = transaction_in_ledger(&uow, ledger_id, transaction_id)?;
        validate_posting(
            &uow,
            ledger_id,
            new.amount,
            new.from_account_id,
            new.to_account_id,
            new.transaction_type,
        )?;
        ensure_tags_exist(&uow, &new.tag_ids)?;

        let mut updated = old.clone();
        updated.date = new.date;
        updated.description = new.description;
        updated.amount = new.amount;
        updated.from_account_id = new.from_account_id;
        updated.to_account_id = new.to_account_id;
        updated.transaction_type = new.transaction_type;
        updated.notes = new.notes;
        updated.amount_expression = new.amount_expression;
        updated.tag_ids = new.tag_ids;
        updated.updated_at = Utc::now();
        uow.transactions.insert(transaction_id, updated.clone());
        record_update(
            &mut uow,
            ledger_id,
            ENTITY_TRANSACTION,
            transaction_id,
            snapshot(&old),
            snapshot(&updated),
        );
        uow.commit();
        Ok(updated)
    }

    pub async fn delete_transaction(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        transaction_id: TransactionId,
    ) -> LedgerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = transaction_in_ledger(&uow, ledger_id, transaction_id)?;
        uow.transactions.remove(&transaction_id);
        record_delete(
            &mut uow,
            ledger_id,
            ENTITY_TRANSACTION,
            transaction_id,
            snapshot(&old),
        );
        uow.commit();
        Ok(())
    }

    /// Filtered listing in `(date desc, id desc)` order with cursor
    /// pagination. The cursor is a strict upper bound, so rows inserted
    /// behind it after a page was served still appear on a later page.
    pub async fn list_transactions(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        filter: &TransactionFilter,
        limit: usize,
        cursor: Option<&str>,
    ) -> LedgerResult<TransactionPage> {
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(LedgerError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;

        let boundary = cursor.and_then(decode_cursor);
        let search = filter.search.as_ref().map(|s| s.to_lowercase());
        let matching: Vec<&Transaction> = state
            .transactions_in_ledger(ledger_id)
            .into_iter()
            .filter(|tx| {
                search
                    .as_ref()
                    .is_none_or(|needle| tx.description.to_lowercase().contains(needle))
                    && filter.from_date.is_none_or(|from| tx.date >= from)
                    && filter.to_date.is_none_or(|to| tx.date <= to)
                    && filter.account_id.is_none_or(|account| {
                        tx.from_account_id == account || tx.to_account_id == account
                    })
                    && filter
                        .transaction_type
                        .is_none_or(|ty| tx.transaction_type == ty)
            })
            .filter(|tx| {
                boundary.is_none_or(|(date, id)| (tx.date, tx.id) < (date, id))
            })
            .collect();

        let has_more = matching.len() > limit;
        let items: Vec<Transaction> = matching.into_iter().take(limit).cloned().collect();
        let next_cursor = if has_more {
            items.last().map(|tx| encode_cursor(tx.date, tx.id))
        } else {
            None
        };
        Ok(TransactionPage {
            items,
            next_cursor,
            has_more,
        })
    }
}

fn transaction_in_ledger(
    state: &State,
    ledger_id: LedgerId,
    transaction_id: TransactionId,
) -> LedgerResult<Transaction> {
    state
        .transactions
        .get(&transaction_id)
        .filter(|tx| tx.ledger_id == ledger_id)
        .cloned()
        .ok_or_else(|| LedgerError::NotFound(format!("transaction {transaction_id}")))
}
