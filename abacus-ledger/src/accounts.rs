use std::collections::HashMap;
use std::sync::Arc;

use abacus_audit::ENTITY_ACCOUNT;
use abacus_audit::record_create;
use abacus_audit::record_delete;
use abacus_audit::record_reassign;
use abacus_audit::record_update;
use abacus_audit::snapshot;
use abacus_model::Account;
use abacus_model::AccountId;
use abacus_model::AccountType;
use abacus_model::LedgerId;
use abacus_model::MAX_ACCOUNT_DEPTH;
use abacus_model::SORT_ORDER_GAP;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::LedgerError;
use crate::LedgerResult;
use crate::balance::aggregated_balance;
use crate::balance::leaf_balances;
use crate::owned_ledger;

#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub account_type: AccountType,
    pub parent_id: Option<AccountId>,
    pub sort_order: Option<i64>,
}

impl NewAccount {
    #[must_use]
    pub fn new(name: &str, account_type: AccountType) -> Self {
        Self {
            name: name.to_string(),
            account_type,
            parent_id: None,
            sort_order: None,
        }
    }

    #[must_use]
    pub fn under(mut self, parent_id: AccountId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Partial update; `parent_id` distinguishes "leave alone" (`None`) from
/// "move to root" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub name: Option<String>,
    pub parent_id: Option<Option<AccountId>>,
    pub sort_order: Option<i64>,
}

/// What stands between an account and its deletion, reported before the
/// caller decides whether to reassign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionCheck {
    pub can_delete: bool,
    pub has_children: bool,
    pub has_transactions: bool,
    pub transaction_count: usize,
    pub child_count: usize,
}

/// One node of the chart-of-accounts tree with its aggregated balance.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountNode {
    pub account: Account,
    pub balance: Decimal,
    pub children: Vec<AccountNode>,
}

#[derive(Clone)]
pub struct AccountEngine {
    store: Arc<MemoryStore>,
}

impl AccountEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_account(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        new: NewAccount,
    ) -> LedgerResult<Account> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;

        let name = new.name.trim().to_string();
        if name.is_empty() {
            return Err(LedgerError::Validation("account name cannot be empty".into()));
        }
        ensure_name_free(&uow, ledger_id, &name, None)?;

        let depth = match new.parent_id {
            None => 1,
            Some(parent_id) => {
                let parent = account_in_ledger(&uow, ledger_id, parent_id)?;
                if parent.account_type != new.account_type {
                    return Err(LedgerError::Validation(
                        "child account must share its parent's type".into(),
                    ));
                }
                if parent.depth + 1 > MAX_ACCOUNT_DEPTH {
                    return Err(LedgerError::Validation(format!(
                        "account hierarchy is limited to {MAX_ACCOUNT_DEPTH} levels"
                    )));
                }
                parent.depth + 1
            }
        };

        let sort_order = new
            .sort_order
            .unwrap_or_else(|| next_sort_order(&uow, ledger_id, new.parent_id));
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            ledger_id,
            name,
            account_type: new.account_type,
            balance_cache: Decimal::ZERO,
            is_system: false,
            parent_id: new.parent_id,
            depth,
            sort_order,
            is_archived: false,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        uow.accounts.insert(account.id, account.clone());
        record_create(&mut uow, ledger_id, ENTITY_ACCOUNT, account.id, snapshot(&account));
        uow.commit();
        Ok(account)
    }

    pub async fn get_account(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
    ) -> LedgerResult<Account> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        account_in_ledger(&state, ledger_id, account_id)
    }

    /// Rename, reorder, or re-parent. Moving a subtree revalidates depth
    /// for the subtree as a whole: height `h` under a parent of depth `d`
    /// requires `d + h <= 3`.
    pub async fn update_account(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
        update: AccountUpdate,
    ) -> LedgerResult<Account> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = account_in_ledger(&uow, ledger_id, account_id)?;
        if old.is_system {
            return Err(LedgerError::ForbiddenSystem(old.name.clone()));
        }

        let mut updated = old.clone();
        if let Some(name) = update.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(LedgerError::Validation("account name cannot be empty".into()));
            }
            if name != old.name {
                ensure_name_free(&uow, ledger_id, &name, Some(account_id))?;
            }
            updated.name = name;
        }
        if let Some(sort_order) = update.sort_order {
            updated.sort_order = sort_order;
        }

        if let Some(new_parent) = update.parent_id
            && new_parent != old.parent_id
        {
            let height = subtree_height(&uow, account_id);
            let new_depth = match new_parent {
                None => 1,
                Some(parent_id) => {
                    if parent_id == account_id || subtree_ids(&uow, account_id).contains(&parent_id)
                    {
                        return Err(LedgerError::Validation(
                            "an account cannot be moved under its own subtree".into(),
                        ));
                    }
                    let parent = account_in_ledger(&uow, ledger_id, parent_id)?;
                    if parent.account_type != old.account_type {
                        return Err(LedgerError::Validation(
                            "child account must share its parent's type".into(),
                        ));
                    }
                    if parent.depth + height > MAX_ACCOUNT_DEPTH {
                        return Err(LedgerError::Validation(format!(
                            "moving this subtree would exceed {MAX_ACCOUNT_DEPTH} levels"
                        )));
                    }
                    parent.depth + 1
                }
            };
            updated.parent_id = new_parent;
            updated.depth = new_depth;
        }

        updated.updated_at = Utc::now();
        uow.accounts.insert(account_id, updated.clone());
        reflow_subtree_depths(&mut uow, account_id);
        let updated = uow
            .accounts
            .get(&account_id)
            .cloned()
            .ok_or_else(|| LedgerError::Internal("account vanished mid-update".into()))?;

        record_update(
            &mut uow,
            ledger_id,
            ENTITY_ACCOUNT,
            account_id,
            snapshot(&old),
            snapshot(&updated),
        );
        uow.commit();
        Ok(updated)
    }

    /// Archived accounts drop out of the uniqueness check so their name can
    /// be reused; the rows and their transactions stay.
    pub async fn archive_account(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
    ) -> LedgerResult<Account> {
        self.set_archived(user_id, ledger_id, account_id, true).await
    }

    pub async fn unarchive_account(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
    ) -> LedgerResult<Account> {
        self.set_archived(user_id, ledger_id, account_id, false).await
    }

    async fn set_archived(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
        archived: bool,
    ) -> LedgerResult<Account> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = account_in_ledger(&uow, ledger_id, account_id)?;
        if old.is_system {
            return Err(LedgerError::ForbiddenSystem(old.name.clone()));
        }
        if old.is_archived == archived {
            return Ok(old);
        }
        if !archived {
            ensure_name_free(&uow, ledger_id, &old.name, Some(account_id))?;
        }

        let mut updated = old.clone();
        updated.is_archived = archived;
        updated.archived_at = archived.then(Utc::now);
        updated.updated_at = Utc::now();
        uow.accounts.insert(account_id, updated.clone());
        record_update(
            &mut uow,
            ledger_id,
            ENTITY_ACCOUNT,
            account_id,
            snapshot(&old),
            snapshot(&updated),
        );
        uow.commit();
        Ok(updated)
    }

    pub async fn check_deletion(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
    ) -> LedgerResult<DeletionCheck> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        let account = account_in_ledger(&state, ledger_id, account_id)?;

        let child_count = state.child_accounts(account_id).len();
        let transaction_count = state.account_transaction_count(account_id);
        Ok(DeletionCheck {
            can_delete: !account.is_system && child_count == 0 && transaction_count == 0,
            has_children: child_count > 0,
            has_transactions: transaction_count > 0,
            transaction_count,
            child_count,
        })
    }

    /// Deletes an account. When it still carries transactions the caller
    /// must name a replacement leaf of the same type in the same ledger;
    /// every referencing transaction is rewritten to the replacement and a
    /// REASSIGN row records the move — all in one unit.
    pub async fn delete_account(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
        replacement: Option<AccountId>,
    ) -> LedgerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let account = account_in_ledger(&uow, ledger_id, account_id)?;
        if account.is_system {
            return Err(LedgerError::ForbiddenSystem(account.name.clone()));
        }
        if uow.has_child_accounts(account_id) {
            return Err(LedgerError::Conflict("account has child accounts".into()));
        }

        let transaction_count = uow.account_transaction_count(account_id);
        if transaction_count == 0 {
            uow.accounts.remove(&account_id);
            record_delete(&mut uow, ledger_id, ENTITY_ACCOUNT, account_id, snapshot(&account));
            uow.commit();
            return Ok(());
        }

        let Some(replacement_id) = replacement else {
            return Err(LedgerError::Conflict("account has transactions".into()));
        };
        if replacement_id == account_id {
            return Err(LedgerError::Validation(
                "replacement must differ from the account being deleted".into(),
            ));
        }
        let target = account_in_ledger(&uow, ledger_id, replacement_id)?;
        if target.account_type != account.account_type {
            return Err(LedgerError::Validation(
                "replacement must be of the same account type".into(),
            ));
        }
        if uow.has_child_accounts(replacement_id) {
            return Err(LedgerError::Validation("replacement must be a leaf account".into()));
        }
        if target.is_archived {
            return Err(LedgerError::Validation("replacement is archived".into()));
        }

        for tx in uow.transactions.values_mut() {
            if tx.from_account_id == account_id {
                tx.from_account_id = replacement_id;
            }
            if tx.to_account_id == account_id {
                tx.to_account_id = replacement_id;
            }
        }
        uow.accounts.remove(&account_id);
        record_reassign(
            &mut uow,
            ledger_id,
            ENTITY_ACCOUNT,
            account_id,
            serde_json::json!({
                "source": account_id,
                "target": replacement_id,
                "transaction_count": transaction_count,
            }),
        );
        uow.commit();
        info!(
            source = %account_id,
            target = %replacement_id,
            transaction_count,
            "deleted account with reassignment"
        );
        Ok(())
    }

    pub async fn list_accounts(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        type_filter: Option<AccountType>,
        include_archived: bool,
    ) -> LedgerResult<Vec<Account>> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        Ok(state
            .accounts_in_ledger(ledger_id)
            .into_iter()
            .filter(|account| type_filter.is_none_or(|ty| account.account_type == ty))
            .filter(|account| include_archived || !account.is_archived)
            .cloned()
            .collect())
    }

    /// Root accounts with nested children; every node carries its
    /// aggregated balance over the full transaction log.
    pub async fn account_tree(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        type_filter: Option<AccountType>,
    ) -> LedgerResult<Vec<AccountNode>> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        let balances = leaf_balances(&state, ledger_id, None);

        let mut children_of: HashMap<Option<AccountId>, Vec<&Account>> = HashMap::new();
        for account in state.accounts_in_ledger(ledger_id) {
            if account.is_archived {
                continue;
            }
            if type_filter.is_some_and(|ty| account.account_type != ty) {
                continue;
            }
            children_of.entry(account.parent_id).or_default().push(account);
        }
        for siblings in children_of.values_mut() {
            siblings.sort_by_key(|account| (account.sort_order, account.id));
        }

        fn build(
            state: &State,
            children_of: &HashMap<Option<AccountId>, Vec<&Account>>,
            balances: &HashMap<AccountId, Decimal>,
            account: &Account,
        ) -> AccountNode {
            let children = children_of
                .get(&Some(account.id))
                .map(|kids| {
                    kids.iter()
                        .map(|child| build(state, children_of, balances, child))
                        .collect()
                })
                .unwrap_or_default();
            AccountNode {
                account: account.clone(),
                balance: aggregated_balance(state, account.id, balances),
                children,
            }
        }

        Ok(children_of
            .get(&None)
            .map(|roots| {
                roots
                    .iter()
                    .map(|root| build(&state, &children_of, &balances, root))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Authoritative aggregated balance at a reference date, derived from
    /// the transaction log — never the cache.
    pub async fn balance_of(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        account_id: AccountId,
        as_of: Option<NaiveDate>,
    ) -> LedgerResult<Decimal> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        account_in_ledger(&state, ledger_id, account_id)?;
        let balances = leaf_balances(&state, ledger_id, as_of);
        Ok(aggregated_balance(&state, account_id, &balances))
    }
}

pub(crate) fn account_in_ledger(
    state: &State,
    ledger_id: LedgerId,
    account_id: AccountId,
) -> LedgerResult<Account> {
    state
        .accounts
        .get(&account_id)
        .filter(|account| account.ledger_id == ledger_id)
        .cloned()
        .ok_or_else(|| LedgerError::NotFound(format!("account {account_id}")))
}

fn ensure_name_free(
    state: &State,
    ledger_id: LedgerId,
    name: &str,
    excluding: Option<AccountId>,
) -> LedgerResult<()> {
    let taken = state.accounts.values().any(|account| {
        account.ledger_id == ledger_id
            && !account.is_archived
            && account.name == name
            && excluding != Some(account.id)
    });
    if taken {
        Err(LedgerError::Conflict(format!(
            "account name '{name}' already exists"
        )))
    } else {
        Ok(())
    }
}

fn next_sort_order(state: &State, ledger_id: LedgerId, parent_id: Option<AccountId>) -> i64 {
    state
        .accounts
        .values()
        .filter(|account| account.ledger_id == ledger_id && account.parent_id == parent_id)
        .map(|account| account.sort_order)
        .max()
        .unwrap_or(0)
        + SORT_ORDER_GAP
}

fn subtree_ids(state: &State, root: AccountId) -> Vec<AccountId> {
    let mut ids = vec![root];
    let mut frontier = vec![root];
    while let Some(current) = frontier.pop() {
        for child in state.child_accounts(current) {
            ids.push(child.id);
            frontier.push(child.id);
        }
    }
    ids
}

fn subtree_height(state: &State, root: AccountId) -> i32 {
    1 + state
        .child_accounts(root)
        .iter()
        .map(|child| subtree_height(state, child.id))
        .max()
        .unwrap_or(0)
}

/// After a move, pin every descendant's depth to parent depth + 1.
fn reflow_subtree_depths(state: &mut State, root: AccountId) {
    let mut frontier = vec![root];
    while let Some(current) = frontier.pop() {
        let parent_depth = match state.accounts.get(&current) {
            Some(account) => account.depth,
            None => continue,
        };
        let child_ids: Vec<AccountId> = state
            .child_accounts(current)
            .iter()
            .map(|child| child.id)
            .collect();
        for child_id in child_ids {
            if let Some(child) = state.accounts.get_mut(&child_id) {
                child.depth = parent_depth + 1;
            }
            frontier.push(child_id);
        }
    }
}
