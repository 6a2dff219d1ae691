use std::collections::HashMap;

use abacus_model::AccountId;
use abacus_model::EntrySide;
use abacus_model::LedgerId;
use abacus_model::balance_contribution;
use abacus_store::State;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Per-account direct balances derived from the transaction log, counting
/// every transaction dated at or before `as_of` (all of them when `None`).
///
/// The `to` account is the debit side and the `from` account the credit
/// side; each posting contributes per the account's normal side. Accounts
/// with no postings are present with a zero balance.
#[must_use]
pub fn leaf_balances(
    state: &State,
    ledger_id: LedgerId,
    as_of: Option<NaiveDate>,
) -> HashMap<AccountId, Decimal> {
    let mut balances: HashMap<AccountId, Decimal> = state
        .accounts
        .values()
        .filter(|account| account.ledger_id == ledger_id)
        .map(|account| (account.id, Decimal::ZERO))
        .collect();

    for tx in state.transactions.values() {
        if tx.ledger_id != ledger_id {
            continue;
        }
        if let Some(limit) = as_of
            && tx.date > limit
        {
            continue;
        }
        if let Some(to) = state.accounts.get(&tx.to_account_id) {
            let entry = balances.entry(tx.to_account_id).or_default();
            *entry += balance_contribution(to.account_type, EntrySide::Debit, tx.amount);
        }
        if let Some(from) = state.accounts.get(&tx.from_account_id) {
            let entry = balances.entry(tx.from_account_id).or_default();
            *entry += balance_contribution(from.account_type, EntrySide::Credit, tx.amount);
        }
    }

    balances
}

/// Direct balance plus the recursive sum of the children's aggregates. The
/// aggregate is always computed, never read from `balance_cache`.
#[must_use]
pub fn aggregated_balance(
    state: &State,
    account_id: AccountId,
    balances: &HashMap<AccountId, Decimal>,
) -> Decimal {
    let own = balances.get(&account_id).copied().unwrap_or(Decimal::ZERO);
    state
        .child_accounts(account_id)
        .iter()
        .fold(own, |total, child| {
            total + aggregated_balance(state, child.id, balances)
        })
}
