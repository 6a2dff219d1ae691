use std::collections::HashMap;

use abacus_model::Account;
use abacus_model::AccountId;
use abacus_model::ApiToken;
use abacus_model::ApiTokenId;
use abacus_model::AuditLog;
use abacus_model::ChannelBinding;
use abacus_model::ChannelBindingId;
use abacus_model::EmailConnection;
use abacus_model::EmailConnectionId;
use abacus_model::ImportSession;
use abacus_model::ImportSessionId;
use abacus_model::InstallmentPlan;
use abacus_model::InstallmentPlanId;
use abacus_model::Ledger;
use abacus_model::LedgerId;
use abacus_model::RecurringTemplate;
use abacus_model::RecurringTemplateId;
use abacus_model::Tag;
use abacus_model::TagId;
use abacus_model::TemplateId;
use abacus_model::Transaction;
use abacus_model::TransactionId;
use abacus_model::TransactionTemplate;
use abacus_model::User;
use abacus_model::UserId;

/// The entity tables. Rows are plain model values joined by id; object
/// graphs are never mirrored in memory.
#[derive(Debug, Default, Clone)]
pub struct State {
    pub users: HashMap<UserId, User>,
    pub ledgers: HashMap<LedgerId, Ledger>,
    pub accounts: HashMap<AccountId, Account>,
    pub transactions: HashMap<TransactionId, Transaction>,
    pub templates: HashMap<TemplateId, TransactionTemplate>,
    pub recurring_templates: HashMap<RecurringTemplateId, RecurringTemplate>,
    pub installment_plans: HashMap<InstallmentPlanId, InstallmentPlan>,
    pub tags: HashMap<TagId, Tag>,
    pub audit_logs: Vec<AuditLog>,
    pub import_sessions: HashMap<ImportSessionId, ImportSession>,
    /// Retained upload content per import session so execute can re-parse
    /// the source deterministically. Removing an entry models scratch
    /// storage expiring.
    pub import_sources: HashMap<ImportSessionId, String>,
    pub api_tokens: HashMap<ApiTokenId, ApiToken>,
    pub channel_bindings: HashMap<ChannelBindingId, ChannelBinding>,
    pub email_connections: HashMap<EmailConnectionId, EmailConnection>,
}

impl State {
    /// Accounts of a ledger, archived ones included.
    pub fn accounts_in_ledger(&self, ledger_id: LedgerId) -> Vec<&Account> {
        let mut accounts: Vec<&Account> = self
            .accounts
            .values()
            .filter(|account| account.ledger_id == ledger_id)
            .collect();
        accounts.sort_by_key(|account| (account.depth, account.sort_order, account.id));
        accounts
    }

    /// Direct children of an account, ordered by `sort_order`.
    pub fn child_accounts(&self, parent_id: AccountId) -> Vec<&Account> {
        let mut children: Vec<&Account> = self
            .accounts
            .values()
            .filter(|account| account.parent_id == Some(parent_id))
            .collect();
        children.sort_by_key(|account| (account.sort_order, account.id));
        children
    }

    pub fn has_child_accounts(&self, parent_id: AccountId) -> bool {
        self.accounts
            .values()
            .any(|account| account.parent_id == Some(parent_id))
    }

    /// Transactions of a ledger in the canonical `(date desc, id desc)`
    /// order — the sort every listing and cursor is defined against.
    pub fn transactions_in_ledger(&self, ledger_id: LedgerId) -> Vec<&Transaction> {
        let mut rows: Vec<&Transaction> = self
            .transactions
            .values()
            .filter(|tx| tx.ledger_id == ledger_id)
            .collect();
        rows.sort_by(|a, b| (b.date, b.id).cmp(&(a.date, a.id)));
        rows
    }

    /// Count of transactions referencing the account on either side.
    pub fn account_transaction_count(&self, account_id: AccountId) -> usize {
        self.transactions
            .values()
            .filter(|tx| tx.from_account_id == account_id || tx.to_account_id == account_id)
            .count()
    }

    pub fn ledger_transaction_count(&self, ledger_id: LedgerId) -> usize {
        self.transactions
            .values()
            .filter(|tx| tx.ledger_id == ledger_id)
            .count()
    }

    pub fn ledger_account_count(&self, ledger_id: LedgerId) -> usize {
        self.accounts
            .values()
            .filter(|account| account.ledger_id == ledger_id)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_model::TransactionType;
    use chrono::NaiveDate;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn tx(ledger_id: LedgerId, date: NaiveDate) -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            ledger_id,
            date,
            description: "row".into(),
            amount: Decimal::ONE,
            from_account_id: Uuid::new_v4(),
            to_account_id: Uuid::new_v4(),
            transaction_type: TransactionType::Transfer,
            notes: None,
            amount_expression: None,
            recurring_template_id: None,
            installment_plan_id: None,
            installment_number: None,
            source_channel: None,
            channel_message_id: None,
            tag_ids: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn canonical_order_is_date_desc_then_id_desc() {
        let ledger_id = Uuid::new_v4();
        let mut state = State::default();

        let day = |d: u32| NaiveDate::from_ymd_opt(2026, 3, d).expect("date");
        let older = tx(ledger_id, day(1));
        let newer = tx(ledger_id, day(2));
        let a = tx(ledger_id, day(3));
        let b = tx(ledger_id, day(3));
        for row in [&older, &newer, &a, &b] {
            state.transactions.insert(row.id, row.clone());
        }

        let ordered = state.transactions_in_ledger(ledger_id);
        assert_eq!(ordered.len(), 4);
        assert_eq!(ordered[0].date, day(3));
        assert_eq!(ordered[1].date, day(3));
        assert!(ordered[0].id > ordered[1].id);
        assert_eq!(ordered[2].id, newer.id);
        assert_eq!(ordered[3].id, older.id);
    }
}
