use std::sync::Arc;

use abacus_audit::ENTITY_TEMPLATE;
use abacus_audit::record_create;
use abacus_audit::record_delete;
use abacus_audit::record_update;
use abacus_audit::snapshot;
use abacus_model::AccountId;
use abacus_model::LedgerId;
use abacus_model::SORT_ORDER_GAP;
use abacus_model::TemplateId;
use abacus_model::Transaction;
use abacus_model::TransactionTemplate;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::LedgerError;
use crate::LedgerResult;
use crate::owned_ledger;
use crate::transactions::validate_posting;

#[derive(Debug, Clone)]
pub struct NewTemplate {
    pub name: String,
    pub transaction_type: TransactionType,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub amount: Decimal,
    pub description: String,
}

/// Reusable one-click presets. Applying a template posts a regular
/// transaction through the same double-entry gate as manual entry.
#[derive(Clone)]
pub struct TemplateEngine {
    store: Arc<MemoryStore>,
}

impl TemplateEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_template(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        new: NewTemplate,
    ) -> LedgerResult<TransactionTemplate> {
        if new.name.trim().is_empty() {
            return Err(LedgerError::Validation("template name cannot be empty".into()));
        }

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

        let now = Utc::now();
        let sort_order = uow
            .templates
            .values()
            .filter(|template| template.ledger_id == ledger_id)
            .map(|template| template.sort_order)
            .max()
            .unwrap_or(0)
            + SORT_ORDER_GAP;
        let template = TransactionTemplate {
            id: Uuid::new_v4(),
            ledger_id,
            name: new.name.trim().to_string(),
            transaction_type: new.transaction_type,
            from_account_id: new.from_account_id,
            to_account_id: new.to_account_id,
            amount: new.amount,
            description: new.description,
            sort_order,
            created_at: now,
            updated_at: now,
        };
        uow.templates.insert(template.id, template.clone());
        record_create(&mut uow, ledger_id, ENTITY_TEMPLATE, template.id, snapshot(&template));
        uow.commit();
        Ok(template)
    }

    pub async fn list_templates(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> LedgerResult<Vec<TransactionTemplate>> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        let mut templates: Vec<TransactionTemplate> = state
            .templates
            .values()
            .filter(|template| template.ledger_id == ledger_id)
            .cloned()
            .collect();
        templates.sort_by_key(|template| (template.sort_order, template.id));
        Ok(templates)
    }

    pub async fn update_template(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        template_id: TemplateId,
        new: NewTemplate,
    ) -> LedgerResult<TransactionTemplate> {
        if new.name.trim().is_empty() {
            return Err(LedgerError::Validation("template name cannot be empty".into()));
        }

        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = template_in_ledger(&uow, ledger_id, template_id)?;
        validate_posting(
            &uow,
            ledger_id,
            new.amount,
            new.from_account_id,
            new.to_account_id,
            new.transaction_type,
        )?;

        let mut updated = old.clone();
        updated.name = new.name.trim().to_string();
        updated.transaction_type = new.transaction_type;
        updated.from_account_id = new.from_account_id;
        updated.to_account_id = new.to_account_id;
        updated.amount = new.amount;
        updated.description = new.description;
        updated.updated_at = Utc::now();
        uow.templates.insert(template_id, updated.clone());
        record_update(
            &mut uow,
            ledger_id,
            ENTITY_TEMPLATE,
            template_id,
            snapshot(&old),
            snapshot(&updated),
        );
        uow.commit();
        Ok(updated)
    }

    pub async fn delete_template(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        template_id: TemplateId,
    ) -> LedgerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = template_in_ledger(&uow, ledger_id, template_id)?;
        uow.templates.remove(&template_id);
        record_delete(&mut uow, ledger_id, ENTITY_TEMPLATE, template_id, snapshot(&old));
        uow.commit();
        Ok(())
    }

    /// Posts a transaction from the template's stored defaults.
    pub async fn apply_template(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        template_id: TemplateId,
        date: NaiveDate,
    ) -> LedgerResult<Transaction> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let template = template_in_ledger(&uow, ledger_id, template_id)?;
        validate_posting(
            &uow,
            ledger_id,
            template.amount,
            template.from_account_id,
            template.to_account_id,
            template.transaction_type,
        )?;

        let now = Utc::now();
        let tx = Transaction {
            id: Uuid::new_v4(),
            ledger_id,
            date,
            description: template.description.clone(),
            amount: template.amount,
            from_account_id: template.from_account_id,
            to_account_id: template.to_account_id,
            transaction_type: template.transaction_type,
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
        uow.transactions.insert(tx.id, tx.clone());
        record_create(
            &mut uow,
            ledger_id,
            abacus_audit::ENTITY_TRANSACTION,
            tx.id,
            snapshot(&tx),
        );
        uow.commit();
        Ok(tx)
    }
}

fn template_in_ledger(
    state: &abacus_store::State,
    ledger_id: LedgerId,
    template_id: TemplateId,
) -> LedgerResult<TransactionTemplate> {
    state
        .templates
        .get(&template_id)
        .filter(|template| template.ledger_id == ledger_id)
        .cloned()
        .ok_or_else(|| LedgerError::NotFound(format!("template {template_id}")))
}
