use std::sync::Arc;

use abacus_audit::ENTITY_RECURRING_TEMPLATE;
use abacus_audit::ENTITY_TRANSACTION;
use abacus_audit::record_create;
use abacus_audit::record_delete;
use abacus_audit::record_update;
use abacus_audit::snapshot;
use abacus_ledger::validate_posting;
use abacus_model::AccountId;
use abacus_model::Frequency;
use abacus_model::LedgerId;
use abacus_model::RecurringTemplate;
use abacus_model::RecurringTemplateId;
use abacus_model::Transaction;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use abacus_store::State;
use chrono::Days;
use chrono::Months;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::SchedulerError;
use crate::SchedulerResult;

/// One frequency step. Month and year steps clamp the day-of-month, so a
/// Jan 31 monthly schedule lands on Feb 28/29 rather than skipping.
#[must_use]
pub fn advance_date(date: NaiveDate, frequency: Frequency) -> NaiveDate {
    match frequency {
        Frequency::Daily => date + Days::new(1),
        Frequency::Weekly => date + Days::new(7),
        Frequency::Monthly => date.checked_add_months(Months::new(1)).unwrap_or(date),
        Frequency::Yearly => date.checked_add_months(Months::new(12)).unwrap_or(date),
    }
}

/// Next generation date: one step past the last generated date, or the
/// start date when nothing has been generated yet.
#[must_use]
pub fn next_due_date(template: &RecurringTemplate) -> NaiveDate {
    match template.last_generated_date {
        Some(last) => advance_date(last, template.frequency),
        None => template.start_date,
    }
}

#[derive(Debug, Clone)]
pub struct NewRecurringTemplate {
    pub name: String,
    pub amount: Decimal,
    pub transaction_type: TransactionType,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// A template due for approval.
#[derive(Debug, Clone, PartialEq)]
pub struct DueTemplate {
    pub id: RecurringTemplateId,
    pub name: String,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

#[derive(Clone)]
pub struct RecurringEngine {
    store: Arc<MemoryStore>,
}

impl RecurringEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_template(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        new: NewRecurringTemplate,
    ) -> SchedulerResult<RecurringTemplate> {
        if new.name.trim().is_empty() {
            return Err(SchedulerError::Validation("template name cannot be empty".into()));
        }
        if let Some(end) = new.end_date
            && end < new.start_date
        {
            return Err(SchedulerError::Validation(
                "end date cannot precede start date".into(),
            ));
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
        let template = RecurringTemplate {
            id: Uuid::new_v4(),
            ledger_id,
            name: new.name.trim().to_string(),
            amount: new.amount,
            transaction_type: new.transaction_type,
            from_account_id: new.from_account_id,
            to_account_id: new.to_account_id,
            frequency: new.frequency,
            start_date: new.start_date,
            end_date: new.end_date,
            last_generated_date: None,
            created_at: now,
            updated_at: now,
        };
        uow.recurring_templates.insert(template.id, template.clone());
        record_create(
            &mut uow,
            ledger_id,
            ENTITY_RECURRING_TEMPLATE,
            template.id,
            snapshot(&template),
        );
        uow.commit();
        Ok(template)
    }

    pub async fn list_templates(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> SchedulerResult<Vec<RecurringTemplate>> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        let mut templates: Vec<RecurringTemplate> = state
            .recurring_templates
            .values()
            .filter(|template| template.ledger_id == ledger_id)
            .cloned()
            .collect();
        templates.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(templates)
    }

    pub async fn update_template(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        template_id: RecurringTemplateId,
        new: NewRecurringTemplate,
    ) -> SchedulerResult<RecurringTemplate> {
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
        updated.amount = new.amount;
        updated.transaction_type = new.transaction_type;
        updated.from_account_id = new.from_account_id;
        updated.to_account_id = new.to_account_id;
        updated.frequency = new.frequency;
        updated.start_date = new.start_date;
        updated.end_date = new.end_date;
        updated.updated_at = Utc::now();
        uow.recurring_templates.insert(template_id, updated.clone());
        record_update(
            &mut uow,
            ledger_id,
            ENTITY_RECURRING_TEMPLATE,
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
        template_id: RecurringTemplateId,
    ) -> SchedulerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        owned_ledger(&uow, user_id, ledger_id)?;
        let old = template_in_ledger(&uow, ledger_id, template_id)?;
        uow.recurring_templates.remove(&template_id);
        record_delete(
            &mut uow,
            ledger_id,
            ENTITY_RECURRING_TEMPLATE,
            template_id,
            snapshot(&old),
        );
        uow.commit();
        Ok(())
    }

    /// Templates whose next due date has arrived, skipping ones whose end
    /// date has passed.
    pub async fn due_templates(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        today: NaiveDate,
    ) -> SchedulerResult<Vec<DueTemplate>> {
        let state = self.store.read().await;
        owned_ledger(&state, user_id, ledger_id)?;
        let mut due: Vec<DueTemplate> = state
            .recurring_templates
            .values()
            .filter(|template| template.ledger_id == ledger_id)
            .filter(|template| template.end_date.is_none_or(|end| end >= today))
            .filter_map(|template| {
                let due_date = next_due_date(template);
                (due_date <= today).then(|| DueTemplate {
                    id: template.id,
                    name: template.name.clone(),
                    amount: template.amount,
                    due_date,
                })
            })
            .collect();
        due.sort_by_key(|template| template.due_date);
        Ok(due)
    }

    /// Approval posts one transaction from the template and advances
    /// `last_generated_date` — one unit, one audit row (the transaction).
    pub async fn approve(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        template_id: RecurringTemplateId,
        approval_date: NaiveDate,
    ) -> SchedulerResult<Transaction> {
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
            date: approval_date,
            description: template.name.clone(),
            amount: template.amount,
            from_account_id: template.from_account_id,
            to_account_id: template.to_account_id,
            transaction_type: template.transaction_type,
            notes: None,
            amount_expression: None,
            recurring_template_id: Some(template.id),
            installment_plan_id: None,
            installment_number: None,
            source_channel: None,
            channel_message_id: None,
            tag_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        uow.transactions.insert(tx.id, tx.clone());
        if let Some(stored) = uow.recurring_templates.get_mut(&template_id) {
            stored.last_generated_date = Some(approval_date);
            stored.updated_at = now;
        }
        record_create(&mut uow, ledger_id, ENTITY_TRANSACTION, tx.id, snapshot(&tx));
        uow.commit();
        info!(template_id = %template_id, date = %approval_date, "approved recurring template");
        Ok(tx)
    }
}

fn owned_ledger(state: &State, user_id: UserId, ledger_id: LedgerId) -> SchedulerResult<()> {
    state
        .ledgers
        .get(&ledger_id)
        .filter(|ledger| ledger.user_id == user_id)
        .map(|_| ())
        .ok_or_else(|| SchedulerError::NotFound(format!("ledger {ledger_id}")))
}

fn template_in_ledger(
    state: &State,
    ledger_id: LedgerId,
    template_id: RecurringTemplateId,
) -> SchedulerResult<RecurringTemplate> {
    state
        .recurring_templates
        .get(&template_id)
        .filter(|template| template.ledger_id == ledger_id)
        .cloned()
        .ok_or_else(|| SchedulerError::NotFound(format!("recurring template {template_id}")))
}
