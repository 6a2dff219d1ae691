use std::sync::Arc;

use abacus_audit::ENTITY_INSTALLMENT_PLAN;
use abacus_audit::record_create;
use abacus_audit::snapshot;
use abacus_ledger::validate_posting;
use abacus_model::AccountId;
use abacus_model::InstallmentPlan;
use abacus_model::InstallmentPlanId;
use abacus_model::LedgerId;
use abacus_model::MONEY_SCALE;
use abacus_model::Transaction;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::Months;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::SchedulerError;
use crate::SchedulerResult;

#[derive(Debug, Clone)]
pub struct NewInstallmentPlan {
    pub name: String,
    pub total_amount: Decimal,
    pub installment_count: i32,
    pub from_account_id: AccountId,
    pub to_account_id: AccountId,
    pub start_date: NaiveDate,
}

/// Split a total into `count` rounded parts whose sum is exactly the
/// total: the first `count - 1` take `round(total / count)` and the last
/// absorbs the remainder.
#[must_use]
pub fn installment_amounts(total: Decimal, count: i32) -> Vec<Decimal> {
    let count = count.max(1);
    let base = (total / Decimal::from(count)).round_dp(MONEY_SCALE);
    let mut amounts = vec![base; (count - 1) as usize];
    amounts.push(total - base * Decimal::from(count - 1));
    amounts
}

/// Installment plans expand at creation time into their full set of
/// monthly EXPENSE transactions.
#[derive(Clone)]
pub struct InstallmentEngine {
    store: Arc<MemoryStore>,
}

impl InstallmentEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self { store }
    }

    pub async fn create_plan(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        new: NewInstallmentPlan,
    ) -> SchedulerResult<InstallmentPlan> {
        if new.installment_count <= 1 {
            return Err(SchedulerError::Validation(
                "installment count must be greater than one".into(),
            ));
        }
        if new.total_amount <= Decimal::ZERO {
            return Err(SchedulerError::Validation("total amount must be positive".into()));
        }
        if new.name.trim().is_empty() {
            return Err(SchedulerError::Validation("plan name cannot be empty".into()));
        }

        let mut uow = self.store.unit_of_work().await;
        let owned = uow
            .ledgers
            .get(&ledger_id)
            .is_some_and(|ledger| ledger.user_id == user_id);
        if !owned {
            return Err(SchedulerError::NotFound(format!("ledger {ledger_id}")));
        }

        let amounts = installment_amounts(new.total_amount, new.installment_count);
        for amount in &amounts {
            validate_posting(
                &uow,
                ledger_id,
                *amount,
                new.from_account_id,
                new.to_account_id,
                TransactionType::Expense,
            )?;
        }

        let now = Utc::now();
        let plan = InstallmentPlan {
            id: Uuid::new_v4(),
            ledger_id,
            name: new.name.trim().to_string(),
            total_amount: new.total_amount,
            installment_count: new.installment_count,
            from_account_id: new.from_account_id,
            to_account_id: new.to_account_id,
            start_date: new.start_date,
            created_at: now,
        };
        uow.installment_plans.insert(plan.id, plan.clone());

        for (index, amount) in amounts.iter().enumerate() {
            let number = index as i32 + 1;
            let date = new
                .start_date
                .checked_add_months(Months::new(index as u32))
                .unwrap_or(new.start_date);
            let tx = Transaction {
                id: Uuid::new_v4(),
                ledger_id,
                date,
                description: format!("{} ({number}/{})", plan.name, plan.installment_count),
                amount: *amount,
                from_account_id: new.from_account_id,
                to_account_id: new.to_account_id,
                transaction_type: TransactionType::Expense,
                notes: None,
                amount_expression: None,
                recurring_template_id: None,
                installment_plan_id: Some(plan.id),
                installment_number: Some(number),
                source_channel: None,
                channel_message_id: None,
                tag_ids: Vec::new(),
                created_at: now,
                updated_at: now,
            };
            uow.transactions.insert(tx.id, tx);
        }

        record_create(
            &mut uow,
            ledger_id,
            ENTITY_INSTALLMENT_PLAN,
            plan.id,
            snapshot(&plan),
        );
        uow.commit();
        info!(plan_id = %plan.id, count = plan.installment_count, "expanded installment plan");
        Ok(plan)
    }

    pub async fn get_plan(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        plan_id: InstallmentPlanId,
    ) -> SchedulerResult<InstallmentPlan> {
        let state = self.store.read().await;
        state
            .ledgers
            .get(&ledger_id)
            .filter(|ledger| ledger.user_id == user_id)
            .ok_or_else(|| SchedulerError::NotFound(format!("ledger {ledger_id}")))?;
        state
            .installment_plans
            .get(&plan_id)
            .filter(|plan| plan.ledger_id == ledger_id)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(format!("installment plan {plan_id}")))
    }

    pub async fn list_plans(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> SchedulerResult<Vec<InstallmentPlan>> {
        let state = self.store.read().await;
        state
            .ledgers
            .get(&ledger_id)
            .filter(|ledger| ledger.user_id == user_id)
            .ok_or_else(|| SchedulerError::NotFound(format!("ledger {ledger_id}")))?;
        let mut plans: Vec<InstallmentPlan> = state
            .installment_plans
            .values()
            .filter(|plan| plan.ledger_id == ledger_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(plans)
    }
}
