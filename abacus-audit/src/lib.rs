#![deny(clippy::print_stdout, clippy::print_stderr)]

//! Append-only audit trail.
//!
//! The recorders take the open unit of work's state, so an audit row always
//! commits — or rolls back — together with the mutation it describes. A
//! failed operation therefore leaves no row behind, and a committed one
//! leaves exactly one.

use abacus_model::AuditAction;
use abacus_model::AuditLog;
use abacus_model::LedgerId;
use abacus_store::State;
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

pub const ENTITY_LEDGER: &str = "Ledger";
pub const ENTITY_ACCOUNT: &str = "Account";
pub const ENTITY_TRANSACTION: &str = "Transaction";
pub const ENTITY_TEMPLATE: &str = "TransactionTemplate";
pub const ENTITY_RECURRING_TEMPLATE: &str = "RecurringTemplate";
pub const ENTITY_INSTALLMENT_PLAN: &str = "InstallmentPlan";
pub const ENTITY_IMPORT_SESSION: &str = "ImportSession";

/// Structured snapshot of an entity's attributes for `old_value` /
/// `new_value`.
#[must_use]
pub fn snapshot<T: Serialize>(entity: &T) -> serde_json::Value {
    serde_json::to_value(entity).unwrap_or(serde_json::Value::Null)
}

pub fn record_create(
    state: &mut State,
    ledger_id: LedgerId,
    entity_type: &str,
    entity_id: Uuid,
    new_value: serde_json::Value,
) {
    record_action(state, ledger_id, entity_type, entity_id, AuditAction::Create, None, Some(new_value), None);
}

pub fn record_update(
    state: &mut State,
    ledger_id: LedgerId,
    entity_type: &str,
    entity_id: Uuid,
    old_value: serde_json::Value,
    new_value: serde_json::Value,
) {
    record_action(
        state,
        ledger_id,
        entity_type,
        entity_id,
        AuditAction::Update,
        Some(old_value),
        Some(new_value),
        None,
    );
}

pub fn record_delete(
    state: &mut State,
    ledger_id: LedgerId,
    entity_type: &str,
    entity_id: Uuid,
    old_value: serde_json::Value,
) {
    record_action(state, ledger_id, entity_type, entity_id, AuditAction::Delete, Some(old_value), None, None);
}

pub fn record_reassign(
    state: &mut State,
    ledger_id: LedgerId,
    entity_type: &str,
    entity_id: Uuid,
    extra: serde_json::Value,
) {
    record_action(
        state,
        ledger_id,
        entity_type,
        entity_id,
        AuditAction::Reassign,
        None,
        None,
        Some(extra),
    );
}

/// General-purpose recorder for mutations the typed helpers do not cover
/// (bulk clears carrying counts in `extra`, for example).
#[expect(clippy::too_many_arguments)]
pub fn record_action(
    state: &mut State,
    ledger_id: LedgerId,
    entity_type: &str,
    entity_id: Uuid,
    action: AuditAction,
    old_value: Option<serde_json::Value>,
    new_value: Option<serde_json::Value>,
    extra: Option<serde_json::Value>,
) {
    state.audit_logs.push(AuditLog {
        id: Uuid::new_v4(),
        entity_type: entity_type.to_string(),
        entity_id,
        action,
        old_value,
        new_value,
        extra,
        ledger_id,
        timestamp: Utc::now(),
    });
}

#[derive(Debug, Clone, Default)]
pub struct AuditLogFilter {
    pub ledger_id: Option<LedgerId>,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub limit: Option<usize>,
}

/// Matching rows, newest first.
#[must_use]
pub fn list(state: &State, filter: &AuditLogFilter) -> Vec<AuditLog> {
    let mut rows: Vec<AuditLog> = state
        .audit_logs
        .iter()
        .filter(|row| {
            filter.ledger_id.is_none_or(|id| row.ledger_id == id)
                && filter
                    .entity_type
                    .as_ref()
                    .is_none_or(|ty| &row.entity_type == ty)
                && filter.entity_id.is_none_or(|id| row.entity_id == id)
                && filter.action.is_none_or(|action| row.action == action)
        })
        .cloned()
        .collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    if let Some(limit) = filter.limit
        && rows.len() > limit
    {
        rows.truncate(limit);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn each_recorder_appends_exactly_one_row() {
        let mut state = State::default();
        let ledger_id = Uuid::new_v4();
        let entity_id = Uuid::new_v4();

        record_create(
            &mut state,
            ledger_id,
            ENTITY_ACCOUNT,
            entity_id,
            serde_json::json!({"name": "Food"}),
        );
        record_update(
            &mut state,
            ledger_id,
            ENTITY_ACCOUNT,
            entity_id,
            serde_json::json!({"name": "Food"}),
            serde_json::json!({"name": "Dining"}),
        );
        record_delete(
            &mut state,
            ledger_id,
            ENTITY_ACCOUNT,
            entity_id,
            serde_json::json!({"name": "Dining"}),
        );

        assert_eq!(state.audit_logs.len(), 3);
        assert_eq!(state.audit_logs[0].action, AuditAction::Create);
        assert!(state.audit_logs[0].old_value.is_none());
        assert_eq!(state.audit_logs[1].action, AuditAction::Update);
        assert!(state.audit_logs[1].old_value.is_some());
        assert!(state.audit_logs[1].new_value.is_some());
        assert_eq!(state.audit_logs[2].action, AuditAction::Delete);
        assert!(state.audit_logs[2].new_value.is_none());
    }

    #[test]
    fn reassign_rows_carry_extra_context() {
        let mut state = State::default();
        let ledger_id = Uuid::new_v4();
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();

        record_reassign(
            &mut state,
            ledger_id,
            ENTITY_ACCOUNT,
            source,
            serde_json::json!({
                "source": source,
                "target": target,
                "transaction_count": 3,
            }),
        );

        let rows = list(
            &state,
            &AuditLogFilter {
                action: Some(AuditAction::Reassign),
                ..AuditLogFilter::default()
            },
        );
        assert_eq!(rows.len(), 1);
        let extra = rows[0].extra.as_ref().expect("extra");
        assert_eq!(extra["transaction_count"], 3);
    }

    #[test]
    fn listing_filters_and_limits() {
        let mut state = State::default();
        let ledger_a = Uuid::new_v4();
        let ledger_b = Uuid::new_v4();

        for i in 0..4 {
            record_create(
                &mut state,
                if i % 2 == 0 { ledger_a } else { ledger_b },
                ENTITY_TRANSACTION,
                Uuid::new_v4(),
                serde_json::json!({"i": i}),
            );
        }

        let rows = list(
            &state,
            &AuditLogFilter {
                ledger_id: Some(ledger_a),
                ..AuditLogFilter::default()
            },
        );
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.ledger_id == ledger_a));

        let rows = list(
            &state,
            &AuditLogFilter {
                limit: Some(3),
                ..AuditLogFilter::default()
            },
        );
        assert_eq!(rows.len(), 3);
    }
}
