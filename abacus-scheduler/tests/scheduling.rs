use std::sync::Arc;
use std::sync::Mutex;

use abacus_ledger::AccountEngine;
use abacus_ledger::LedgerEngine;
use abacus_ledger::NewAccount;
use abacus_model::AccountType;
use abacus_model::ConnectionStatus;
use abacus_model::EmailConnection;
use abacus_model::Frequency;
use abacus_model::LedgerId;
use abacus_model::ScanFrequency;
use abacus_model::TransactionType;
use abacus_model::UserId;
use abacus_scheduler::EmailScanRunner;
use abacus_scheduler::InstallmentEngine;
use abacus_scheduler::NewInstallmentPlan;
use abacus_scheduler::NewRecurringTemplate;
use abacus_scheduler::RecurringEngine;
use abacus_scheduler::ScanReport;
use abacus_scheduler::ScanScheduler;
use abacus_scheduler::TickEvent;
use abacus_store::MemoryStore;
use async_trait::async_trait;
use chrono::Duration;
use chrono::NaiveDate;
use chrono::TimeZone;
use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use uuid::Uuid;

fn money(value: &str) -> Decimal {
    value.parse().expect("decimal literal")
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

struct Harness {
    store: Arc<MemoryStore>,
    user_id: UserId,
    ledger_id: LedgerId,
    cash: abacus_model::AccountId,
    rent: abacus_model::AccountId,
}

impl Harness {
    async fn new() -> Self {
        let store = MemoryStore::shared();
        let user_id = Uuid::new_v4();
        let ledgers = LedgerEngine::new(store.clone());
        let accounts = AccountEngine::new(store.clone());
        let ledger = ledgers
            .create_ledger(user_id, "Book", money("5000.00"))
            .await
            .expect("ledger");
        let cash = accounts
            .list_accounts(user_id, ledger.id, None, false)
            .await
            .expect("accounts")
            .into_iter()
            .find(|account| account.name == "Cash")
            .expect("cash")
            .id;
        let rent = accounts
            .create_account(user_id, ledger.id, NewAccount::new("Rent", AccountType::Expense))
            .await
            .expect("rent")
            .id;
        Self {
            store,
            user_id,
            ledger_id: ledger.id,
            cash,
            rent,
        }
    }
}

#[tokio::test]
async fn recurring_templates_report_due_and_advance_on_approval() {
    let h = Harness::new().await;
    let recurring = RecurringEngine::new(h.store.clone());

    let template = recurring
        .create_template(
            h.user_id,
            h.ledger_id,
            NewRecurringTemplate {
                name: "Rent".into(),
                amount: money("800.00"),
                transaction_type: TransactionType::Expense,
                from_account_id: h.cash,
                to_account_id: h.rent,
                frequency: Frequency::Monthly,
                start_date: date(2026, 1, 1),
                end_date: None,
            },
        )
        .await
        .expect("template");

    // Never generated: due from its start date.
    let due = recurring
        .due_templates(h.user_id, h.ledger_id, date(2026, 1, 15))
        .await
        .expect("due");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].due_date, date(2026, 1, 1));

    let tx = recurring
        .approve(h.user_id, h.ledger_id, template.id, date(2026, 1, 15))
        .await
        .expect("approve");
    assert_eq!(tx.recurring_template_id, Some(template.id));
    assert_eq!(tx.amount, money("800.00"));

    // Next due is one month after the approval date.
    let due = recurring
        .due_templates(h.user_id, h.ledger_id, date(2026, 1, 31))
        .await
        .expect("due after approval");
    assert!(due.is_empty());
    let due = recurring
        .due_templates(h.user_id, h.ledger_id, date(2026, 2, 15))
        .await
        .expect("due next month");
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].due_date, date(2026, 2, 15));
}

#[tokio::test]
async fn ended_templates_stop_coming_due() {
    let h = Harness::new().await;
    let recurring = RecurringEngine::new(h.store.clone());
    recurring
        .create_template(
            h.user_id,
            h.ledger_id,
            NewRecurringTemplate {
                name: "Gym".into(),
                amount: money("30.00"),
                transaction_type: TransactionType::Expense,
                from_account_id: h.cash,
                to_account_id: h.rent,
                frequency: Frequency::Weekly,
                start_date: date(2026, 1, 1),
                end_date: Some(date(2026, 2, 1)),
            },
        )
        .await
        .expect("template");

    let due = recurring
        .due_templates(h.user_id, h.ledger_id, date(2026, 3, 1))
        .await
        .expect("due");
    assert!(due.is_empty());
}

#[tokio::test]
async fn installment_plans_expand_with_an_exact_sum() {
    let h = Harness::new().await;
    let installments = InstallmentEngine::new(h.store.clone());

    let plan = installments
        .create_plan(
            h.user_id,
            h.ledger_id,
            NewInstallmentPlan {
                name: "Laptop".into(),
                total_amount: money("100.00"),
                installment_count: 3,
                from_account_id: h.cash,
                to_account_id: h.rent,
                start_date: date(2026, 1, 31),
            },
        )
        .await
        .expect("plan");

    let state = h.store.read().await;
    let mut rows: Vec<_> = state
        .transactions
        .values()
        .filter(|tx| tx.installment_plan_id == Some(plan.id))
        .cloned()
        .collect();
    rows.sort_by_key(|tx| tx.installment_number);
    assert_eq!(rows.len(), 3);

    let total: Decimal = rows.iter().map(|tx| tx.amount).sum();
    assert_eq!(total, money("100.00"));
    assert_eq!(rows[0].amount, money("33.33"));
    assert_eq!(rows[2].amount, money("33.34"));

    // Monthly dates clamp through February.
    assert_eq!(rows[0].date, date(2026, 1, 31));
    assert_eq!(rows[1].date, date(2026, 2, 28));
    assert_eq!(rows[2].date, date(2026, 3, 31));
    assert_eq!(rows[1].description, "Laptop (2/3)");
}

#[tokio::test]
async fn single_installment_plans_are_rejected() {
    let h = Harness::new().await;
    let installments = InstallmentEngine::new(h.store.clone());
    let refused = installments
        .create_plan(
            h.user_id,
            h.ledger_id,
            NewInstallmentPlan {
                name: "Nope".into(),
                total_amount: money("10.00"),
                installment_count: 1,
                from_account_id: h.cash,
                to_account_id: h.rent,
                start_date: date(2026, 1, 1),
            },
        )
        .await;
    assert!(matches!(
        refused,
        Err(abacus_scheduler::SchedulerError::Validation(_))
    ));
}

#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<LedgerId>>,
}

#[async_trait]
impl EmailScanRunner for RecordingRunner {
    async fn scan(&self, ledger_id: LedgerId) -> Result<ScanReport, String> {
        self.calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .push(ledger_id);
        Ok(ScanReport {
            statements_found: 2,
        })
    }
}

#[tokio::test]
async fn scan_jobs_fire_within_grace_and_abandon_stale_slots() {
    let h = Harness::new().await;
    let runner = Arc::new(RecordingRunner::default());
    let scheduler = ScanScheduler::new(h.store.clone(), runner.clone());

    let now = Utc.with_ymd_and_hms(2026, 3, 10, 5, 30, 0).single().expect("now");
    let next = scheduler
        .schedule(h.ledger_id, ScanFrequency::Daily, 6, None, now)
        .expect("schedule");
    assert_eq!(
        next,
        Utc.with_ymd_and_hms(2026, 3, 10, 6, 0, 0).single().expect("fire")
    );

    // Not due yet.
    assert!(scheduler.tick(now).await.is_empty());

    // Thirty minutes late is within the grace window.
    let late = next + Duration::minutes(30);
    let events = scheduler.tick(late).await;
    assert_eq!(
        events,
        vec![TickEvent::Completed {
            ledger_id: h.ledger_id,
            statements_found: 2,
        }]
    );
    assert_eq!(
        runner
            .calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len(),
        1
    );

    // The job rescheduled itself for the next day; two hours past that
    // slot is beyond the grace and must be abandoned silently.
    let stale = scheduler.next_run_time(h.ledger_id).expect("next run") + Duration::hours(2);
    let events = scheduler.tick(stale).await;
    assert_eq!(
        events,
        vec![TickEvent::Abandoned {
            ledger_id: h.ledger_id,
        }]
    );
    assert_eq!(
        runner
            .calls
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len(),
        1
    );
}

#[tokio::test]
async fn restart_reload_skips_disconnected_connections() {
    let h = Harness::new().await;

    let mut uow = h.store.unit_of_work().await;
    let connected = EmailConnection {
        id: Uuid::new_v4(),
        ledger_id: h.ledger_id,
        status: ConnectionStatus::Connected,
        encrypted_refresh_token: "opaque".into(),
        schedule_frequency: Some(ScanFrequency::Daily),
        schedule_hour: Some(6),
        schedule_day_of_week: None,
        last_scan_at: None,
        created_at: Utc::now(),
    };
    let disconnected = EmailConnection {
        id: Uuid::new_v4(),
        ledger_id: Uuid::new_v4(),
        status: ConnectionStatus::Disconnected,
        encrypted_refresh_token: "opaque".into(),
        schedule_frequency: Some(ScanFrequency::Weekly),
        schedule_hour: Some(8),
        schedule_day_of_week: Some(0),
        last_scan_at: None,
        created_at: Utc::now(),
    };
    uow.email_connections.insert(connected.id, connected);
    uow.email_connections.insert(disconnected.id, disconnected.clone());
    uow.commit();

    let scheduler = ScanScheduler::new(h.store.clone(), Arc::new(abacus_scheduler::NullScanRunner));
    let loaded = scheduler.load_jobs(Utc::now()).await;
    assert_eq!(loaded, 1);
    assert!(scheduler.next_run_time(h.ledger_id).is_some());
    assert!(scheduler.next_run_time(disconnected.ledger_id).is_none());

    // Successful ticks stamp the connection's last scan time.
    let fire = scheduler.next_run_time(h.ledger_id).expect("fire");
    scheduler.tick(fire + Duration::minutes(1)).await;
    let state = h.store.read().await;
    let stored = state
        .email_connections
        .values()
        .find(|connection| connection.ledger_id == h.ledger_id)
        .expect("connection");
    assert!(stored.last_scan_at.is_some());
}
