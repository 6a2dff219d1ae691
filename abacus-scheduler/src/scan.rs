use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use abacus_model::ConnectionStatus;
use abacus_model::LedgerId;
use abacus_model::ScanFrequency;
use abacus_store::MemoryStore;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Datelike;
use chrono::Days;
use chrono::Utc;
use tracing::info;
use tracing::warn;

use crate::SchedulerError;
use crate::SchedulerResult;

/// A fire time may be honored up to an hour late; anything older is
/// abandoned silently and the job waits for its next slot.
pub const MISFIRE_GRACE_SECONDS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub statements_found: usize,
}

/// The outbound side of a scan — mailbox search, statement download,
/// parsing. The scheduler only cares that it eventually answers.
#[async_trait]
pub trait EmailScanRunner: Send + Sync {
    async fn scan(&self, ledger_id: LedgerId) -> Result<ScanReport, String>;
}

/// Runner that finds nothing; the default until a mailbox is wired up.
#[derive(Debug, Default)]
pub struct NullScanRunner;

#[async_trait]
impl EmailScanRunner for NullScanRunner {
    async fn scan(&self, _ledger_id: LedgerId) -> Result<ScanReport, String> {
        Ok(ScanReport {
            statements_found: 0,
        })
    }
}

#[derive(Debug, Clone)]
struct ScanJob {
    frequency: ScanFrequency,
    hour: u8,
    day_of_week: Option<u8>,
    next_run: DateTime<Utc>,
}

/// What a tick did for each job it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickEvent {
    Completed {
        ledger_id: LedgerId,
        statements_found: usize,
    },
    Failed {
        ledger_id: LedgerId,
        error: String,
    },
    Abandoned {
        ledger_id: LedgerId,
    },
}

/// Singleton registry of scan jobs keyed by ledger. Only the scheduler
/// mutates it; jobs are reconstructed from persistent connection state on
/// startup so schedules survive restarts.
pub struct ScanScheduler {
    store: Arc<MemoryStore>,
    runner: Arc<dyn EmailScanRunner>,
    jobs: Mutex<HashMap<LedgerId, ScanJob>>,
}

impl ScanScheduler {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, runner: Arc<dyn EmailScanRunner>) -> Self {
        Self {
            store,
            runner,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Rebuild the registry from stored connections. Connections that are
    /// not CONNECTED are skipped.
    pub async fn load_jobs(&self, now: DateTime<Utc>) -> usize {
        let state = self.store.read().await;
        let mut loaded = 0;
        for connection in state.email_connections.values() {
            if connection.status != ConnectionStatus::Connected {
                continue;
            }
            let (Some(frequency), Some(hour)) =
                (connection.schedule_frequency, connection.schedule_hour)
            else {
                continue;
            };
            if self
                .schedule(
                    connection.ledger_id,
                    frequency,
                    hour,
                    connection.schedule_day_of_week,
                    now,
                )
                .is_ok()
            {
                loaded += 1;
            }
        }
        info!(loaded, "reloaded scan schedules");
        loaded
    }

    /// Register or replace the job for a ledger.
    pub fn schedule(
        &self,
        ledger_id: LedgerId,
        frequency: ScanFrequency,
        hour: u8,
        day_of_week: Option<u8>,
        now: DateTime<Utc>,
    ) -> SchedulerResult<DateTime<Utc>> {
        if hour > 23 {
            return Err(SchedulerError::Validation("hour must be within 0..=23".into()));
        }
        if let Some(dow) = day_of_week
            && dow > 6
        {
            return Err(SchedulerError::Validation(
                "day_of_week must be within 0..=6".into(),
            ));
        }
        let next_run = next_fire(frequency, hour, day_of_week, now).ok_or_else(|| {
            SchedulerError::Internal("could not compute a next fire time".into())
        })?;
        let mut jobs = self.jobs.lock().unwrap_or_else(|poison| poison.into_inner());
        jobs.insert(
            ledger_id,
            ScanJob {
                frequency,
                hour,
                day_of_week,
                next_run,
            },
        );
        Ok(next_run)
    }

    pub fn cancel(&self, ledger_id: LedgerId) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|poison| poison.into_inner());
        jobs.remove(&ledger_id);
    }

    #[must_use]
    pub fn next_run_time(&self, ledger_id: LedgerId) -> Option<DateTime<Utc>> {
        let jobs = self.jobs.lock().unwrap_or_else(|poison| poison.into_inner());
        jobs.get(&ledger_id).map(|job| job.next_run)
    }

    /// Run everything whose fire time has arrived. Jobs within the misfire
    /// grace run late; older misfires are abandoned and rescheduled.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<TickEvent> {
        let due: Vec<(LedgerId, ScanJob)> = {
            let jobs = self.jobs.lock().unwrap_or_else(|poison| poison.into_inner());
            jobs.iter()
                .filter(|(_, job)| job.next_run <= now)
                .map(|(ledger_id, job)| (*ledger_id, job.clone()))
                .collect()
        };

        let mut events = Vec::new();
        for (ledger_id, job) in due {
            let lateness = now.signed_duration_since(job.next_run).num_seconds();
            if lateness > MISFIRE_GRACE_SECONDS {
                warn!(%ledger_id, lateness, "abandoning stale scan slot");
                events.push(TickEvent::Abandoned { ledger_id });
            } else {
                match self.runner.scan(ledger_id).await {
                    Ok(report) => {
                        self.record_scan(ledger_id, now).await;
                        info!(%ledger_id, report.statements_found, "scan completed");
                        events.push(TickEvent::Completed {
                            ledger_id,
                            statements_found: report.statements_found,
                        });
                    }
                    Err(error) => {
                        warn!(%ledger_id, %error, "scan failed");
                        events.push(TickEvent::Failed { ledger_id, error });
                    }
                }
            }

            if let Some(next_run) = next_fire(job.frequency, job.hour, job.day_of_week, now) {
                let mut jobs = self.jobs.lock().unwrap_or_else(|poison| poison.into_inner());
                if let Some(stored) = jobs.get_mut(&ledger_id) {
                    stored.next_run = next_run;
                }
            }
        }
        events
    }

    /// Wall-clock loop for production use; tests drive `tick` directly.
    pub fn spawn(self: Arc<Self>, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                self.tick(Utc::now()).await;
            }
        })
    }

    async fn record_scan(&self, ledger_id: LedgerId, now: DateTime<Utc>) {
        let mut uow = self.store.unit_of_work().await;
        let connection = uow
            .email_connections
            .values_mut()
            .find(|connection| connection.ledger_id == ledger_id);
        if let Some(connection) = connection {
            connection.last_scan_at = Some(now);
        }
        uow.commit();
    }
}

/// The next instant matching `{frequency, hour, day_of_week}` strictly
/// after `after`.
fn next_fire(
    frequency: ScanFrequency,
    hour: u8,
    day_of_week: Option<u8>,
    after: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let at_hour = |date: chrono::NaiveDate| {
        date.and_hms_opt(u32::from(hour), 0, 0)
            .map(|naive| naive.and_utc())
    };

    match frequency {
        ScanFrequency::Daily => {
            let today = at_hour(after.date_naive())?;
            if today > after {
                Some(today)
            } else {
                at_hour(after.date_naive() + Days::new(1))
            }
        }
        ScanFrequency::Weekly => {
            let target = u32::from(day_of_week.unwrap_or(0));
            let current = after.date_naive().weekday().num_days_from_monday();
            let days_ahead = (7 + target - current.min(6)) % 7;
            let candidate = at_hour(after.date_naive() + Days::new(u64::from(days_ahead)))?;
            if candidate > after {
                Some(candidate)
            } else {
                at_hour(after.date_naive() + Days::new(u64::from(days_ahead) + 7))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn instant(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().expect("instant")
    }

    #[test]
    fn daily_fires_at_the_next_matching_hour() {
        let now = instant(2026, 3, 10, 5);
        assert_eq!(
            next_fire(ScanFrequency::Daily, 6, None, now),
            Some(instant(2026, 3, 10, 6))
        );
        assert_eq!(
            next_fire(ScanFrequency::Daily, 6, None, instant(2026, 3, 10, 7)),
            Some(instant(2026, 3, 11, 6))
        );
    }

    #[test]
    fn weekly_fires_on_the_requested_weekday() {
        // 2026-03-10 is a Tuesday (weekday 1).
        let now = instant(2026, 3, 10, 12);
        let next = next_fire(ScanFrequency::Weekly, 9, Some(4), now).expect("next");
        assert_eq!(next.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 13).expect("date"));

        // Same weekday but the hour already passed rolls a full week.
        let rolled = next_fire(ScanFrequency::Weekly, 9, Some(1), now).expect("rolled");
        assert_eq!(
            rolled.date_naive(),
            NaiveDate::from_ymd_opt(2026, 3, 17).expect("date")
        );
    }
}
