use std::sync::Arc;

use abacus_crypto::EnvelopeKey;
use abacus_model::ConnectionStatus;
use abacus_model::EmailConnection;
use abacus_model::LedgerId;
use abacus_model::ScanFrequency;
use abacus_model::UserId;
use abacus_store::MemoryStore;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::SchedulerError;
use crate::SchedulerResult;

/// Mailbox authorizations behind the statement scans. The OAuth handshake
/// happens elsewhere; this engine accepts the resulting refresh token as
/// an opaque blob and keeps it encrypted at rest under the process key.
#[derive(Clone)]
pub struct EmailConnectionEngine {
    store: Arc<MemoryStore>,
    key: EnvelopeKey,
}

impl EmailConnectionEngine {
    #[must_use]
    pub fn new(store: Arc<MemoryStore>, key: EnvelopeKey) -> Self {
        Self { store, key }
    }

    pub async fn connect(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
        refresh_token: &str,
        schedule_frequency: Option<ScanFrequency>,
        schedule_hour: Option<u8>,
        schedule_day_of_week: Option<u8>,
    ) -> SchedulerResult<EmailConnection> {
        if let Some(hour) = schedule_hour
            && hour > 23
        {
            return Err(SchedulerError::Validation("hour must be within 0..=23".into()));
        }
        let encrypted_refresh_token = self
            .key
            .encrypt(refresh_token)
            .map_err(|err| SchedulerError::Validation(err.to_string()))?;

        let mut uow = self.store.unit_of_work().await;
        let owned = uow
            .ledgers
            .get(&ledger_id)
            .is_some_and(|ledger| ledger.user_id == user_id);
        if !owned {
            return Err(SchedulerError::NotFound(format!("ledger {ledger_id}")));
        }

        // One connection per ledger; reconnecting replaces it.
        uow.email_connections
            .retain(|_, connection| connection.ledger_id != ledger_id);
        let connection = EmailConnection {
            id: Uuid::new_v4(),
            ledger_id,
            status: ConnectionStatus::Connected,
            encrypted_refresh_token,
            schedule_frequency,
            schedule_hour,
            schedule_day_of_week,
            last_scan_at: None,
            created_at: Utc::now(),
        };
        uow.email_connections.insert(connection.id, connection.clone());
        uow.commit();
        info!(ledger_id = %ledger_id, "connected mailbox");
        Ok(connection)
    }

    pub async fn disconnect(&self, user_id: UserId, ledger_id: LedgerId) -> SchedulerResult<()> {
        let mut uow = self.store.unit_of_work().await;
        let owned = uow
            .ledgers
            .get(&ledger_id)
            .is_some_and(|ledger| ledger.user_id == user_id);
        if !owned {
            return Err(SchedulerError::NotFound(format!("ledger {ledger_id}")));
        }
        let connection = uow
            .email_connections
            .values_mut()
            .find(|connection| connection.ledger_id == ledger_id)
            .ok_or_else(|| SchedulerError::NotFound(format!("connection for {ledger_id}")))?;
        connection.status = ConnectionStatus::Disconnected;
        uow.commit();
        Ok(())
    }

    pub async fn get_connection(
        &self,
        user_id: UserId,
        ledger_id: LedgerId,
    ) -> SchedulerResult<EmailConnection> {
        let state = self.store.read().await;
        state
            .ledgers
            .get(&ledger_id)
            .filter(|ledger| ledger.user_id == user_id)
            .ok_or_else(|| SchedulerError::NotFound(format!("ledger {ledger_id}")))?;
        state
            .email_connections
            .values()
            .find(|connection| connection.ledger_id == ledger_id)
            .cloned()
            .ok_or_else(|| SchedulerError::NotFound(format!("connection for {ledger_id}")))
    }

    /// Open the stored ciphertext for the scan runner's outbound call.
    pub fn refresh_token(&self, connection: &EmailConnection) -> SchedulerResult<String> {
        self.key
            .decrypt(&connection.encrypted_refresh_token)
            .map_err(|err| SchedulerError::Internal(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abacus_ledger::LedgerEngine;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn refresh_tokens_are_opaque_at_rest() {
        let store = MemoryStore::shared();
        let user_id = Uuid::new_v4();
        let ledger = LedgerEngine::new(store.clone())
            .create_ledger(user_id, "Book", Decimal::ZERO)
            .await
            .expect("ledger");

        let engine = EmailConnectionEngine::new(store.clone(), EnvelopeKey::generate());
        let connection = engine
            .connect(
                user_id,
                ledger.id,
                "refresh-abc123",
                Some(ScanFrequency::Daily),
                Some(6),
                None,
            )
            .await
            .expect("connect");

        assert_ne!(connection.encrypted_refresh_token, "refresh-abc123");
        assert!(!connection.encrypted_refresh_token.contains("refresh-abc123"));
        assert_eq!(
            engine.refresh_token(&connection).expect("decrypt"),
            "refresh-abc123"
        );

        engine.disconnect(user_id, ledger.id).await.expect("disconnect");
        let stored = engine
            .get_connection(user_id, ledger.id)
            .await
            .expect("connection");
        assert_eq!(stored.status, ConnectionStatus::Disconnected);
    }
}
