use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::EmailConnectionId;
use crate::LedgerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanFrequency {
    Daily,
    Weekly,
}

/// The persisted side of a mailbox authorization used for statement scans.
/// The refresh token is an opaque ciphertext; only the crypto layer can
/// open it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConnection {
    pub id: EmailConnectionId,
    pub ledger_id: LedgerId,
    pub status: ConnectionStatus,
    pub encrypted_refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_frequency: Option<ScanFrequency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_day_of_week: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_scan_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
