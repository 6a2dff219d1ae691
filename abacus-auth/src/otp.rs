use std::collections::HashMap;
use std::sync::Mutex;

use abacus_crypto::generate_otp_code;
use abacus_model::Channel;
use abacus_model::LedgerId;
use abacus_model::UserId;
use chrono::DateTime;
use chrono::Duration;
use chrono::Utc;

pub const CODE_TTL_SECONDS: i64 = 300;

#[derive(Debug, Clone)]
pub(crate) struct CodeEntry {
    pub user_id: UserId,
    pub channel: Channel,
    pub default_ledger_id: Option<LedgerId>,
    pub expires_at: DateTime<Utc>,
}

/// Process-local one-time-code store. Deliberately ephemeral: a restart
/// wipes it and outstanding codes simply have to be regenerated, which is
/// within their five-minute lifetime anyway.
#[derive(Debug, Default)]
pub struct OtpStore {
    codes: Mutex<HashMap<String, CodeEntry>>,
}

impl OtpStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn issue(
        &self,
        user_id: UserId,
        channel: Channel,
        default_ledger_id: Option<LedgerId>,
    ) -> String {
        let mut codes = self.codes.lock().unwrap_or_else(|poison| poison.into_inner());
        loop {
            let code = generate_otp_code();
            if codes.contains_key(&code) {
                continue;
            }
            codes.insert(
                code.clone(),
                CodeEntry {
                    user_id,
                    channel,
                    default_ledger_id,
                    expires_at: Utc::now() + Duration::seconds(CODE_TTL_SECONDS),
                },
            );
            return code;
        }
    }

    /// Consume a code. The entry is removed on the first lookup whether it
    /// is live or expired, so a code never verifies twice.
    pub(crate) fn take(&self, code: &str) -> Option<CodeEntry> {
        let mut codes = self.codes.lock().unwrap_or_else(|poison| poison.into_inner());
        let entry = codes.remove(code)?;
        if entry.expires_at < Utc::now() {
            return None;
        }
        Some(entry)
    }

    /// Force a code past its TTL without waiting five minutes.
    pub fn expire_code(&self, code: &str) {
        let mut codes = self.codes.lock().unwrap_or_else(|poison| poison.into_inner());
        if let Some(entry) = codes.get_mut(code) {
            entry.expires_at = Utc::now() - Duration::seconds(1);
        }
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.codes
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .len()
    }
}
