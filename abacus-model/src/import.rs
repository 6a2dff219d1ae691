use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;

use crate::ImportSessionId;
use crate::LedgerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImportType {
    #[serde(rename = "MYAB_CSV")]
    MyabCsv,
    #[serde(rename = "CREDIT_CARD")]
    CreditCard,
    #[serde(rename = "GMAIL_CC")]
    GmailCc,
    #[serde(rename = "BANK_RECORD")]
    BankRecord,
}

impl std::fmt::Display for ImportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImportType::MyabCsv => write!(f, "MYAB_CSV"),
            ImportType::CreditCard => write!(f, "CREDIT_CARD"),
            ImportType::GmailCc => write!(f, "GMAIL_CC"),
            ImportType::BankRecord => write!(f, "BANK_RECORD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// The stateful record connecting an import preview to its later execute.
/// `source_hash` is the SHA-256 of the uploaded content and doubles as the
/// duplicate-upload fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSession {
    pub id: ImportSessionId,
    pub ledger_id: LedgerId,
    pub import_type: ImportType,
    pub source_filename: String,
    pub source_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_code: Option<String>,
    pub status: ImportStatus,
    pub progress_current: i32,
    pub progress_total: i32,
    pub imported_count: i32,
    pub skipped_count: i32,
    pub error_count: i32,
    pub created_accounts_count: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn import_types_persist_their_identifiers() {
        for (value, text) in [
            (ImportType::MyabCsv, "\"MYAB_CSV\""),
            (ImportType::CreditCard, "\"CREDIT_CARD\""),
            (ImportType::GmailCc, "\"GMAIL_CC\""),
            (ImportType::BankRecord, "\"BANK_RECORD\""),
        ] {
            assert_eq!(serde_json::to_string(&value).expect("serialize"), text);
        }
    }
}
