use abacus_model::TransactionId;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::NaiveDate;

/// Opaque page boundary: the `(date, id)` tuple of the last row served,
/// base64-wrapped so callers cannot be tempted to parse it.
#[must_use]
pub fn encode_cursor(date: NaiveDate, id: TransactionId) -> String {
    URL_SAFE_NO_PAD.encode(format!("{date}|{id}"))
}

/// Corrupt or foreign cursors decode to `None`, which readers treat as
/// "first page" rather than an error.
#[must_use]
pub fn decode_cursor(cursor: &str) -> Option<(NaiveDate, TransactionId)> {
    let raw = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let text = String::from_utf8(raw).ok()?;
    let (date, id) = text.split_once('|')?;
    Some((date.parse().ok()?, id.parse().ok()?))
}
