//! Deterministic notification ids.
//!
//! The id is sent as `notificationId`; the delivery endpoint drops a second
//! notification with the same id for the same token, so a replayed event or a
//! re-run of the daily job cannot double-notify.

use chrono::NaiveDate;

use herald_common::types::GameKind;

pub fn outcome_key(kind: GameKind, match_id: u64, recipient_id: i64) -> String {
    format!("{}:{}:{}", kind, match_id, recipient_id)
}

pub fn reminder_key(day: NaiveDate, recipient_id: i64) -> String {
    format!("daily-reminder:{}:{}", day.format("%Y-%m-%d"), recipient_id)
}
