//! Normalization of loosely-shaped JSON payloads.
//!
//! Outcome events replayed from indexers and registration events posted by the
//! client platform do not agree on field names. Everything is mapped onto the
//! canonical types here, before any core logic sees it.

use serde_json::Value;

use herald_common::error::AppError;
use herald_common::types::{DeliveryTarget, OutcomeFamily, RawOutcome, normalize_address};

const MATCH_ID_KEYS: &[&str] = &["matchId", "match_id", "duelId", "royaleId", "battleRoyaleId", "id"];
const WINNER_KEYS: &[&str] = &["winnerAddress", "winner_address", "winner"];
const PRIZE_KEYS: &[&str] = &["prizeAmount", "prize_amount", "prize", "amount"];

const EVENT_KEYS: &[&str] = &["event", "type", "eventType"];
const USER_ID_KEYS: &[&str] = &["fid", "userId", "user_id", "id"];
const ADDRESS_KEYS: &[&str] = &["walletAddress", "wallet_address", "address", "custodyAddress"];
const NAME_KEYS: &[&str] = &["displayName", "display_name", "username"];
const DETAILS_KEYS: &[&str] = &["notificationDetails", "notification_details", "notifications"];
const ENDPOINT_KEYS: &[&str] = &["url", "endpoint"];
const TOKEN_KEYS: &[&str] = &["token"];

/// A registration-channel event in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// The user added the app; credentials are present if they also opted into notifications.
    Added {
        id: i64,
        wallet_address: Option<String>,
        display_name: Option<String>,
        target: Option<DeliveryTarget>,
    },
    Removed {
        id: i64,
    },
    NotificationsEnabled {
        id: i64,
        target: DeliveryTarget,
    },
    NotificationsDisabled {
        id: i64,
    },
}

impl RegistrationEvent {
    pub fn recipient_id(&self) -> i64 {
        match self {
            RegistrationEvent::Added { id, .. }
            | RegistrationEvent::Removed { id }
            | RegistrationEvent::NotificationsEnabled { id, .. }
            | RegistrationEvent::NotificationsDisabled { id } => *id,
        }
    }
}

/// Map an outcome payload with any of the known field spellings onto `RawOutcome`.
pub fn normalize_outcome(family: OutcomeFamily, value: &Value) -> Result<RawOutcome, AppError> {
    let value = unwrap_envelope(value);

    let match_id = first(value, MATCH_ID_KEYS)
        .and_then(as_u64)
        .ok_or_else(|| AppError::Decode("outcome is missing a numeric match id".to_string()))?;
    let winner = first(value, WINNER_KEYS)
        .and_then(Value::as_str)
        .map(normalize_address)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::Decode(format!("outcome {} is missing the winner", match_id)))?;
    let prize = first(value, PRIZE_KEYS)
        .and_then(as_decimal_string)
        .unwrap_or_else(|| "0".to_string());

    Ok(RawOutcome {
        family,
        match_id,
        winner_address: winner,
        prize_amount: prize,
    })
}

/// Map a registration webhook body onto a `RegistrationEvent`.
pub fn normalize_registration(value: &Value) -> Result<RegistrationEvent, AppError> {
    let value = unwrap_envelope(value);

    let kind = first(value, EVENT_KEYS)
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Decode("registration event has no event type".to_string()))?;
    let id = first(value, USER_ID_KEYS)
        .and_then(as_u64)
        .and_then(|id| i64::try_from(id).ok())
        .ok_or_else(|| AppError::Decode("registration event has no user id".to_string()))?;
    let target = first(value, DETAILS_KEYS).and_then(delivery_target);

    match kind {
        "miniapp_added" | "frame_added" => Ok(RegistrationEvent::Added {
            id,
            wallet_address: first(value, ADDRESS_KEYS)
                .and_then(Value::as_str)
                .map(normalize_address)
                .filter(|a| !a.is_empty()),
            display_name: first(value, NAME_KEYS)
                .and_then(Value::as_str)
                .map(str::to_string),
            target,
        }),
        "miniapp_removed" | "frame_removed" => Ok(RegistrationEvent::Removed { id }),
        "notifications_enabled" => {
            let target = target.ok_or_else(|| {
                AppError::Decode(format!(
                    "notifications_enabled for {} is missing url/token",
                    id
                ))
            })?;
            Ok(RegistrationEvent::NotificationsEnabled { id, target })
        }
        "notifications_disabled" => Ok(RegistrationEvent::NotificationsDisabled { id }),
        other => Err(AppError::Decode(format!(
            "unknown registration event '{}'",
            other
        ))),
    }
}

/// Some senders wrap the body in `{"data": {...}}` or `{"payload": {...}}`.
fn unwrap_envelope(value: &Value) -> &Value {
    for key in ["data", "payload"] {
        if let Some(inner) = value.get(key)
            && inner.is_object()
        {
            return inner;
        }
    }
    value
}

fn first<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| value.get(*k))
        .find(|v| !v.is_null())
}

fn delivery_target(details: &Value) -> Option<DeliveryTarget> {
    let endpoint = first(details, ENDPOINT_KEYS).and_then(Value::as_str)?;
    let token = first(details, TOKEN_KEYS).and_then(Value::as_str)?;
    DeliveryTarget::new(endpoint, token)
}

/// Accept JSON numbers, decimal strings, and 0x-prefixed hex strings.
fn as_u64(value: &Value) -> Option<u64> {
    if let Some(n) = value.as_u64() {
        return Some(n);
    }
    let s = value.as_str()?.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn as_decimal_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
