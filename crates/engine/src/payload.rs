//! Notification copy for game outcomes.

use herald_common::types::{GameKind, GameOutcomeEvent, NotificationPayload, Recipient};

use crate::idempotency;

/// Limits enforced by the delivery endpoint.
pub const TITLE_MAX_CHARS: usize = 32;
pub const BODY_MAX_CHARS: usize = 128;
pub const NOTIFICATION_ID_MAX_CHARS: usize = 128;

/// Settings shared by every payload the engine builds.
#[derive(Debug, Clone)]
pub struct PayloadContext {
    /// Base URL of the app, without trailing slash.
    pub app_url: String,
    pub currency_symbol: String,
}

impl PayloadContext {
    pub fn new(app_url: impl Into<String>, currency_symbol: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into().trim_end_matches('/').to_string(),
            currency_symbol: currency_symbol.into(),
        }
    }

    pub fn match_url(&self, kind: GameKind, match_id: u64) -> String {
        match kind {
            GameKind::Duel => format!("{}/duel/{}", self.app_url, match_id),
            _ => format!("{}/battle-royale/{}", self.app_url, match_id),
        }
    }
}

/// Build a payload, clamping each field to the endpoint's limits.
pub fn build(
    notification_id: String,
    title: &str,
    body: &str,
    target_url: String,
) -> NotificationPayload {
    NotificationPayload {
        notification_id: truncate(&notification_id, NOTIFICATION_ID_MAX_CHARS),
        title: truncate(title, TITLE_MAX_CHARS),
        body: truncate(body, BODY_MAX_CHARS),
        target_url,
    }
}

/// Win or loss framing for one participant of a finished match.
pub fn outcome_payload(
    ctx: &PayloadContext,
    event: &GameOutcomeEvent,
    recipient: &Recipient,
) -> NotificationPayload {
    let won = event.is_winner(&recipient.wallet_address);
    let prize = format!("{} {}", event.prize_amount, ctx.currency_symbol);
    let id = event.match_id;

    let (title, body) = match (event.kind, won) {
        (GameKind::Duel, true) => (
            format!("You won Duel #{}!", id),
            format!(
                "Congrats {}! You won {} in duel #{}.",
                greeting_name(recipient),
                prize,
                id
            ),
        ),
        (GameKind::Duel, false) => (
            format!("Duel #{} lost", id),
            format!(
                "{} beat you in duel #{}. Challenge them to a rematch!",
                short_address(&event.winner_address),
                id
            ),
        ),
        (kind, true) => (
            format!("Battle Royale #{} victory!", id),
            format!(
                "You outlasted {} players in {} #{} and won {}!",
                event.participant_addresses.len().saturating_sub(1),
                kind.label(),
                id,
                prize
            ),
        ),
        (kind, false) => (
            format!("Battle Royale #{} is over", id),
            format!(
                "{} won {} in {} #{}. Jump into the next round!",
                short_address(&event.winner_address),
                prize,
                kind.label(),
                id
            ),
        ),
    };

    build(
        idempotency::outcome_key(event.kind, id, recipient.id),
        &title,
        &body,
        ctx.match_url(event.kind, id),
    )
}

fn greeting_name(recipient: &Recipient) -> &str {
    let name = recipient.display_name.trim();
    if name.is_empty() { "champ" } else { name }
}

/// `0x1234…abcd` form for copy.
pub fn short_address(address: &str) -> String {
    if address.len() <= 12 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}…{}", &address[..6], &address[address.len() - 4..])
}

/// Cut to at most `max` characters, marking the cut with an ellipsis.
pub fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }
    let mut out: String = value.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
