use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Lowercase and trim a wallet address so lookups are case-insensitive.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Kind of completed match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "text")]
pub enum GameKind {
    #[serde(rename = "duel")]
    #[sqlx(rename = "duel")]
    Duel,
    #[serde(rename = "battle-royale-5")]
    #[sqlx(rename = "battle-royale-5")]
    BattleRoyale5,
    #[serde(rename = "battle-royale-100")]
    #[sqlx(rename = "battle-royale-100")]
    BattleRoyale100,
    #[serde(rename = "battle-royale-1000")]
    #[sqlx(rename = "battle-royale-1000")]
    BattleRoyale1000,
}

impl GameKind {
    pub fn is_battle_royale(&self) -> bool {
        !matches!(self, GameKind::Duel)
    }

    /// Map the on-chain battle royale mode byte onto a kind.
    pub fn from_battle_royale_mode(mode: u8) -> Option<Self> {
        match mode {
            0 => Some(GameKind::BattleRoyale5),
            1 => Some(GameKind::BattleRoyale100),
            2 => Some(GameKind::BattleRoyale1000),
            _ => None,
        }
    }

    /// Human-readable label used in notification copy.
    pub fn label(&self) -> &'static str {
        match self {
            GameKind::Duel => "Duel",
            GameKind::BattleRoyale5 => "Battle Royale (5)",
            GameKind::BattleRoyale100 => "Battle Royale (100)",
            GameKind::BattleRoyale1000 => "Battle Royale (1000)",
        }
    }
}

impl std::fmt::Display for GameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameKind::Duel => write!(f, "duel"),
            GameKind::BattleRoyale5 => write!(f, "battle-royale-5"),
            GameKind::BattleRoyale100 => write!(f, "battle-royale-100"),
            GameKind::BattleRoyale1000 => write!(f, "battle-royale-1000"),
        }
    }
}

impl std::str::FromStr for GameKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "duel" => Ok(GameKind::Duel),
            "battle-royale-5" => Ok(GameKind::BattleRoyale5),
            "battle-royale-100" => Ok(GameKind::BattleRoyale100),
            "battle-royale-1000" => Ok(GameKind::BattleRoyale1000),
            other => Err(format!("unknown game kind '{}'", other)),
        }
    }
}

/// The two families of completion events emitted by the game contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeFamily {
    Duel,
    BattleRoyale,
}

impl std::fmt::Display for OutcomeFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeFamily::Duel => write!(f, "duel"),
            OutcomeFamily::BattleRoyale => write!(f, "battle_royale"),
        }
    }
}

/// A completion event as decoded from the chain, before participant lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub family: OutcomeFamily,
    pub match_id: u64,
    pub winner_address: String,
    /// Decimal string in whole units (e.g. "0.018").
    pub prize_amount: String,
}

/// Battle royale metadata fetched with a point read after the completion event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleRoyaleDetails {
    pub kind: GameKind,
    pub bet_amount: String,
    pub started_at: Option<DateTime<Utc>>,
    pub participants: Vec<String>,
}

/// A completed match with its full participant set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameOutcomeEvent {
    pub match_id: u64,
    pub kind: GameKind,
    pub winner_address: String,
    pub prize_amount: String,
    /// Lowercased, deduplicated, original chain order. Always contains the winner.
    pub participant_addresses: Vec<String>,
}

impl GameOutcomeEvent {
    pub fn new(
        match_id: u64,
        kind: GameKind,
        winner_address: &str,
        prize_amount: impl Into<String>,
        participants: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Self {
        let winner_address = normalize_address(winner_address);
        let mut participant_addresses: Vec<String> = Vec::new();
        for address in participants {
            let address = normalize_address(address.as_ref());
            if !address.is_empty() && !participant_addresses.contains(&address) {
                participant_addresses.push(address);
            }
        }
        if !participant_addresses.contains(&winner_address) {
            participant_addresses.push(winner_address.clone());
        }

        Self {
            match_id,
            kind,
            winner_address,
            prize_amount: prize_amount.into(),
            participant_addresses,
        }
    }

    pub fn is_winner(&self, address: &str) -> bool {
        normalize_address(address) == self.winner_address
    }

    /// Participants with the winner moved to the front, others in original order.
    pub fn winner_first(&self) -> Vec<String> {
        let mut ordered = Vec::with_capacity(self.participant_addresses.len());
        ordered.push(self.winner_address.clone());
        ordered.extend(
            self.participant_addresses
                .iter()
                .filter(|a| **a != self.winner_address)
                .cloned(),
        );
        ordered
    }
}

/// Credentials needed to reach one recipient. Both parts are always non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    endpoint: String,
    token: String,
}

impl DeliveryTarget {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Option<Self> {
        let endpoint = endpoint.into();
        let token = token.into();
        if endpoint.trim().is_empty() || token.trim().is_empty() {
            return None;
        }
        Some(Self { endpoint, token })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

/// An identity registered for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipient {
    pub id: i64,
    pub wallet_address: String,
    pub display_name: String,
    pub delivery_endpoint: Option<String>,
    pub delivery_token: Option<String>,
    pub notifications_enabled: bool,
    pub battle_royale_notifications_enabled: bool,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl Recipient {
    /// Both credentials, or `None` if either is missing or blank.
    pub fn delivery_target(&self) -> Option<DeliveryTarget> {
        match (&self.delivery_endpoint, &self.delivery_token) {
            (Some(endpoint), Some(token)) => DeliveryTarget::new(endpoint.clone(), token.clone()),
            _ => None,
        }
    }

    /// Whether `last_notified_at` falls on the same UTC calendar day as `today`.
    pub fn notified_on(&self, today: NaiveDate) -> bool {
        self.last_notified_at
            .map(|at| at.date_naive() == today)
            .unwrap_or(false)
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &RecipientUpdate) {
        if let Some(name) = &update.display_name {
            self.display_name = name.clone();
        }
        if let Some(delivery) = &update.delivery {
            match delivery {
                Some(target) => {
                    self.delivery_endpoint = Some(target.endpoint().to_string());
                    self.delivery_token = Some(target.token().to_string());
                }
                None => {
                    self.delivery_endpoint = None;
                    self.delivery_token = None;
                }
            }
        }
        if let Some(enabled) = update.notifications_enabled {
            self.notifications_enabled = enabled;
        }
        if let Some(enabled) = update.battle_royale_notifications_enabled {
            self.battle_royale_notifications_enabled = enabled;
        }
        if let Some(at) = update.last_notified_at {
            self.last_notified_at = Some(at);
        }
    }
}

/// Partial recipient update. `None` fields are left untouched.
///
/// `delivery` sets or clears both credentials together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipientUpdate {
    pub display_name: Option<String>,
    pub delivery: Option<Option<DeliveryTarget>>,
    pub notifications_enabled: Option<bool>,
    pub battle_royale_notifications_enabled: Option<bool>,
    pub last_notified_at: Option<DateTime<Utc>>,
}

impl RecipientUpdate {
    pub fn last_notified(at: DateTime<Utc>) -> Self {
        Self {
            last_notified_at: Some(at),
            ..Default::default()
        }
    }
}

/// Which recipients `list_eligible` returns.
///
/// Recipients are always required to have notifications enabled and complete
/// delivery credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EligibilityFilter {
    /// Additionally require `battle_royale_notifications_enabled`.
    pub battle_royale: bool,
}

impl EligibilityFilter {
    pub fn matches(&self, recipient: &Recipient) -> bool {
        recipient.notifications_enabled
            && recipient.delivery_target().is_some()
            && (!self.battle_royale || recipient.battle_royale_notifications_enabled)
    }
}

/// Historical summary of a finished battle royale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MatchRecord {
    pub match_id: i64,
    pub kind: GameKind,
    pub winner_address: String,
    pub prize_amount: String,
    pub bet_amount: String,
    pub participant_count: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

/// One participant's outcome in a finished battle royale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ParticipantRecord {
    pub match_id: i64,
    pub kind: GameKind,
    pub wallet_address: String,
    pub recipient_id: Option<i64>,
    pub is_winner: bool,
    /// Prize for the winner, "0" for everyone else.
    pub payout: String,
}

/// Push notification content ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Idempotency key; the endpoint drops repeats of the same id.
    pub notification_id: String,
    pub title: String,
    pub body: String,
    pub target_url: String,
}
