pub mod amount;
pub mod battle_royale;
pub mod duel;
pub mod normalize;


use alloy::primitives::{B256, Log};
use herald_common::types::RawOutcome;

/// Trait that all outcome event decoders must implement.
pub trait OutcomeDecoder: Send + Sync {
    /// Returns the event topic signatures this decoder handles.
    fn event_signatures(&self) -> Vec<B256>;

    /// Attempt to decode a raw log entry into a `RawOutcome`.
    /// Returns `None` if the topic is not handled or the log is malformed.
    fn decode(&self, log: &Log) -> Option<RawOutcome>;

    /// Human-readable name for this decoder.
    fn name(&self) -> &'static str;
}

/// Registry of the game contract's completion event decoders.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn OutcomeDecoder>>,
}

impl DecoderRegistry {
    /// Create a registry with the duel and battle royale decoders.
    ///
    /// `decimals` is the precision of the prize token (18 for native ETH).
    pub fn new(decimals: u8) -> Self {
        Self {
            decoders: vec![
                Box::new(duel::DuelDecoder::new(decimals)),
                Box::new(battle_royale::BattleRoyaleDecoder::new(decimals)),
            ],
        }
    }

    /// Try to decode a log using all registered decoders.
    /// Returns the first successful decode, or `None`.
    pub fn decode(&self, log: &Log) -> Option<RawOutcome> {
        for decoder in &self.decoders {
            if let Some(outcome) = decoder.decode(log) {
                tracing::debug!(
                    decoder = decoder.name(),
                    family = %outcome.family,
                    match_id = outcome.match_id,
                    "Decoded outcome event"
                );
                return Some(outcome);
            }
        }
        None
    }

    /// Get all event signatures across all registered decoders.
    pub fn all_signatures(&self) -> Vec<B256> {
        self.decoders
            .iter()
            .flat_map(|d| d.event_signatures())
            .collect()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new(amount::NATIVE_DECIMALS)
    }
}

/// Read a `uint256` topic as `u64`, rejecting values that do not fit.
pub(crate) fn topic_to_u64(topic: &B256) -> Option<u64> {
    let value = alloy::primitives::U256::from_be_bytes(topic.0);
    u64::try_from(value).ok()
}

/// Read an indexed `address` topic as a lowercase 0x-prefixed string.
pub(crate) fn topic_to_address(topic: &B256) -> String {
    format!("0x{}", alloy::hex::encode(&topic.as_slice()[12..32]))
}

/// Read the 32-byte word at `offset` of the log data as a `U256`.
pub(crate) fn word_to_u256(data: &[u8], offset: usize) -> Option<alloy::primitives::U256> {
    let bytes: [u8; 32] = data.get(offset..offset + 32)?.try_into().ok()?;
    Some(alloy::primitives::U256::from_be_bytes(bytes))
}

/// Shared layout of both completion events:
/// `(uint256 indexed matchId, address indexed winner, uint256 prize)`.
pub(crate) fn decode_completion(
    log: &Log,
    signature: B256,
    family: herald_common::types::OutcomeFamily,
    decimals: u8,
) -> Option<RawOutcome> {
    let topics = log.topics();
    if topics.first() != Some(&signature) {
        return None;
    }

    let (Some(id_topic), Some(winner_topic)) = (topics.get(1), topics.get(2)) else {
        tracing::warn!(%family, address = %log.address, "Completion event missing indexed topics");
        return None;
    };
    let Some(match_id) = topic_to_u64(id_topic) else {
        tracing::warn!(%family, topic = %id_topic, "Match id does not fit in u64");
        return None;
    };
    let Some(prize) = word_to_u256(log.data.data.as_ref(), 0) else {
        tracing::warn!(%family, match_id, "Completion event missing prize word");
        return None;
    };

    Some(RawOutcome {
        family,
        match_id,
        winner_address: topic_to_address(winner_topic),
        prize_amount: amount::format_amount(prize, decimals),
    })
}
