use alloy::primitives::{B256, Log, keccak256};
use herald_common::types::{OutcomeFamily, RawOutcome};

use crate::{OutcomeDecoder, decode_completion};

/// Decoder for
/// `BattleRoyaleCompleted(uint256 indexed royaleId, address indexed winner, uint256 prize)`.
///
/// The event does not carry the mode (5 / 100 / 1000 players); the ingestor
/// learns it from the follow-up contract read.
pub struct BattleRoyaleDecoder {
    battle_royale_completed: B256,
    decimals: u8,
}

impl BattleRoyaleDecoder {
    pub fn new(decimals: u8) -> Self {
        Self {
            battle_royale_completed: keccak256("BattleRoyaleCompleted(uint256,address,uint256)"),
            decimals,
        }
    }
}

impl OutcomeDecoder for BattleRoyaleDecoder {
    fn event_signatures(&self) -> Vec<B256> {
        vec![self.battle_royale_completed]
    }

    fn decode(&self, log: &Log) -> Option<RawOutcome> {
        decode_completion(
            log,
            self.battle_royale_completed,
            OutcomeFamily::BattleRoyale,
            self.decimals,
        )
    }

    fn name(&self) -> &'static str {
        "Battle Royale"
    }
}
