use alloy::primitives::{B256, Log, keccak256};
use herald_common::types::{OutcomeFamily, RawOutcome};

use crate::{OutcomeDecoder, decode_completion};

/// Decoder for `DuelCompleted(uint256 indexed duelId, address indexed winner, uint256 prize)`.
pub struct DuelDecoder {
    duel_completed: B256,
    decimals: u8,
}

impl DuelDecoder {
    pub fn new(decimals: u8) -> Self {
        Self {
            duel_completed: keccak256("DuelCompleted(uint256,address,uint256)"),
            decimals,
        }
    }
}

impl OutcomeDecoder for DuelDecoder {
    fn event_signatures(&self) -> Vec<B256> {
        vec![self.duel_completed]
    }

    fn decode(&self, log: &Log) -> Option<RawOutcome> {
        decode_completion(log, self.duel_completed, OutcomeFamily::Duel, self.decimals)
    }

    fn name(&self) -> &'static str {
        "Duel"
    }
}
