use crate::constants::{
    BLOCK_GENERATION_INTERVAL_MS, COINBASE_AMOUNT, DIFFICULTY_ADJUSTMENT_INTERVAL,
    TIMESTAMP_TOLERANCE_MS,
};
use serde::{Deserialize, Serialize};

/// Consensus knobs shared by every node on a network.
///
/// The genesis block does not depend on these values, so two nodes with
/// different params still agree on block 0 but will reject each other's
/// later blocks.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChainParams {
    pub coinbase_amount: u64,
    pub block_generation_interval_ms: u64,
    pub difficulty_adjustment_interval: u64,
    pub timestamp_tolerance_ms: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            coinbase_amount: COINBASE_AMOUNT,
            block_generation_interval_ms: BLOCK_GENERATION_INTERVAL_MS,
            difficulty_adjustment_interval: DIFFICULTY_ADJUSTMENT_INTERVAL,
            timestamp_tolerance_ms: TIMESTAMP_TOLERANCE_MS,
        }
    }
}

impl ChainParams {
    /// Time a full adjustment window is expected to take.
    pub fn expected_window_ms(&self) -> u64 {
        self.block_generation_interval_ms
            .saturating_mul(self.difficulty_adjustment_interval)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Split the nonce space across the rayon pool instead of walking it from zero.
    pub parallel: bool,
}
