pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const ADDRESS_HEX_SIZE: usize = 130;
pub const ADDRESS_PREFIX: &str = "04";

pub const COINBASE_AMOUNT: u64 = 50;
pub const BLOCK_GENERATION_INTERVAL_MS: u64 = 10 * 1000;
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 10;
pub const TIMESTAMP_TOLERANCE_MS: u64 = 60 * 1000;

/// How many nonces the sequential search tries between cancellation checks.
pub const CANCEL_CHECK_STRIDE: u64 = 1 << 12;
