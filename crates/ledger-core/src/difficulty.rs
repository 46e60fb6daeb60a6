//! Difficulty retargeting.
//!
//! The target only moves at checkpoints, every `difficulty_adjustment_interval`
//! blocks. At a checkpoint the time the last window took is compared against
//! the expected window time: under half of it raises the difficulty by one,
//! over double lowers it by one. Anything in between, or any height that is
//! not a checkpoint, keeps the newest block's difficulty.

use crate::block::Block;
use crate::config::ChainParams;
use tracing::info;

/// Difficulty the block after `chain`'s newest must be mined at.
/// An empty chain needs no work.
pub fn required_difficulty(chain: &[Block], params: &ChainParams) -> u32 {
    let Some(newest) = chain.last() else {
        return 0;
    };
    let interval = params.difficulty_adjustment_interval;
    if interval == 0 || newest.index == 0 || newest.index % interval != 0 {
        return newest.difficulty;
    }
    let checkpoint = usize::try_from(newest.index - interval)
        .ok()
        .and_then(|position| chain.get(position));
    match checkpoint {
        Some(checkpoint) => adjusted_difficulty(newest, checkpoint, params),
        None => newest.difficulty,
    }
}

fn adjusted_difficulty(newest: &Block, checkpoint: &Block, params: &ChainParams) -> u32 {
    let expected = params.expected_window_ms();
    let taken = newest.timestamp.saturating_sub(checkpoint.timestamp);
    let next = if taken < expected / 2 {
        newest.difficulty.saturating_add(1)
    } else if taken > expected.saturating_mul(2) {
        newest.difficulty.saturating_sub(1)
    } else {
        newest.difficulty
    };
    if next != newest.difficulty {
        info!(
            height = newest.index,
            taken_ms = taken,
            expected_ms = expected,
            from = newest.difficulty,
            to = next,
            "difficulty retarget"
        );
    }
    next
}
