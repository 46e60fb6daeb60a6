use crate::block::{hash_with_nonce, Block, BlockTemplate};
use crate::pow::{count_leading_zero_bits, CancellationToken};
use rayon::prelude::*;
use tracing::info;

/// Searches nonces in parallel until a hash has at least `template.difficulty`
/// leading zero bits. Returns `None` if `cancel` fires first; a solution found
/// after cancellation is discarded as stale.
pub fn search_parallel(template: BlockTemplate, cancel: &CancellationToken) -> Option<Block> {
    let prefix = template.hasher();
    let target = template.difficulty;

    // Rayon splits the nonce range across threads; any worker observing the
    // token ends the search.
    let found = (0u64..u64::MAX).into_par_iter().find_any(|nonce| {
        cancel.is_cancelled() || count_leading_zero_bits(&hash_with_nonce(&prefix, *nonce)) >= target
    })?;
    if cancel.is_cancelled() {
        return None;
    }

    let block = template.seal(found);
    info!(index = block.index, nonce = found, hash = %block.hash, "mined block");
    Some(block)
}
