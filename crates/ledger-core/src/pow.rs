use crate::block::{hash_with_nonce, Block, BlockTemplate};
use crate::constants::CANCEL_CHECK_STRIDE;
use crate::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a nonce search polls. Cloning shares the flag.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub fn count_leading_zero_bits(hash: &Hash) -> u32 {
    let mut total = 0u32;
    for b in hash {
        if *b == 0 {
            total += 8;
        } else {
            total += b.leading_zeros();
            break;
        }
    }
    total
}

/// True when the hex digest starts with at least `difficulty` zero bits.
/// Anything that is not a 32-byte hex digest never matches.
pub fn hash_matches_difficulty(hash_hex: &str, difficulty: u32) -> bool {
    let mut hash = [0u8; 32];
    if hex::decode_to_slice(hash_hex, &mut hash).is_err() {
        return false;
    }
    count_leading_zero_bits(&hash) >= difficulty
}

/// Mine the block by incrementing the nonce from zero until the hash has at
/// least `difficulty` leading zero bits. The nonce wraps instead of stopping.
pub fn find_block(
    index: u64,
    previous_hash: Option<String>,
    timestamp: u64,
    data: Vec<crate::Transaction>,
    difficulty: u32,
) -> Block {
    let template = BlockTemplate {
        index,
        previous_hash,
        timestamp,
        data,
        difficulty,
    };
    let mut nonce = 0u64;
    let prefix = template.hasher();
    loop {
        if count_leading_zero_bits(&hash_with_nonce(&prefix, nonce)) >= difficulty {
            return template.seal(nonce);
        }
        nonce = nonce.wrapping_add(1);
    }
}

/// Like [`find_block`] but gives up once `cancel` fires. The token is polled
/// every [`CANCEL_CHECK_STRIDE`] nonces.
pub fn search(template: BlockTemplate, cancel: &CancellationToken) -> Option<Block> {
    let prefix = template.hasher();
    let mut nonce = 0u64;
    loop {
        if nonce % CANCEL_CHECK_STRIDE == 0 && cancel.is_cancelled() {
            return None;
        }
        if count_leading_zero_bits(&hash_with_nonce(&prefix, nonce)) >= template.difficulty {
            return Some(template.seal(nonce));
        }
        nonce = nonce.wrapping_add(1);
    }
}
