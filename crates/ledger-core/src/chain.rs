//! Block and chain validity, chain work, and rebuilding UTXO state from a chain.
//!
//! Everything here is pure: the caller supplies the clock reading and the
//! parameters, so the [`Ledger`](crate::ledger::Ledger) can validate a
//! candidate chain without holding its lock.

use crate::block::Block;
use crate::config::ChainParams;
use crate::error::{ConsensusError, Result};
use crate::pow::hash_matches_difficulty;
use crate::transaction::Transaction;
use crate::utxo::UtxoSet;
use crate::validation::apply_transactions;
use num_bigint::BigUint;
use std::collections::HashSet;

pub const GENESIS_TIMESTAMP: u64 = 1_521_168_884_757;
pub const GENESIS_ADDRESS: &str = "04572b97060884228ad8ad8dc5183e9a705a4ac12a1bdbe4c46994245b4d4ed3c34fb393e1e96a206185c37cace2957f93417d5666b85ed76fbec20b6715f93f07";
pub const GENESIS_REWARD: u64 = 50;

/// The block every chain starts from. It pays a single coinbase to
/// [`GENESIS_ADDRESS`] and does not depend on [`ChainParams`].
pub fn genesis_block() -> Block {
    let coinbase = Transaction::coinbase(GENESIS_ADDRESS, 0, GENESIS_REWARD);
    Block::new(0, None, GENESIS_TIMESTAMP, vec![coinbase], 0, 0)
}

/// UTXO set right after genesis. The genesis coinbase is trusted as-is.
pub fn genesis_utxos() -> UtxoSet {
    UtxoSet::new().spend_and_create(&HashSet::new(), &genesis_block().data)
}

/// Checks `candidate` as the successor of `previous`. Transactions are not
/// applied here; see [`apply_transactions`].
pub fn validate_block(
    candidate: &Block,
    previous: &Block,
    now_ms: u64,
    params: &ChainParams,
) -> Result<()> {
    candidate.check_structure()?;
    let expected = previous.index + 1;
    if candidate.index != expected {
        return Err(ConsensusError::BadIndex {
            expected,
            found: candidate.index,
        }
        .into());
    }
    if candidate.previous_hash.as_deref() != Some(previous.hash.as_str()) {
        return Err(ConsensusError::PreviousHashMismatch.into());
    }
    let computed = candidate.recompute_hash();
    if computed != candidate.hash {
        return Err(ConsensusError::HashMismatch {
            declared: candidate.hash.clone(),
            computed,
        }
        .into());
    }
    if !hash_matches_difficulty(&candidate.hash, candidate.difficulty) {
        return Err(ConsensusError::InsufficientProofOfWork {
            difficulty: candidate.difficulty,
        }
        .into());
    }
    if !is_valid_timestamp(candidate, previous, now_ms, params.timestamp_tolerance_ms) {
        return Err(ConsensusError::TimestampOutOfRange {
            timestamp: candidate.timestamp,
        }
        .into());
    }
    Ok(())
}

/// Loose clock-drift check: within `tolerance_ms` after the previous block's
/// timestamp going backwards, and no further than `tolerance_ms` into the future.
pub fn is_valid_timestamp(candidate: &Block, previous: &Block, now_ms: u64, tolerance_ms: u64) -> bool {
    candidate.timestamp.saturating_add(tolerance_ms) > previous.timestamp
        && candidate.timestamp < now_ms.saturating_add(tolerance_ms)
}

/// Genesis at position 0, then every block validated against its predecessor.
pub fn validate_chain(chain: &[Block], now_ms: u64, params: &ChainParams) -> Result<()> {
    let Some(first) = chain.first() else {
        return Err(ConsensusError::EmptyChain.into());
    };
    if *first != genesis_block() {
        return Err(ConsensusError::GenesisMismatch.into());
    }
    for pair in chain.windows(2) {
        validate_block(&pair[1], &pair[0], now_ms, params)?;
    }
    Ok(())
}

pub fn is_chain_valid(chain: &[Block], now_ms: u64, params: &ChainParams) -> bool {
    validate_chain(chain, now_ms, params).is_ok()
}

/// Sum of `2^difficulty` over every block.
pub fn cumulative_work(chain: &[Block]) -> BigUint {
    chain.iter().map(Block::work).sum()
}

/// UTXO set obtained by applying every block after genesis in order.
/// Assumes `chain` starts with the genesis block.
pub fn replay(chain: &[Block], params: &ChainParams) -> Result<UtxoSet> {
    chain
        .iter()
        .skip(1)
        .try_fold(genesis_utxos(), |utxos, block| {
            apply_transactions(&block.data, &utxos, block.index, params)
        })
}
