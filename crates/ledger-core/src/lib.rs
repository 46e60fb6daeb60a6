use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod block;
pub mod chain;
pub mod config;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod ledger;
pub mod mempool;
pub mod mine;
pub mod miner;
pub mod node;
pub mod pow;
pub mod sync;
pub mod transaction;
pub mod utxo;
pub mod validation;
pub mod wallet;

pub use block::{Block, BlockTemplate};
pub use config::{ChainParams, MinerConfig};
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use mempool::Mempool;
pub use miner::Miner;
pub use node::Node;
pub use pow::CancellationToken;
pub use transaction::{Transaction, TxIn, TxOut};
pub use utxo::{OutPoint, UnspentTxOut, UtxoSet};
pub use wallet::Wallet;

pub type Hash = [u8; constants::HASH_SIZE];

pub fn sha256(bytes: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    digest_to_hash(&hasher.finalize())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(sha256(bytes))
}

pub(crate) fn digest_to_hash(digest: &[u8]) -> Hash {
    let mut out = [0u8; constants::HASH_SIZE];
    out.copy_from_slice(&digest[..constants::HASH_SIZE]);
    out
}

/// 64 lowercase hex characters.
pub fn is_hex_digest(value: &str) -> bool {
    value.len() == constants::HASH_HEX_SIZE
        && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Milliseconds since the Unix epoch; zero if the clock reads before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn hex_digest_shape() {
        assert!(is_hex_digest(&"ab".repeat(32)));
        assert!(!is_hex_digest(&"AB".repeat(32)));
        assert!(!is_hex_digest(&"ab".repeat(31)));
        assert!(!is_hex_digest(&"zz".repeat(32)));
    }

    #[test]
    fn clock_is_after_genesis() {
        assert!(now_millis() > chain::GENESIS_TIMESTAMP);
    }
}
