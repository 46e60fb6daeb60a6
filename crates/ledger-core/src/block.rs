use crate::error::StructuralError;
use crate::transaction::Transaction;
use crate::{digest_to_hash, is_hex_digest, Hash};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub hash: String,
    /// `None` only at index 0.
    pub previous_hash: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
    pub nonce: u64,
}

impl Block {
    /// Assembles a block and derives its hash from the other fields.
    pub fn new(
        index: u64,
        previous_hash: Option<String>,
        timestamp: u64,
        data: Vec<Transaction>,
        difficulty: u32,
        nonce: u64,
    ) -> Self {
        BlockTemplate {
            index,
            previous_hash,
            timestamp,
            data,
            difficulty,
        }
        .seal(nonce)
    }

    /// Hash the block's own fields produce, hex encoded.
    pub fn recompute_hash(&self) -> String {
        let prefix = prefix_hasher(
            self.index,
            self.previous_hash.as_deref(),
            self.timestamp,
            &self.data,
            self.difficulty,
        );
        hex::encode(hash_with_nonce(&prefix, self.nonce))
    }

    /// `2^difficulty`, this block's contribution to chain work.
    pub fn work(&self) -> BigUint {
        BigUint::from(1u8) << self.difficulty as usize
    }

    /// Field formats and every transaction's shape. The first transaction is
    /// checked as a coinbase.
    pub fn check_structure(&self) -> Result<(), StructuralError> {
        if !is_hex_digest(&self.hash) {
            return Err(StructuralError::BadDigest {
                field: "block hash",
                value: self.hash.clone(),
            });
        }
        match (&self.previous_hash, self.index) {
            (None, 0) => {}
            (Some(_), 0) => return Err(StructuralError::UnexpectedPreviousHash),
            (None, index) => return Err(StructuralError::MissingPreviousHash { index }),
            (Some(prev), _) if !is_hex_digest(prev) => {
                return Err(StructuralError::BadDigest {
                    field: "previous hash",
                    value: prev.clone(),
                })
            }
            (Some(_), _) => {}
        }
        for (position, tx) in self.data.iter().enumerate() {
            tx.check_structure(position == 0)?;
        }
        Ok(())
    }
}

/// Everything but the nonce. The proof-of-work search varies only the nonce,
/// so the serialised prefix is absorbed into the hasher once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockTemplate {
    pub index: u64,
    pub previous_hash: Option<String>,
    pub timestamp: u64,
    pub data: Vec<Transaction>,
    pub difficulty: u32,
}

impl BlockTemplate {
    /// A hasher that has already absorbed every field except the nonce.
    pub fn hasher(&self) -> Sha256 {
        prefix_hasher(
            self.index,
            self.previous_hash.as_deref(),
            self.timestamp,
            &self.data,
            self.difficulty,
        )
    }

    pub fn seal(self, nonce: u64) -> Block {
        let hash = hex::encode(hash_with_nonce(&self.hasher(), nonce));
        Block {
            index: self.index,
            hash,
            previous_hash: self.previous_hash,
            timestamp: self.timestamp,
            data: self.data,
            difficulty: self.difficulty,
            nonce,
        }
    }
}

/// Digest(index ‖ previousHash ‖ timestamp ‖ json(data) ‖ difficulty), with
/// the nonce appended by [`hash_with_nonce`]. Numbers are decimal text and a
/// missing previous hash contributes nothing.
fn prefix_hasher(
    index: u64,
    previous_hash: Option<&str>,
    timestamp: u64,
    data: &[Transaction],
    difficulty: u32,
) -> Sha256 {
    let mut hasher = Sha256::new();
    hasher.update(index.to_string());
    hasher.update(previous_hash.unwrap_or_default());
    hasher.update(timestamp.to_string());
    // Transactions hold only strings and integers, which serde_json always
    // encodes; the error arm is unreachable.
    let json = serde_json::to_vec(data).expect("transactions serialize to JSON");
    hasher.update(json);
    hasher.update(difficulty.to_string());
    hasher
}

pub(crate) fn hash_with_nonce(prefix: &Sha256, nonce: u64) -> Hash {
    let mut hasher = prefix.clone();
    hasher.update(nonce.to_string());
    digest_to_hash(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TxIn, TxOut};

    fn address() -> String {
        format!("04{}", "ab".repeat(64))
    }

    fn sample() -> Block {
        Block::new(
            1,
            Some("00".repeat(32)),
            1_600_000_200_000,
            vec![Transaction::coinbase(address(), 1, 50)],
            0,
            0,
        )
    }

    #[test]
    fn hash_is_deterministic() {
        let block = sample();
        assert_eq!(block.hash, block.recompute_hash());
        assert_eq!(block.hash.len(), 64);
        assert_eq!(sample().hash, block.hash);
    }

    #[test]
    fn hash_matches_concatenated_preimage() {
        let block = sample();
        let mut preimage = String::new();
        preimage.push_str("1");
        preimage.push_str(&"00".repeat(32));
        preimage.push_str("1600000200000");
        preimage.push_str(&serde_json::to_string(&block.data).unwrap());
        preimage.push_str("0");
        preimage.push_str("0");
        assert_eq!(block.hash, crate::sha256_hex(preimage.as_bytes()));
    }

    #[test]
    fn arbitrary_text_fields_still_hash() {
        let mut tx = Transaction::coinbase(address(), 1, 50);
        tx.tx_ins[0].signature = "\"quoted\" \u{1F512} \\ \n".to_string();
        let block = Block::new(1, Some("00".repeat(32)), 1_600_000_200_000, vec![tx], 0, 0);
        let mut preimage = String::from("1");
        preimage.push_str(&"00".repeat(32));
        preimage.push_str("1600000200000");
        preimage.push_str(&serde_json::to_string(&block.data).unwrap());
        preimage.push_str("00");
        assert_eq!(block.hash, crate::sha256_hex(preimage.as_bytes()));
    }

    #[test]
    fn every_field_changes_the_hash() {
        let block = sample();
        let mut bumped = block.clone();
        bumped.nonce += 1;
        assert_ne!(bumped.recompute_hash(), block.hash);

        let mut later = block.clone();
        later.timestamp += 1;
        assert_ne!(later.recompute_hash(), block.hash);

        let mut harder = block.clone();
        harder.difficulty += 1;
        assert_ne!(harder.recompute_hash(), block.hash);

        let mut rewired = block.clone();
        rewired.previous_hash = Some("11".repeat(32));
        assert_ne!(rewired.recompute_hash(), block.hash);

        let mut richer = block.clone();
        richer.data[0].tx_outs[0].amount = 51;
        assert_ne!(richer.recompute_hash(), block.hash);
    }

    #[test]
    fn work_is_power_of_two() {
        let mut block = sample();
        assert_eq!(block.work(), BigUint::from(1u8));
        block.difficulty = 10;
        assert_eq!(block.work(), BigUint::from(1024u32));
        block.difficulty = 200;
        assert_eq!(block.work().bits(), 201);
    }

    #[test]
    fn structure_checks() {
        assert!(sample().check_structure().is_ok());

        let mut orphan = sample();
        orphan.previous_hash = None;
        assert_eq!(
            orphan.check_structure(),
            Err(StructuralError::MissingPreviousHash { index: 1 })
        );

        let mut short = sample();
        short.hash = "abc".into();
        assert!(matches!(
            short.check_structure(),
            Err(StructuralError::BadDigest { field: "block hash", .. })
        ));

        let mut bad_tx = sample();
        bad_tx.data.push(Transaction::new(
            vec![TxIn::new("not-hex", 0)],
            vec![TxOut::new(address(), 1)],
        ));
        assert!(bad_tx.check_structure().is_err());
    }

    #[test]
    fn block_serialization_example() {
        let block = sample();
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains(r#""previousHash":"0000"#));
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);

        let genesis_like = Block::new(0, None, 1, vec![], 0, 0);
        let json = serde_json::to_string(&genesis_like).unwrap();
        assert!(json.contains(r#""previousHash":null"#));
    }
}
