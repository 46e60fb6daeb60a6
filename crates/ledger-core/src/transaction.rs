use crate::constants::{ADDRESS_HEX_SIZE, ADDRESS_PREFIX};
use crate::error::StructuralError;
use crate::utxo::OutPoint;
use crate::{is_hex_digest, sha256_hex};
use serde::{Deserialize, Serialize};

/// A claim on a prior output, authorised by `signature`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxIn {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    /// Hex DER signature over the owning transaction's id.
    pub signature: String,
}

impl TxIn {
    /// An unsigned claim on `tx_out_id:tx_out_index`.
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
            signature: String::new(),
        }
    }

    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub amount: u64,
}

impl TxOut {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub tx_ins: Vec<TxIn>,
    pub tx_outs: Vec<TxOut>,
}

impl Transaction {
    /// Builds a transaction whose id is derived from its inputs and outputs.
    /// Inputs stay unsigned; signing happens over the returned id.
    pub fn new(tx_ins: Vec<TxIn>, tx_outs: Vec<TxOut>) -> Self {
        let id = Self::compute_id(&tx_ins, &tx_outs);
        Self { id, tx_ins, tx_outs }
    }

    /// The reward transaction for the block at `block_index`. The input's
    /// `tx_out_index` carries the height so equal rewards get distinct ids.
    pub fn coinbase(address: impl Into<String>, block_index: u64, amount: u64) -> Self {
        Self::new(
            vec![TxIn::new("", block_index)],
            vec![TxOut::new(address, amount)],
        )
    }

    /// Digest over every (txOutId, txOutIndex) pair followed by every
    /// (address, amount) pair. Signatures are excluded.
    pub fn compute_id(tx_ins: &[TxIn], tx_outs: &[TxOut]) -> String {
        let mut content = String::new();
        for txin in tx_ins {
            content.push_str(&txin.tx_out_id);
            content.push_str(&txin.tx_out_index.to_string());
        }
        for txout in tx_outs {
            content.push_str(&txout.address);
            content.push_str(&txout.amount.to_string());
        }
        sha256_hex(content.as_bytes())
    }

    pub fn has_valid_id(&self) -> bool {
        self.id == Self::compute_id(&self.tx_ins, &self.tx_outs)
    }

    pub fn output_total(&self) -> Result<u64, StructuralError> {
        self.tx_outs.iter().try_fold(0u64, |acc, out| {
            acc.checked_add(out.amount)
                .ok_or(StructuralError::AmountOverflow)
        })
    }

    /// Outputs this transaction consumes.
    pub fn spends(&self) -> impl Iterator<Item = OutPoint> + '_ {
        self.tx_ins.iter().map(TxIn::outpoint)
    }

    /// Shape checks that need no ledger state.
    ///
    /// Coinbase inputs reference nothing, so their `tx_out_id` is not
    /// required to be a digest.
    pub fn check_structure(&self, coinbase: bool) -> Result<(), StructuralError> {
        if !is_hex_digest(&self.id) {
            return Err(StructuralError::BadDigest {
                field: "transaction id",
                value: self.id.clone(),
            });
        }
        if self.tx_ins.is_empty() {
            return Err(StructuralError::NoInputs);
        }
        if self.tx_outs.is_empty() {
            return Err(StructuralError::NoOutputs);
        }
        for txin in &self.tx_ins {
            if !coinbase && !is_hex_digest(&txin.tx_out_id) {
                return Err(StructuralError::BadDigest {
                    field: "txOutId",
                    value: txin.tx_out_id.clone(),
                });
            }
            if hex::decode(&txin.signature).is_err() {
                return Err(StructuralError::BadSignatureEncoding);
            }
        }
        for txout in &self.tx_outs {
            if !is_valid_address(&txout.address) {
                return Err(StructuralError::BadAddress(txout.address.clone()));
            }
            if txout.amount == 0 {
                return Err(StructuralError::ZeroAmount);
            }
        }
        self.output_total()?;
        Ok(())
    }
}

/// 130 hex chars of an uncompressed secp256k1 point, `04`-prefixed.
pub fn is_valid_address(address: &str) -> bool {
    address.len() == ADDRESS_HEX_SIZE
        && address.starts_with(ADDRESS_PREFIX)
        && address.bytes().all(|b| b.is_ascii_hexdigit())
}
