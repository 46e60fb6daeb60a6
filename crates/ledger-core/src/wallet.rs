//! Signing side of the ledger: key handling, signatures, and building spends
//! from a UTXO snapshot. Where the key lives on disk is the caller's business.

use crate::error::{KeyError, ResourceError, Result, StructuralError};
use crate::mempool::Mempool;
use crate::transaction::{is_valid_address, Transaction, TxIn, TxOut};
use crate::utxo::UtxoSet;
use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use tracing::debug;

#[derive(Clone)]
pub struct Wallet {
    secret_key: SecretKey,
    address: String,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    pub fn generate() -> Self {
        Self::from_secret_key(SecretKey::new(&mut OsRng))
    }

    pub fn from_secret_hex(secret_hex: &str) -> std::result::Result<Self, KeyError> {
        let bytes = hex::decode(secret_hex.trim()).map_err(|_| KeyError::BadHex)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| KeyError::Invalid(e.to_string()))?;
        Ok(Self::from_secret_key(secret_key))
    }

    fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            address: hex::encode(public_key.serialize_uncompressed()),
        }
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Uncompressed public key, hex encoded. This is the wallet's address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// DER signature, hex encoded, over the 32 bytes the transaction id encodes.
    pub fn sign(&self, transaction_id: &str) -> Result<String> {
        let message = digest_message(transaction_id).ok_or_else(|| StructuralError::BadDigest {
            field: "transaction id",
            value: transaction_id.to_string(),
        })?;
        let secp = Secp256k1::signing_only();
        let signature = secp.sign_ecdsa(&message, &self.secret_key);
        Ok(hex::encode(&*signature.serialize_der()))
    }

    pub fn balance(&self, utxos: &UtxoSet) -> u64 {
        utxos.balance_of(&self.address)
    }

    /// Spends `amount` to `recipient`, returning change to this wallet.
    ///
    /// Outputs already claimed by a pooled transaction are skipped so two
    /// submissions in a row never pick the same coins.
    pub fn create_transaction(
        &self,
        recipient: &str,
        amount: u64,
        utxos: &UtxoSet,
        mempool: &Mempool,
    ) -> Result<Transaction> {
        if !is_valid_address(recipient) {
            return Err(ResourceError::InvalidRecipient(recipient.to_string()).into());
        }
        if amount == 0 {
            return Err(ResourceError::InvalidAmount.into());
        }

        let claimed = mempool.claimed_outpoints();
        let spendable: Vec<_> = utxos
            .owned_by(&self.address)
            .filter(|u| !claimed.contains(&u.outpoint()))
            .collect();

        let mut selected = Vec::new();
        let mut gathered = 0u64;
        for utxo in &spendable {
            if gathered >= amount {
                break;
            }
            gathered = gathered.saturating_add(utxo.amount);
            selected.push(*utxo);
        }
        if gathered < amount {
            let available = spendable
                .iter()
                .fold(0u64, |acc, u| acc.saturating_add(u.amount));
            return Err(ResourceError::InsufficientFunds {
                required: amount,
                available,
            }
            .into());
        }

        let tx_ins = selected
            .iter()
            .map(|u| TxIn::new(u.tx_out_id.clone(), u.tx_out_index))
            .collect();
        let mut tx_outs = vec![TxOut::new(recipient, amount)];
        let change = gathered - amount;
        if change > 0 {
            tx_outs.push(TxOut::new(self.address.clone(), change));
        }

        let mut tx = Transaction::new(tx_ins, tx_outs);
        let signature = self.sign(&tx.id)?;
        for txin in &mut tx.tx_ins {
            txin.signature = signature.clone();
        }
        debug!(id = %tx.id, amount, change, inputs = tx.tx_ins.len(), "built transaction");
        Ok(tx)
    }
}

/// Address for a hex secret key.
pub fn public_key_of(secret_hex: &str) -> std::result::Result<String, KeyError> {
    Wallet::from_secret_hex(secret_hex).map(|w| w.address)
}

/// Checks `signature` against the key encoded in `address` over `transaction_id`.
/// High-S signatures are normalised first, so signers that do not enforce
/// low-S are still accepted.
pub fn verify_signature(address: &str, transaction_id: &str, signature: &str) -> bool {
    let Ok(key_bytes) = hex::decode(address) else {
        return false;
    };
    let Ok(public_key) = PublicKey::from_slice(&key_bytes) else {
        return false;
    };
    let Some(message) = digest_message(transaction_id) else {
        return false;
    };
    let Ok(der) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut sig) = Signature::from_der(&der) else {
        return false;
    };
    sig.normalize_s();
    Secp256k1::verification_only()
        .verify_ecdsa(&message, &sig, &public_key)
        .is_ok()
}

fn digest_message(transaction_id: &str) -> Option<Message> {
    let digest = hex::decode(transaction_id).ok()?;
    Message::from_digest_slice(&digest).ok()
}
