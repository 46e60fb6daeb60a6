//! Transaction validation and atomic application of a block's transactions
//! to a UTXO set.

use crate::config::ChainParams;
use crate::error::{LedgerError, Result, StructuralError};
use crate::transaction::Transaction;
use crate::utxo::{OutPoint, UtxoSet};
use crate::wallet::verify_signature;
use std::collections::HashSet;

/// Checks a regular (non-coinbase) transaction against `utxos`: shape, id,
/// every input unspent and signed by its owner, and inputs == outputs.
pub fn validate_transaction(tx: &Transaction, utxos: &UtxoSet) -> Result<()> {
    tx.check_structure(false)?;
    if !tx.has_valid_id() {
        return Err(LedgerError::IdMismatch {
            declared: tx.id.clone(),
        }
        .into());
    }

    let mut seen = HashSet::with_capacity(tx.tx_ins.len());
    let mut input_total = 0u64;
    for (position, txin) in tx.tx_ins.iter().enumerate() {
        let outpoint = txin.outpoint();
        if !seen.insert(outpoint.clone()) {
            return Err(double_spend(&outpoint).into());
        }
        let utxo = utxos.get(&outpoint).ok_or_else(|| LedgerError::MissingOutput {
            tx_out_id: outpoint.tx_out_id.clone(),
            tx_out_index: outpoint.tx_out_index,
        })?;
        if !verify_signature(&utxo.address, &tx.id, &txin.signature) {
            return Err(LedgerError::BadSignature { input: position }.into());
        }
        input_total = input_total
            .checked_add(utxo.amount)
            .ok_or(StructuralError::AmountOverflow)?;
    }

    let output_total = tx.output_total()?;
    if input_total != output_total {
        return Err(LedgerError::AmountMismatch {
            inputs: input_total,
            outputs: output_total,
        }
        .into());
    }
    Ok(())
}

/// The reward transaction: one input bound to `block_index`, one output of
/// exactly the configured reward.
pub fn validate_coinbase(tx: &Transaction, block_index: u64, params: &ChainParams) -> Result<()> {
    tx.check_structure(true)?;
    if !tx.has_valid_id() {
        return Err(LedgerError::IdMismatch {
            declared: tx.id.clone(),
        }
        .into());
    }
    let [txin] = tx.tx_ins.as_slice() else {
        return Err(LedgerError::BadCoinbase("must have exactly one input").into());
    };
    if !txin.tx_out_id.is_empty() {
        return Err(LedgerError::BadCoinbase("input must not reference an output").into());
    }
    if txin.tx_out_index != block_index {
        return Err(LedgerError::BadCoinbase("input index must equal the block index").into());
    }
    let [txout] = tx.tx_outs.as_slice() else {
        return Err(LedgerError::BadCoinbase("must have exactly one output").into());
    };
    if txout.amount != params.coinbase_amount {
        return Err(LedgerError::BadCoinbase("output must equal the block reward").into());
    }
    Ok(())
}

/// Validates `txs` as the contents of block `block_index` and returns the
/// UTXO set after applying them. Any rejection aborts the whole batch and
/// `utxos` is never modified.
///
/// The first transaction, if any, is the coinbase. The rest may only spend
/// outputs present in `utxos`, and no output may be spent twice in a block.
pub fn apply_transactions(
    txs: &[Transaction],
    utxos: &UtxoSet,
    block_index: u64,
    params: &ChainParams,
) -> Result<UtxoSet> {
    let Some((coinbase, rest)) = txs.split_first() else {
        return Ok(utxos.clone());
    };
    validate_coinbase(coinbase, block_index, params)?;

    let mut spent: HashSet<OutPoint> = HashSet::new();
    for tx in rest {
        validate_transaction(tx, utxos)?;
        for outpoint in tx.spends() {
            if !spent.insert(outpoint.clone()) {
                return Err(double_spend(&outpoint).into());
            }
        }
    }

    let mut created = HashSet::new();
    for tx in txs {
        let fresh = !utxos.contains(&OutPoint::new(tx.id.clone(), 0));
        if !fresh || !created.insert(tx.id.as_str()) {
            return Err(LedgerError::DuplicateOutputs { tx_id: tx.id.clone() }.into());
        }
    }

    Ok(utxos.spend_and_create(&spent, txs))
}

fn double_spend(outpoint: &OutPoint) -> LedgerError {
    LedgerError::DoubleSpend {
        tx_out_id: outpoint.tx_out_id.clone(),
        tx_out_index: outpoint.tx_out_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transaction::{TxIn, TxOut};
    use crate::utxo::UnspentTxOut;
    use crate::wallet::Wallet;

    fn params() -> ChainParams {
        ChainParams::default()
    }

    /// A set holding one 50-unit output owned by `wallet`.
    fn funded(wallet: &Wallet) -> (UtxoSet, OutPoint) {
        let coinbase = Transaction::coinbase(wallet.address(), 1, 50);
        let set = apply_transactions(&[coinbase.clone()], &UtxoSet::new(), 1, &params()).unwrap();
        (set, OutPoint::new(coinbase.id, 0))
    }

    fn spend(wallet: &Wallet, from: &OutPoint, outs: Vec<TxOut>) -> Transaction {
        let mut tx = Transaction::new(vec![TxIn::new(from.tx_out_id.clone(), from.tx_out_index)], outs);
        let sig = wallet.sign(&tx.id).unwrap();
        tx.tx_ins[0].signature = sig;
        tx
    }

    #[test]
    fn valid_spend_passes() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (set, op) = funded(&alice);
        let tx = spend(
            &alice,
            &op,
            vec![TxOut::new(bob.address(), 30), TxOut::new(alice.address(), 20)],
        );
        assert!(validate_transaction(&tx, &set).is_ok());
    }

    #[test]
    fn amount_mismatch() {
        let alice = Wallet::generate();
        let (set, op) = funded(&alice);
        let tx = spend(&alice, &op, vec![TxOut::new(alice.address(), 60)]);
        assert_eq!(
            validate_transaction(&tx, &set),
            Err(LedgerError::AmountMismatch {
                inputs: 50,
                outputs: 60
            }
            .into())
        );
    }

    #[test]
    fn foreign_signature_rejected() {
        let alice = Wallet::generate();
        let mallory = Wallet::generate();
        let (set, op) = funded(&alice);
        let tx = spend(&mallory, &op, vec![TxOut::new(mallory.address(), 50)]);
        assert_eq!(
            validate_transaction(&tx, &set),
            Err(LedgerError::BadSignature { input: 0 }.into())
        );
    }

    #[test]
    fn missing_output_rejected() {
        let alice = Wallet::generate();
        let op = OutPoint::new(crate::sha256_hex(b"nowhere"), 0);
        let tx = spend(&alice, &op, vec![TxOut::new(alice.address(), 50)]);
        assert!(matches!(
            validate_transaction(&tx, &UtxoSet::new()),
            Err(Error::Ledger(LedgerError::MissingOutput { .. }))
        ));
    }

    #[test]
    fn tampered_output_breaks_id() {
        let alice = Wallet::generate();
        let (set, op) = funded(&alice);
        let mut tx = spend(&alice, &op, vec![TxOut::new(alice.address(), 50)]);
        tx.tx_outs[0].address = Wallet::generate().address().to_string();
        assert!(matches!(
            validate_transaction(&tx, &set),
            Err(Error::Ledger(LedgerError::IdMismatch { .. }))
        ));
    }

    #[test]
    fn coinbase_rules() {
        let miner = Wallet::generate();
        let p = params();
        assert!(validate_coinbase(&Transaction::coinbase(miner.address(), 7, 50), 7, &p).is_ok());
        assert_eq!(
            validate_coinbase(&Transaction::coinbase(miner.address(), 6, 50), 7, &p),
            Err(LedgerError::BadCoinbase("input index must equal the block index").into())
        );
        assert_eq!(
            validate_coinbase(&Transaction::coinbase(miner.address(), 7, 51), 7, &p),
            Err(LedgerError::BadCoinbase("output must equal the block reward").into())
        );
        let two_outs = Transaction::new(
            vec![TxIn::new("", 7)],
            vec![TxOut::new(miner.address(), 25), TxOut::new(miner.address(), 25)],
        );
        assert_eq!(
            validate_coinbase(&two_outs, 7, &p),
            Err(LedgerError::BadCoinbase("must have exactly one output").into())
        );
    }

    #[test]
    fn empty_block_leaves_set_unchanged() {
        let alice = Wallet::generate();
        let (set, _) = funded(&alice);
        assert_eq!(apply_transactions(&[], &set, 2, &params()).unwrap(), set);
    }

    #[test]
    fn double_spend_inside_block_rejected() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (set, op) = funded(&alice);
        let first = spend(&alice, &op, vec![TxOut::new(bob.address(), 50)]);
        let second = spend(
            &alice,
            &op,
            vec![TxOut::new(bob.address(), 10), TxOut::new(alice.address(), 40)],
        );
        let coinbase = Transaction::coinbase(alice.address(), 2, 50);
        let result = apply_transactions(&[coinbase, first, second], &set, 2, &params());
        assert!(matches!(
            result,
            Err(Error::Ledger(LedgerError::DoubleSpend { .. }))
        ));
    }

    #[test]
    fn conservation_after_apply() {
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let (set, op) = funded(&alice);
        let tx = spend(
            &alice,
            &op,
            vec![TxOut::new(bob.address(), 30), TxOut::new(alice.address(), 20)],
        );
        let coinbase = Transaction::coinbase(bob.address(), 2, 50);
        let next = apply_transactions(&[coinbase, tx.clone()], &set, 2, &params()).unwrap();

        assert_eq!(next.total() - set.total(), 50);
        assert!(!next.contains(&op));
        assert_eq!(
            next.get(&OutPoint::new(tx.id.clone(), 0)),
            Some(&UnspentTxOut {
                tx_out_id: tx.id.clone(),
                tx_out_index: 0,
                address: bob.address().to_string(),
                amount: 30,
            })
        );
    }

    #[test]
    fn replayed_coinbase_is_duplicate() {
        let miner = Wallet::generate();
        let coinbase = Transaction::coinbase(miner.address(), 3, 50);
        let set = apply_transactions(&[coinbase.clone()], &UtxoSet::new(), 3, &params()).unwrap();
        assert!(matches!(
            apply_transactions(&[coinbase], &set, 3, &params()),
            Err(Error::Ledger(LedgerError::DuplicateOutputs { .. }))
        ));
    }
}
