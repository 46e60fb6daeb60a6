use crate::transaction::{Transaction, TxOut};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Key of one output: the id of the transaction that produced it and its position.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutPoint {
    pub tx_out_id: String,
    pub tx_out_index: u64,
}

impl OutPoint {
    pub fn new(tx_out_id: impl Into<String>, tx_out_index: u64) -> Self {
        Self {
            tx_out_id: tx_out_id.into(),
            tx_out_index,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnspentTxOut {
    pub tx_out_id: String,
    pub tx_out_index: u64,
    pub address: String,
    pub amount: u64,
}

impl UnspentTxOut {
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.tx_out_id.clone(), self.tx_out_index)
    }
}

/// Every spendable output, keyed by outpoint.
///
/// Ordered so coin selection and snapshots are deterministic across nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UtxoSet {
    entries: BTreeMap<OutPoint, UnspentTxOut>,
}

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, outpoint: &OutPoint) -> Option<&UnspentTxOut> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnspentTxOut> {
        self.entries.values()
    }

    /// Sum of all amounts; u128 so a huge set cannot overflow.
    pub fn total(&self) -> u128 {
        self.entries.values().map(|u| u128::from(u.amount)).sum()
    }

    pub fn owned_by<'a>(&'a self, address: &'a str) -> impl Iterator<Item = &'a UnspentTxOut> + 'a {
        self.entries.values().filter(move |u| u.address == address)
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.owned_by(address)
            .fold(0u64, |acc, u| acc.saturating_add(u.amount))
    }

    pub fn to_vec(&self) -> Vec<UnspentTxOut> {
        self.entries.values().cloned().collect()
    }

    /// Removes `spent` and inserts the outputs of `txs`. Callers validate first;
    /// this only does the bookkeeping.
    pub(crate) fn spend_and_create(&self, spent: &HashSet<OutPoint>, txs: &[Transaction]) -> UtxoSet {
        let mut entries: BTreeMap<OutPoint, UnspentTxOut> = self
            .entries
            .iter()
            .filter(|(key, _)| !spent.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for tx in txs {
            for (index, out) in tx.tx_outs.iter().enumerate() {
                let utxo = unspent_from(&tx.id, index as u64, out);
                entries.insert(utxo.outpoint(), utxo);
            }
        }
        UtxoSet { entries }
    }
}

impl FromIterator<UnspentTxOut> for UtxoSet {
    fn from_iter<I: IntoIterator<Item = UnspentTxOut>>(iter: I) -> Self {
        UtxoSet {
            entries: iter.into_iter().map(|u| (u.outpoint(), u)).collect(),
        }
    }
}

fn unspent_from(tx_id: &str, index: u64, out: &TxOut) -> UnspentTxOut {
    UnspentTxOut {
        tx_out_id: tx_id.to_string(),
        tx_out_index: index,
        address: out.address.clone(),
        amount: out.amount,
    }
}
