use crate::error::{LedgerError, Result};
use crate::transaction::Transaction;
use crate::utxo::{OutPoint, UtxoSet};
use crate::validation::validate_transaction;
use std::collections::HashSet;
use tracing::debug;

/// Validated transactions waiting to be mined, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct Mempool {
    txs: Vec<Transaction>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.txs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.txs.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.txs.iter().any(|tx| tx.id == id)
    }

    /// Every outpoint some pooled transaction already spends.
    pub fn claimed_outpoints(&self) -> HashSet<OutPoint> {
        self.txs.iter().flat_map(Transaction::spends).collect()
    }

    /// Admits `tx` if it is valid against `utxos` and none of its inputs is
    /// claimed by a resident transaction. First seen wins.
    pub fn admit(&mut self, tx: Transaction, utxos: &UtxoSet) -> Result<()> {
        if self.contains(&tx.id) {
            return Err(LedgerError::AlreadyPooled(tx.id).into());
        }
        validate_transaction(&tx, utxos)?;
        let claimed = self.claimed_outpoints();
        if let Some(conflict) = tx.spends().find(|op| claimed.contains(op)) {
            return Err(LedgerError::DoubleSpend {
                tx_out_id: conflict.tx_out_id,
                tx_out_index: conflict.tx_out_index,
            }
            .into());
        }
        debug!(id = %tx.id, pooled = self.txs.len() + 1, "admitted transaction");
        self.txs.push(tx);
        Ok(())
    }

    /// Drops every transaction with an input no longer in `utxos`.
    /// Returns what was dropped.
    pub fn prune(&mut self, utxos: &UtxoSet) -> Vec<Transaction> {
        let (keep, dropped): (Vec<_>, Vec<_>) = std::mem::take(&mut self.txs)
            .into_iter()
            .partition(|tx| tx.spends().all(|op| utxos.contains(&op)));
        self.txs = keep;
        if !dropped.is_empty() {
            debug!(dropped = dropped.len(), remaining = self.txs.len(), "pruned mempool");
        }
        dropped
    }

    /// Independent copy of the pool contents.
    pub fn snapshot(&self) -> Vec<Transaction> {
        self.txs.clone()
    }
}
