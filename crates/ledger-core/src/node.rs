use crate::block::Block;
use crate::config::{ChainParams, MinerConfig};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::miner::Miner;
use crate::pow::CancellationToken;
use crate::sync::{self, Action, Message};
use crate::transaction::Transaction;
use crate::wallet::Wallet;
use std::sync::Arc;
use tracing::info;

/// One participant: a ledger, the wallet that signs its spends and collects
/// its rewards, and a miner paying into that wallet. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Node {
    ledger: Arc<Ledger>,
    wallet: Wallet,
    miner: Miner,
}

impl Node {
    pub fn new(wallet: Wallet, params: ChainParams, miner_config: MinerConfig) -> Self {
        let ledger = Arc::new(Ledger::new(params));
        let miner = Miner::new(ledger.clone(), wallet.address(), miner_config);
        Self {
            ledger,
            wallet,
            miner,
        }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn address(&self) -> &str {
        self.wallet.address()
    }

    pub fn balance(&self) -> u64 {
        self.ledger.balance_of(self.wallet.address())
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.ledger.balance_of(address)
    }

    pub fn current_chain(&self) -> Vec<Block> {
        self.ledger.chain()
    }

    /// Pays `amount` to `recipient` from this node's wallet and pools the
    /// transaction.
    pub fn submit_transaction(&self, recipient: &str, amount: u64) -> Result<Transaction> {
        let tx = self.ledger.admit_with(|utxos, mempool| {
            self.wallet
                .create_transaction(recipient, amount, utxos, mempool)
        })?;
        info!(id = %tx.id, amount, "submitted transaction");
        Ok(tx)
    }

    /// Blocks until a block is mined and appended.
    pub fn mine_block(&self) -> Result<Block> {
        self.miner.mine_block()
    }

    /// Mines until a block is appended or `stop` fires.
    pub fn mine_block_until(&self, stop: &CancellationToken) -> Result<Option<Block>> {
        self.miner.mine_block_until(stop)
    }

    /// Fires `stop` and interrupts whatever search is running, so callers of
    /// [`Node::mine_block_until`] return promptly.
    pub fn stop_mining(&self, stop: &CancellationToken) {
        stop.cancel();
        self.ledger.cancel_searches();
    }

    pub fn handle_message(&self, message: Message) -> Vec<Action> {
        sync::handle_message(&self.ledger, message)
    }

    pub fn latest_message(&self) -> Message {
        sync::latest_message(&self.ledger)
    }
}
