use crate::block::{Block, BlockTemplate};
use crate::config::MinerConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::mine::search_parallel;
use crate::pow::{search, CancellationToken};
use std::sync::Arc;
use tracing::debug;

/// Turns the mempool into blocks on top of whatever the ledger's head is.
#[derive(Clone, Debug)]
pub struct Miner {
    ledger: Arc<Ledger>,
    reward_address: String,
    config: MinerConfig,
}

impl Miner {
    pub fn new(ledger: Arc<Ledger>, reward_address: impl Into<String>, config: MinerConfig) -> Self {
        Self {
            ledger,
            reward_address: reward_address.into(),
            config,
        }
    }

    pub fn reward_address(&self) -> &str {
        &self.reward_address
    }

    /// Mines and appends one block. Blocks the calling thread for the whole
    /// search. If the head moves while searching, or the found block loses
    /// the race to append, the search starts over against the new head.
    pub fn mine_block(&self) -> Result<Block> {
        loop {
            if let Some(block) = self.attempt(None)? {
                return Ok(block);
            }
        }
    }

    /// Like [`Miner::mine_block`], but returns `Ok(None)` once `stop` has
    /// fired. A search already running only ends early if its token is
    /// cancelled too, so callers fire `stop` first and then
    /// [`Ledger::cancel_searches`].
    pub fn mine_block_until(&self, stop: &CancellationToken) -> Result<Option<Block>> {
        while !stop.is_cancelled() {
            if let Some(block) = self.attempt(Some(stop))? {
                return Ok(Some(block));
            }
        }
        debug!("mining stopped");
        Ok(None)
    }

    /// One template and one search. `None` when the search was cancelled or
    /// its block went stale.
    fn attempt(&self, stop: Option<&CancellationToken>) -> Result<Option<Block>> {
        let (template, token) = self.ledger.block_template(&self.reward_address);
        // Checked after the token is registered, so a stop followed by
        // cancel_searches can never miss this search.
        if stop.is_some_and(CancellationToken::is_cancelled) {
            return Ok(None);
        }
        let index = template.index;
        let difficulty = template.difficulty;
        debug!(index, difficulty, txs = template.data.len(), "searching for block");

        let Some(block) = self.search(template, &token) else {
            debug!(index, "search cancelled, restarting");
            return Ok(None);
        };
        match self.ledger.add_block(block.clone()) {
            Ok(()) => Ok(Some(block)),
            Err(err) if err.is_stale_head() => {
                debug!(index, %err, "mined block went stale, restarting");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn search(&self, template: BlockTemplate, token: &CancellationToken) -> Option<Block> {
        if self.config.parallel {
            search_parallel(template, token)
        } else {
            search(template, token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainParams;
    use crate::wallet::Wallet;

    #[test]
    fn mines_successive_blocks() {
        let ledger = Arc::new(Ledger::new(ChainParams::default()));
        let wallet = Wallet::generate();
        let miner = Miner::new(ledger.clone(), wallet.address(), MinerConfig::default());
        let first = miner.mine_block().unwrap();
        let second = miner.mine_block().unwrap();
        assert_eq!(first.index, 1);
        assert_eq!(second.previous_hash.as_deref(), Some(first.hash.as_str()));
        assert_eq!(ledger.balance_of(wallet.address()), 100);
    }

    #[test]
    fn parallel_config_mines_too() {
        let ledger = Arc::new(Ledger::new(ChainParams::default()));
        let wallet = Wallet::generate();
        let miner = Miner::new(ledger.clone(), wallet.address(), MinerConfig { parallel: true });
        let block = miner.mine_block().unwrap();
        assert_eq!(ledger.newest_block(), block);
    }

    #[test]
    fn includes_pooled_transactions() {
        let ledger = Arc::new(Ledger::new(ChainParams::default()));
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let miner = Miner::new(ledger.clone(), alice.address(), MinerConfig::default());
        miner.mine_block().unwrap();
        let tx = ledger
            .admit_with(|utxos, pool| alice.create_transaction(bob.address(), 30, utxos, pool))
            .unwrap();

        let block = miner.mine_block().unwrap();
        assert_eq!(block.data.len(), 2);
        assert_eq!(block.data[1], tx);
        assert!(ledger.mempool().is_empty());
        assert_eq!(ledger.balance_of(bob.address()), 30);
        assert_eq!(ledger.balance_of(alice.address()), 70);
    }

    #[test]
    fn stopped_miner_mines_nothing() {
        let ledger = Arc::new(Ledger::new(ChainParams::default()));
        let miner = Miner::new(ledger.clone(), Wallet::generate().address(), MinerConfig::default());
        let stop = CancellationToken::new();
        assert!(miner.mine_block_until(&stop).unwrap().is_some());
        stop.cancel();
        ledger.cancel_searches();
        assert_eq!(miner.mine_block_until(&stop).unwrap(), None);
        assert_eq!(ledger.height(), 1);
    }

    #[test]
    fn stop_interrupts_a_running_search() {
        let ledger = Arc::new(Ledger::new(ChainParams::default()));
        let miner = Miner::new(ledger.clone(), Wallet::generate().address(), MinerConfig::default());
        let stop = CancellationToken::new();
        let worker = {
            let stop = stop.clone();
            std::thread::spawn(move || loop {
                match miner.mine_block_until(&stop) {
                    Ok(Some(_)) => continue,
                    other => return other,
                }
            })
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        stop.cancel();
        ledger.cancel_searches();
        assert_eq!(worker.join().unwrap(), Ok(None));
    }
}
