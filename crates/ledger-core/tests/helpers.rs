#![allow(dead_code)]

use ledger_core::chain::genesis_block;
use ledger_core::pow::{find_block, search};
use ledger_core::{now_millis, Block, ChainParams, Ledger, Transaction, Wallet};
use std::sync::Arc;

pub fn create_ledger() -> Arc<Ledger> {
    Arc::new(Ledger::new(ChainParams::default()))
}

/// Mines one block on the ledger's head and appends it.
pub fn mine_on(ledger: &Ledger, reward_address: &str) -> Block {
    let (template, token) = ledger.block_template(reward_address);
    let block = search(template, &token).expect("search was not cancelled");
    ledger.add_block(block.clone()).expect("freshly mined block appends");
    block
}

/// A chain from genesis with one coinbase-only block per entry of
/// `difficulties`, each mined at that difficulty.
pub fn chain_with_difficulties(difficulties: &[u32], reward_address: &str) -> Vec<Block> {
    let mut chain = vec![genesis_block()];
    let start = now_millis().saturating_sub(difficulties.len() as u64 * 1_000);
    for (offset, difficulty) in difficulties.iter().enumerate() {
        let prev = chain.last().expect("chain starts with genesis");
        let index = prev.index + 1;
        let block = find_block(
            index,
            Some(prev.hash.clone()),
            start + offset as u64 * 1_000,
            vec![Transaction::coinbase(reward_address, index, 50)],
            *difficulty,
        );
        chain.push(block);
    }
    chain
}

pub fn funded_wallet(ledger: &Ledger, blocks: usize) -> Wallet {
    let wallet = Wallet::generate();
    for _ in 0..blocks {
        mine_on(ledger, wallet.address());
    }
    wallet
}
