//! The shared chain, UTXO set and mempool behind one lock.
//!
//! Every mutation is a single critical section. Searches for the next block
//! run outside the lock; each one registers a [`CancellationToken`] that is
//! fired whenever the head of the chain changes.

use crate::block::{Block, BlockTemplate};
use crate::chain::{cumulative_work, genesis_block, genesis_utxos, replay, validate_block, validate_chain};
use crate::config::ChainParams;
use crate::difficulty::required_difficulty;
use crate::error::{ConsensusError, Result};
use crate::mempool::Mempool;
use crate::now_millis;
use crate::pow::CancellationToken;
use crate::transaction::Transaction;
use crate::utxo::UtxoSet;
use crate::validation::apply_transactions;
use num_bigint::BigUint;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Ledger {
    params: ChainParams,
    state: Mutex<LedgerState>,
}

#[derive(Debug)]
struct LedgerState {
    /// Never empty: position 0 is always the genesis block.
    chain: Vec<Block>,
    utxos: UtxoSet,
    mempool: Mempool,
    watchers: Vec<CancellationToken>,
}

impl LedgerState {
    fn newest(&self) -> &Block {
        self.chain.last().expect("chain always holds genesis")
    }

    fn cancel_watchers(&mut self) {
        let cancelled = self.watchers.len();
        for token in self.watchers.drain(..) {
            token.cancel();
        }
        if cancelled > 0 {
            debug!(cancelled, "cancelled outstanding searches");
        }
    }
}

impl Ledger {
    /// A genesis-only ledger with an empty mempool.
    pub fn new(params: ChainParams) -> Self {
        Self {
            params,
            state: Mutex::new(LedgerState {
                chain: vec![genesis_block()],
                utxos: genesis_utxos(),
                mempool: Mempool::new(),
                watchers: Vec::new(),
            }),
        }
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    // Mutations assign only after every check has passed, so a poisoned
    // state is still consistent.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn chain(&self) -> Vec<Block> {
        self.lock().chain.clone()
    }

    pub fn newest_block(&self) -> Block {
        self.lock().newest().clone()
    }

    pub fn height(&self) -> u64 {
        self.lock().newest().index
    }

    pub fn utxos(&self) -> UtxoSet {
        self.lock().utxos.clone()
    }

    pub fn mempool(&self) -> Vec<Transaction> {
        self.lock().mempool.snapshot()
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.lock().utxos.balance_of(address)
    }

    pub fn cumulative_work(&self) -> BigUint {
        cumulative_work(&self.lock().chain)
    }

    /// Difficulty the next block must be mined at.
    pub fn required_difficulty(&self) -> u32 {
        required_difficulty(&self.lock().chain, &self.params)
    }

    pub fn find_block_by_hash(&self, hash: &str) -> Option<Block> {
        self.lock().chain.iter().find(|b| b.hash == hash).cloned()
    }

    /// Searches the chain first, then the mempool.
    pub fn find_transaction(&self, id: &str) -> Option<Transaction> {
        let state = self.lock();
        state
            .chain
            .iter()
            .flat_map(|b| b.data.iter())
            .find(|tx| tx.id == id)
            .cloned()
            .or_else(|| state.mempool.snapshot().into_iter().find(|tx| tx.id == id))
    }

    /// Appends `block` on top of the newest block if it is a valid successor
    /// and its transactions apply. Prunes the mempool and cancels running
    /// searches on success; leaves everything untouched on failure.
    pub fn add_block(&self, block: Block) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        validate_block(&block, state.newest(), now_millis(), &self.params)?;
        let utxos = apply_transactions(&block.data, &state.utxos, block.index, &self.params)?;

        info!(
            index = block.index,
            hash = %block.hash,
            difficulty = block.difficulty,
            txs = block.data.len(),
            "appended block"
        );
        state.chain.push(block);
        state.utxos = utxos;
        state.mempool.prune(&state.utxos);
        state.cancel_watchers();
        Ok(())
    }

    /// Adopts `candidate` if it is a valid chain carrying strictly more work
    /// than the current one. UTXOs are rebuilt by replaying it from genesis.
    /// Work is compared before the replay and again under the lock that
    /// installs the result.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<()> {
        validate_chain(&candidate, now_millis(), &self.params)?;
        let candidate_work = cumulative_work(&candidate);
        ensure_heavier(&candidate_work, &self.lock().chain)?;
        let utxos = replay(&candidate, &self.params)?;

        let mut guard = self.lock();
        let state = &mut *guard;
        ensure_heavier(&candidate_work, &state.chain)?;

        info!(
            old_height = state.newest().index,
            new_height = candidate.len().saturating_sub(1),
            work = %candidate_work,
            "replacing chain"
        );
        state.chain = candidate;
        state.utxos = utxos;
        state.mempool.prune(&state.utxos);
        state.cancel_watchers();
        Ok(())
    }

    pub fn admit_transaction(&self, tx: Transaction) -> Result<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.mempool.admit(tx, &state.utxos)
    }

    /// Builds a transaction from the current state and admits it, both under
    /// the same lock, so no other admission can claim the same outputs in
    /// between.
    pub fn admit_with<F>(&self, build: F) -> Result<Transaction>
    where
        F: FnOnce(&UtxoSet, &Mempool) -> Result<Transaction>,
    {
        let mut guard = self.lock();
        let state = &mut *guard;
        let tx = build(&state.utxos, &state.mempool)?;
        state.mempool.admit(tx.clone(), &state.utxos)?;
        Ok(tx)
    }

    /// Fires every outstanding search token without touching the chain.
    /// Searches started afterwards get fresh tokens.
    pub fn cancel_searches(&self) {
        self.lock().cancel_watchers();
    }

    /// Template for the block after the current head, paying the reward to
    /// `reward_address` and carrying every pooled transaction, plus a token
    /// that fires as soon as the head moves.
    pub fn block_template(&self, reward_address: &str) -> (BlockTemplate, CancellationToken) {
        let mut state = self.lock();
        let newest = state.newest();
        let index = newest.index + 1;
        let mut data = vec![Transaction::coinbase(
            reward_address,
            index,
            self.params.coinbase_amount,
        )];
        data.extend(state.mempool.snapshot());
        let template = BlockTemplate {
            index,
            previous_hash: Some(newest.hash.clone()),
            timestamp: now_millis(),
            data,
            difficulty: required_difficulty(&state.chain, &self.params),
        };

        let token = CancellationToken::new();
        state.watchers.push(token.clone());
        (template, token)
    }
}

fn ensure_heavier(candidate_work: &BigUint, current: &[Block]) -> Result<()> {
    let current_work = cumulative_work(current);
    if *candidate_work <= current_work {
        return Err(ConsensusError::InsufficientChainWork {
            candidate: candidate_work.clone(),
            current: current_work,
        }
        .into());
    }
    Ok(())
}
