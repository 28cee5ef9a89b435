use crate::config::ConsensusParams;
use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::error::{ChainInvalid, Invalidity, Result};
use crate::store::LedgerStore;
use crate::{Block, Transaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Chain and mempool as loaded from the store at one instant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub blocks: Vec<Block>,
    pub mempool: Vec<Transaction>,
}

impl Snapshot {
    pub fn new(blocks: Vec<Block>, mempool: Vec<Transaction>) -> Self {
        Self { blocks, mempool }
    }

    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    pub fn tip(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Replays `blocks[..height]` (the whole chain when `height` is `None`).
    /// Senders are charged amount plus fee, receivers credited the amount.
    pub fn balance(&self, address: &str, height: Option<usize>) -> i128 {
        let end = height.unwrap_or(self.blocks.len()).min(self.blocks.len());
        let mut balance = 0i128;
        for tx in self.blocks[..end].iter().flat_map(|b| &b.transactions) {
            if tx.from_address() == Some(address) {
                balance = balance.saturating_sub(tx.debit());
            }
            if tx.to_address() == address {
                balance = balance.saturating_add(i128::from(tx.amount()));
            }
        }
        balance
    }

    /// Difficulty the rules prescribe for the block at `height` (1-based),
    /// which must already be in the chain.
    pub fn calculate_difficulty(&self, params: &ConsensusParams, height: usize) -> Option<u32> {
        let index = height.checked_sub(1)?;
        let block = self.blocks.get(index)?;
        Some(self.difficulty_for(params, index, block.timestamp))
    }

    /// Difficulty for a candidate appended to this chain with `timestamp`.
    pub fn next_difficulty(&self, params: &ConsensusParams, timestamp: u64) -> u32 {
        self.difficulty_for(params, self.blocks.len(), timestamp)
    }

    pub fn is_retarget_height(params: &ConsensusParams, height: usize) -> bool {
        params.retarget_interval > 0 && height % params.retarget_interval == 0
    }

    fn difficulty_for(&self, params: &ConsensusParams, index: usize, timestamp: u64) -> u32 {
        let height = index + 1;
        if Self::is_retarget_height(params, height) {
            let window_start = self
                .blocks
                .get(height - params.retarget_interval)
                .map_or(timestamp, |b| b.timestamp);
            return retarget(params, timestamp.saturating_sub(window_start));
        }
        match index.checked_sub(1).and_then(|i| self.blocks.get(i)) {
            Some(prev) => prev.difficulty,
            None => params.genesis_difficulty,
        }
    }

    /// Check `block` as if it sat at `index`, on top of `blocks[..index]`.
    pub fn check_block(
        &self,
        params: &ConsensusParams,
        index: usize,
        block: &Block,
    ) -> std::result::Result<(), Invalidity> {
        let expected_previous = match index {
            0 => GENESIS_PREVIOUS_HASH,
            i => self.blocks.get(i - 1).map_or("", |b| b.hash.as_str()),
        };
        if block.previous_hash != expected_previous {
            return Err(Invalidity::PreviousHashMismatch {
                expected: expected_previous.to_string(),
                found: block.previous_hash.clone(),
            });
        }
        if block.hash != block.compute_hash() {
            return Err(Invalidity::HashMismatch);
        }
        let expected_difficulty = self.difficulty_for(params, index, block.timestamp);
        if block.difficulty != expected_difficulty {
            return Err(Invalidity::DifficultyMismatch {
                expected: expected_difficulty,
                found: block.difficulty,
            });
        }
        if !block.meets_difficulty() {
            return Err(Invalidity::InsufficientWork {
                difficulty: block.difficulty,
            });
        }
        if block.transactions.len() > params.max_tx_per_block {
            return Err(Invalidity::TooManyTransactions {
                count: block.transactions.len(),
                max: params.max_tx_per_block,
            });
        }

        let max_reward = u128::from(params.mining_reward) + block.total_fees();
        let mut committed: HashMap<&str, i128> = HashMap::new();
        let mut balances: HashMap<&str, i128> = HashMap::new();
        let mut rewards = 0usize;
        for (tx_index, tx) in block.transactions.iter().enumerate() {
            match tx.from_address() {
                Some(from) => {
                    let balance = *balances
                        .entry(from)
                        .or_insert_with(|| self.balance(from, Some(index)));
                    let spent = committed.entry(from).or_default();
                    let available = balance.saturating_sub(*spent);
                    if tx.debit() > available {
                        return Err(Invalidity::Overspend {
                            tx: tx_index,
                            debit: tx.debit(),
                            available,
                        });
                    }
                    *spent = spent.saturating_add(tx.debit());
                }
                None => {
                    if u128::from(tx.amount()) > max_reward {
                        return Err(Invalidity::ExcessiveReward {
                            tx: tx_index,
                            amount: tx.amount(),
                            max: max_reward,
                        });
                    }
                    rewards += 1;
                }
            }
            if !tx.has_valid_signature() {
                return Err(Invalidity::BadSignature { tx: tx_index });
            }
        }
        if rewards > 1 {
            return Err(Invalidity::MultipleRewards);
        }
        Ok(())
    }

    /// Every block after genesis, in order. Stops at the first violation.
    pub fn validate(&self, params: &ConsensusParams) -> std::result::Result<(), ChainInvalid> {
        for (index, block) in self.blocks.iter().enumerate().skip(1) {
            self.check_block(params, index, block)
                .map_err(|reason| ChainInvalid { index, reason })?;
        }
        Ok(())
    }
}

/// Proportional retarget: `ceil(interval * target / span)`, capped at the
/// maximum. A zero span (including clocks running backwards) caps it too.
pub fn retarget(params: &ConsensusParams, span_ms: u64) -> u32 {
    if span_ms == 0 {
        return params.max_difficulty;
    }
    let wanted = (params.retarget_interval as u64).saturating_mul(params.target_block_time_ms);
    wanted
        .div_ceil(span_ms)
        .min(params.max_difficulty as u64)
        .max(1) as u32
}

/// Gate consulted by [`Ledger::submit_block`] before a block is appended.
pub trait BlockVerifier: Send + Sync {
    fn verify(&self, chain: &Snapshot, params: &ConsensusParams, block: &Block) -> bool;
}

/// Accepts every submission; validity is only judged by [`Ledger::is_valid`].
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAll;

impl BlockVerifier for AcceptAll {
    fn verify(&self, _chain: &Snapshot, _params: &ConsensusParams, _block: &Block) -> bool {
        true
    }
}

/// Applies the chain validation rules to the block as the next one.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsensusVerifier;

impl BlockVerifier for ConsensusVerifier {
    fn verify(&self, chain: &Snapshot, params: &ConsensusParams, block: &Block) -> bool {
        match chain.check_block(params, chain.height(), block) {
            Ok(()) => true,
            Err(reason) => {
                warn!(index = chain.height(), %reason, "block rejected");
                false
            }
        }
    }
}

/// Handle on one ledger. Holds no chain state: every call loads what it
/// needs from the store, decides, and persists.
pub struct Ledger<S: LedgerStore> {
    store: Arc<S>,
    params: ConsensusParams,
    verifier: Arc<dyn BlockVerifier>,
}

impl<S: LedgerStore> Clone for Ledger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            params: self.params.clone(),
            verifier: Arc::clone(&self.verifier),
        }
    }
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            params: ConsensusParams::default(),
            verifier: Arc::new(AcceptAll),
        }
    }

    pub fn with_params(mut self, params: ConsensusParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_verifier<V: BlockVerifier + 'static>(mut self, verifier: V) -> Self {
        self.verifier = Arc::new(verifier);
        self
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(
            self.store.load_chain()?,
            self.store.load_mempool()?,
        ))
    }

    /// Append `block` if the verifier accepts it, dropping its transactions
    /// from the mempool. Returns whether it was appended.
    pub fn submit_block(&self, block: Block) -> Result<bool> {
        let snapshot = self.snapshot()?;
        if !self.verifier.verify(&snapshot, &self.params, &block) {
            warn!(hash = %block.hash, "submitted block refused");
            return Ok(false);
        }
        let Snapshot {
            mut blocks,
            mut mempool,
        } = snapshot;
        mempool.retain(|tx| !block.transactions.contains(tx));
        let index = blocks.len();
        let hash = block.hash.clone();
        blocks.push(block);

        self.store.save_mempool(&mempool)?;
        self.store.save_chain(&blocks)?;
        info!(index, %hash, "block appended");
        Ok(true)
    }

    /// Unconditionally queue `tx`; it is judged when a block includes it.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<()> {
        let mut mempool = self.store.load_mempool()?;
        debug!(hash = tx.hash(), "transaction queued");
        mempool.push(tx);
        self.store.save_mempool(&mempool)?;
        Ok(())
    }

    /// Drop `txs` from the stored mempool; returns how many entries went.
    pub fn remove_from_mempool(&self, txs: &[Transaction]) -> Result<usize> {
        let mut mempool = self.store.load_mempool()?;
        let before = mempool.len();
        mempool.retain(|tx| !txs.contains(tx));
        let removed = before - mempool.len();
        if removed > 0 {
            self.store.save_mempool(&mempool)?;
        }
        Ok(removed)
    }

    /// The first invalid block of the stored chain, if any.
    pub fn first_invalid(&self) -> Result<Option<ChainInvalid>> {
        let chain = Snapshot::new(self.store.load_chain()?, Vec::new());
        Ok(chain.validate(&self.params).err())
    }

    pub fn is_valid(&self) -> Result<bool> {
        match self.first_invalid()? {
            None => Ok(true),
            Some(invalid) => {
                warn!(index = invalid.index, reason = %invalid.reason, "chain invalid");
                Ok(false)
            }
        }
    }

    pub fn calculate_difficulty(&self, height: usize) -> Result<Option<u32>> {
        let chain = Snapshot::new(self.store.load_chain()?, Vec::new());
        Ok(chain.calculate_difficulty(&self.params, height))
    }

    pub fn get_balance(&self, address: &str, height: Option<usize>) -> Result<i128> {
        let chain = Snapshot::new(self.store.load_chain()?, Vec::new());
        Ok(chain.balance(address, height))
    }

    pub fn height(&self) -> Result<usize> {
        Ok(self.store.load_chain()?.len())
    }
}
