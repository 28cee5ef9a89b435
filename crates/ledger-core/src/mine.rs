use crate::account::Account;
use crate::config::{ConsensusParams, MinerConfig};
use crate::constants::GENESIS_PREVIOUS_HASH;
use crate::error::Result;
use crate::ledger::{Ledger, Snapshot};
use crate::store::LedgerStore;
use crate::{now_millis, pow, Block, Transaction};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MiningOutcome {
    /// Sealed and appended to the chain.
    Mined(Block),
    /// The tip moved past `height` before the search finished; nothing was submitted.
    Stale { height: usize },
    /// Sealed, but the ledger's verifier refused it.
    Rejected(Block),
}

/// Build the candidate block a miner paid at `miner` would work on next.
///
/// Returns the block and the mempool entries that could not be afforded and
/// should be purged. Transactions beyond the block's capacity are left alone.
pub fn assemble_block(
    chain: &Snapshot,
    params: &ConsensusParams,
    miner: &str,
    timestamp: u64,
) -> (Block, Vec<Transaction>) {
    let Some(tip) = chain.tip() else {
        let reward = Transaction::coinbase(miner, params.mining_reward);
        let genesis = Block::new(
            timestamp,
            vec![reward],
            GENESIS_PREVIOUS_HASH,
            params.genesis_difficulty,
        );
        return (genesis, Vec::new());
    };

    let mut by_fee: Vec<&Transaction> = chain.mempool.iter().collect();
    // stable: equal fees keep mempool order
    by_fee.sort_by(|a, b| b.fee().cmp(&a.fee()));

    let capacity = params.max_tx_per_block.saturating_sub(1);
    let mut committed: HashMap<&str, i128> = HashMap::new();
    let mut balances: HashMap<&str, i128> = HashMap::new();
    let mut admitted: Vec<Transaction> = Vec::new();
    let mut invalid: Vec<Transaction> = Vec::new();
    for tx in by_fee {
        if admitted.len() >= capacity {
            break;
        }
        let Some(from) = tx.from_address() else {
            invalid.push(tx.clone());
            continue;
        };
        if !tx.has_valid_signature() {
            invalid.push(tx.clone());
            continue;
        }
        let balance = *balances
            .entry(from)
            .or_insert_with(|| chain.balance(from, None));
        let spent = committed.entry(from).or_default();
        if tx.debit() <= balance.saturating_sub(*spent) {
            *spent = spent.saturating_add(tx.debit());
            admitted.push(tx.clone());
        } else {
            invalid.push(tx.clone());
        }
    }

    let reward = admitted
        .iter()
        .fold(params.mining_reward, |sum, tx| sum.saturating_add(tx.fee()));
    admitted.push(Transaction::coinbase(miner, reward));

    let difficulty = chain.next_difficulty(params, timestamp);
    if Snapshot::is_retarget_height(params, chain.height() + 1) {
        info!(height = chain.height() + 1, difficulty, "difficulty retarget");
    }
    let block = Block::new(timestamp, admitted, tip.hash.clone(), difficulty);
    (block, invalid)
}

/// An [`Account`] that also mines.
pub struct Miner<S: LedgerStore> {
    account: Account<S>,
    config: MinerConfig,
}

impl<S: LedgerStore> Miner<S> {
    pub fn new(account: Account<S>, config: MinerConfig) -> Self {
        Self { account, config }
    }

    pub fn account(&self) -> &Account<S> {
        &self.account
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    fn ledger(&self) -> &Ledger<S> {
        self.account.ledger()
    }

    pub fn make_next_block(&self) -> Result<Block> {
        let chain = self.ledger().snapshot()?;
        self.candidate_on(&chain)
    }

    fn candidate_on(&self, chain: &Snapshot) -> Result<Block> {
        let (block, invalid) = assemble_block(
            chain,
            self.ledger().params(),
            self.account.address(),
            now_millis(),
        );
        if !invalid.is_empty() {
            let removed = self.ledger().remove_from_mempool(&invalid)?;
            warn!(removed, "purged unaffordable transactions from mempool");
        }
        Ok(block)
    }

    /// Build a candidate on the current tip and search for a nonce, polling
    /// the tip between batches. Gives up as soon as the tip moves.
    pub fn mine_one_block(&self) -> Result<MiningOutcome> {
        let ledger = self.ledger();
        let chain = ledger.snapshot()?;
        let height = chain.height();
        let mut block = self.candidate_on(&chain)?;

        let prefix = block.hash_prefix();
        let batch = self.config.nonces_per_poll.max(1);
        let mut start = 0u64;
        let mut last_poll = Instant::now();
        let nonce = loop {
            if let Some(nonce) = pow::search_nonces(&prefix, start, batch, block.difficulty) {
                break nonce;
            }
            start = start.saturating_add(batch);
            if last_poll.elapsed() >= self.config.poll_interval {
                let current = ledger.height()?;
                debug!(height, current, tried = start, "polled tip");
                if current != height {
                    return Ok(self.lost(height));
                }
                last_poll = Instant::now();
            }
        };

        block.nonce = nonce;
        // the tip may have moved since the last poll
        if ledger.height()? != height {
            return Ok(self.lost(height));
        }
        block.seal();
        info!(
            index = height,
            nonce,
            hash = %block.hash,
            miner = self.account.address(),
            "mined block"
        );
        if ledger.submit_block(block.clone())? {
            Ok(MiningOutcome::Mined(block))
        } else {
            Ok(MiningOutcome::Rejected(block))
        }
    }

    fn lost(&self, height: usize) -> MiningOutcome {
        info!(index = height, "someone already mined this block");
        MiningOutcome::Stale { height }
    }

    /// Mine forever. Only a storage failure ends the loop.
    pub fn mine_continuously(&self) -> Result<()> {
        loop {
            self.mine_one_block()?;
        }
    }
}
