use crate::{Block, Transaction};
use anyhow::{anyhow, Result};
use std::sync::{Mutex, MutexGuard};

/// The two collections every ledger persists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Collection {
    Chain,
    Mempool,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Chain => "chain",
            Collection::Mempool => "mempool",
        }
    }
}

/// Backing store of a single ledger. Reads and writes always cover a whole
/// collection; a collection that was never written loads as empty.
///
/// Lives in `ledger-core` so the engine does not depend on a storage crate.
pub trait LedgerStore: Send + Sync {
    fn load_chain(&self) -> Result<Vec<Block>>;
    fn save_chain(&self, blocks: &[Block]) -> Result<()>;
    fn load_mempool(&self) -> Result<Vec<Transaction>>;
    fn save_mempool(&self, txs: &[Transaction]) -> Result<()>;
}

/// Process-local store, mostly for tests and simulations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chain: Mutex<Vec<Block>>,
    mempool: Mutex<Vec<Transaction>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|_| anyhow!("memory store lock poisoned"))
}

impl LedgerStore for MemoryStore {
    fn load_chain(&self) -> Result<Vec<Block>> {
        Ok(lock(&self.chain)?.clone())
    }

    fn save_chain(&self, blocks: &[Block]) -> Result<()> {
        *lock(&self.chain)? = blocks.to_vec();
        Ok(())
    }

    fn load_mempool(&self) -> Result<Vec<Transaction>> {
        Ok(lock(&self.mempool)?.clone())
    }

    fn save_mempool(&self, txs: &[Transaction]) -> Result<()> {
        *lock(&self.mempool)? = txs.to_vec();
        Ok(())
    }
}
