use anyhow::{Context, Result};
use ledger_core::{Block, Collection, LedgerStore, Transaction};
use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

/// One sled tree per collection; each ledger id is a single key holding the
/// whole bincode-encoded collection.
#[derive(Clone)]
pub struct SledStore {
  db: Db,
  ledger_id: String,
}

impl SledStore {
  pub fn open<P: AsRef<Path>>(path: P, ledger_id: impl Into<String>) -> Result<Self> {
    let path = path.as_ref();
    let db = sled::open(path).with_context(|| format!("opening sled db at {}", path.display()))?;
    let ledger_id = ledger_id.into();
    info!(path = %path.display(), ledger_id = %ledger_id, "sled store opened");
    Ok(Self { db, ledger_id })
  }

  /// Another ledger in the same database. sled holds one open handle per path.
  pub fn with_ledger_id(&self, ledger_id: impl Into<String>) -> Self {
    Self {
      db: self.db.clone(),
      ledger_id: ledger_id.into(),
    }
  }

  pub fn ledger_id(&self) -> &str {
    &self.ledger_id
  }

  fn tree(&self, collection: Collection) -> Result<Tree> {
    Ok(self.db.open_tree(collection.name())?)
  }

  fn load<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
    match self.tree(collection)?.get(self.ledger_id.as_bytes())? {
      Some(bytes) => bincode::deserialize(&bytes)
        .with_context(|| format!("decoding {} of ledger {}", collection.name(), self.ledger_id)),
      None => Ok(Vec::new()),
    }
  }

  fn save<T: Serialize>(&self, collection: Collection, items: &[T]) -> Result<()> {
    let bytes = bincode::serialize(items)?;
    self.tree(collection)?.insert(self.ledger_id.as_bytes(), bytes)?;
    self.db.flush()?;
    debug!(collection = collection.name(), len = items.len(), "collection saved");
    Ok(())
  }

  /// Forget both collections of this ledger.
  pub fn clear(&self) -> Result<()> {
    for collection in [Collection::Chain, Collection::Mempool] {
      self.tree(collection)?.remove(self.ledger_id.as_bytes())?;
    }
    self.db.flush()?;
    Ok(())
  }

  pub fn close(&self) -> Result<()> {
    self.db.flush()?;
    Ok(())
  }
}

impl LedgerStore for SledStore {
  fn load_chain(&self) -> Result<Vec<Block>> {
    self.load(Collection::Chain)
  }

  fn save_chain(&self, blocks: &[Block]) -> Result<()> {
    self.save(Collection::Chain, blocks)
  }

  fn load_mempool(&self) -> Result<Vec<Transaction>> {
    self.load(Collection::Mempool)
  }

  fn save_mempool(&self, txs: &[Transaction]) -> Result<()> {
    self.save(Collection::Mempool, txs)
  }
}
