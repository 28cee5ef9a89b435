mod helpers;

use helpers::*;
use ledger_core::{
    Account, Collection, ConsensusVerifier, LedgerError, LedgerStore, Miner, MiningOutcome,
    Transaction,
};
use ledger_storage::SledStore;
use std::sync::Arc;
use tempfile::tempdir;

#[tokio::test]
async fn test_storage_empty_database() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    assert!(store.load_chain()?.is_empty(), "No blocks in an empty database");
    assert!(store.load_mempool()?.is_empty(), "No transactions in an empty database");
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_storage_persistence() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let genesis = sealed_genesis("alice");
    let pending = Transaction::new("alice", "bob", 10, 1);
    {
        let store = SledStore::open(temp_dir.path(), LEDGER_ID)?;
        store.save_chain(&[genesis.clone()])?;
        store.save_mempool(&[pending.clone()])?;
        store.close()?;
    }
    {
        let store = SledStore::open(temp_dir.path(), LEDGER_ID)?;
        assert_eq!(store.load_chain()?, vec![genesis]);
        assert_eq!(store.load_mempool()?, vec![pending]);
    }
    temp_dir.close()?;
    Ok(())
}

#[tokio::test]
async fn test_storage_overwrites_whole_collection() -> anyhow::Result<()> {
    let (temp_dir, store) = create_temp_store();
    let a = Transaction::new("alice", "bob", 1, 0);
    let b = Transaction::new("alice", "carol", 2, 0);
    store.save_mempool(&[a.clone(), b])?;
    store.save_mempool(&[a.clone()])?;
    assert_eq!(store.load_mempool()?, vec![a]);
    store.save_mempool(&[])?;
    assert!(store.load_mempool()?.is_empty());
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_storage_ledgers_are_isolated() -> anyhow::Result<()> {
    let (temp_dir, first) = create_temp_store();
    let second = first.with_ledger_id("other");
    assert_eq!(second.ledger_id(), "other");

    first.save_chain(&[sealed_genesis("alice")])?;
    second.save_mempool(&[Transaction::new("bob", "carol", 3, 0)])?;
    assert!(second.load_chain()?.is_empty());
    assert!(first.load_mempool()?.is_empty());
    assert_eq!(first.load_chain()?.len(), 1);
    assert_eq!(second.load_mempool()?.len(), 1);

    second.clear()?;
    drop(second);
    teardown_store(temp_dir, first);
    Ok(())
}

#[tokio::test]
async fn test_storage_corrupted_collection_is_an_error() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    {
        let store = SledStore::open(temp_dir.path(), LEDGER_ID)?;
        store.save_chain(&[sealed_genesis("alice")])?;
        store.close()?;
    }
    {
        let raw = sled::open(temp_dir.path())?;
        raw
            .open_tree(Collection::Chain.name())?
            .insert(LEDGER_ID.as_bytes(), vec![0xFFu8; 3])?;
        raw.flush()?;
    }
    let store = SledStore::open(temp_dir.path(), LEDGER_ID)?;
    assert!(store.load_chain().is_err());

    let ledger = ledger(store);
    assert!(matches!(ledger.height(), Err(LedgerError::Storage(_))));
    assert!(ledger.is_valid().is_err());
    temp_dir.close()?;
    Ok(())
}

#[tokio::test]
async fn test_storage_repeated_open_close() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    for round in 0..5u64 {
        {
            let store = SledStore::open(temp_dir.path(), LEDGER_ID)?;
            let mut mempool = store.load_mempool()?;
            mempool.push(Transaction::new("alice", "bob", round, 0));
            store.save_mempool(&mempool)?;
        }
        {
            let store = SledStore::open(temp_dir.path(), LEDGER_ID)?;
            assert_eq!(store.load_mempool()?.len() as u64, round + 1);
        }
    }
    temp_dir.close()?;
    Ok(())
}

#[tokio::test]
async fn test_mined_chain_survives_reopen() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let address;
    {
        let ledger =
            ledger(SledStore::open(temp_dir.path(), LEDGER_ID)?).with_verifier(ConsensusVerifier);
        let miner = Miner::new(Account::generate(ledger.clone()), quick_config());
        address = miner.account().address().to_string();
        for _ in 0..3 {
            assert!(matches!(miner.mine_one_block()?, MiningOutcome::Mined(_)));
        }
        miner.account().submit_transaction("bob", 25, 2)?;
        assert!(matches!(miner.mine_one_block()?, MiningOutcome::Mined(_)));
    }
    let ledger = ledger(SledStore::open(temp_dir.path(), LEDGER_ID)?);
    assert_eq!(ledger.height()?, 4);
    assert!(ledger.is_valid()?);
    assert_eq!(ledger.get_balance("bob", None)?, 25);
    assert_eq!(ledger.get_balance(&address, None)?, 400 - 25);
    assert!(ledger.snapshot()?.mempool.is_empty());
    temp_dir.close()?;
    Ok(())
}

#[tokio::test]
async fn test_storage_concurrent_miners() -> anyhow::Result<()> {
    use tokio::task;

    let (temp_dir, store) = create_temp_store();
    let shared = ledger(store.clone()).with_verifier(ConsensusVerifier);
    let target = 6;
    let mut handles = Vec::new();
    for _ in 0..2 {
        let miner = Miner::new(Account::generate(shared.clone()), quick_config());
        handles.push(task::spawn_blocking(move || -> Result<usize, LedgerError> {
            let mut stale = 0;
            while miner.account().ledger().height()? < target {
                if let MiningOutcome::Stale { .. } = miner.mine_one_block()? {
                    stale += 1;
                }
            }
            Ok(stale)
        }));
    }
    for handle in handles {
        handle.await??;
    }
    assert!(shared.height()? >= target);
    assert!(shared.is_valid()?, "racing miners must never break the chain");
    drop(shared);
    teardown_store(temp_dir, store);
    Ok(())
}

#[tokio::test]
async fn test_storage_trait_compliance() -> anyhow::Result<()> {
    fn assert_store<T: LedgerStore + Clone + 'static>() {}
    assert_store::<SledStore>();
    let (temp_dir, store) = create_temp_store();
    let as_dyn: Arc<dyn LedgerStore> = Arc::new(store.clone());
    assert!(as_dyn.load_chain()?.is_empty());
    drop(as_dyn);
    teardown_store(temp_dir, store);
    Ok(())
}
