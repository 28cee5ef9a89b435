#![allow(dead_code)]

use std::fs;

use ledger_core::{
    constants::GENESIS_PREVIOUS_HASH, pow::search_nonces, Block, ConsensusParams, Ledger,
    MinerConfig, Transaction,
};
use ledger_storage::SledStore;
use tempfile::{tempdir, TempDir};

pub const LEDGER_ID: &str = "test";

pub fn create_temp_store() -> (TempDir, SledStore) {
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let store = SledStore::open(temp_dir.path(), LEDGER_ID).expect("Failed to open SledStore");
    (temp_dir, store)
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    store.clear().expect("Failed to clear the store");
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    assert!(!db_path.exists(), "Database directory should be removed");
}

pub fn quick_params() -> ConsensusParams {
    ConsensusParams {
        max_difficulty: 2,
        ..ConsensusParams::default()
    }
}

pub fn quick_config() -> MinerConfig {
    MinerConfig {
        nonces_per_poll: 2_000,
        poll_interval: std::time::Duration::ZERO,
    }
}

pub fn sealed_genesis(to: &str) -> Block {
    let mut block = Block::new(
        ledger_core::now_millis(),
        vec![Transaction::coinbase(to, 100)],
        GENESIS_PREVIOUS_HASH,
        1,
    );
    block.nonce = search_nonces(&block.hash_prefix(), 0, u64::MAX, 1).expect("nonce");
    block.seal();
    block
}

pub fn ledger(store: SledStore) -> Ledger<SledStore> {
    Ledger::new(std::sync::Arc::new(store)).with_params(quick_params())
}
