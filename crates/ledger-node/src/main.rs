mod constants;

use anyhow::Context;
use clap::Parser;
use constants::{DEFAULT_DATA_DIR, DEFAULT_LEDGER_ID};
use ledger_core::{
    constants::{NONCES_PER_POLL, POLL_INTERVAL_MS},
    crypto::KeyPair,
    Account, ConsensusParams, ConsensusVerifier, Ledger, Miner, MinerConfig,
};
use ledger_storage::{keyfile, SledStore};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "ledger-node", about = "Proof-of-work miner for a shared ledger store")]
struct Args {
    /// Data directory for sled
    #[arg(long, default_value = DEFAULT_DATA_DIR)]
    data_dir: PathBuf,

    /// Ledger to mine on
    #[arg(long, default_value = DEFAULT_LEDGER_ID)]
    ledger_id: String,

    /// Hex secret key receiving the rewards; created if missing, ephemeral if omitted
    #[arg(long)]
    key: Option<PathBuf>,

    /// Miner threads sharing the store
    #[arg(long, default_value_t = 1)]
    miners: usize,

    /// JSON file with consensus parameters
    #[arg(long)]
    params: Option<PathBuf>,

    /// Nonces hashed between tip polls
    #[arg(long, default_value_t = NONCES_PER_POLL)]
    nonces_per_poll: u64,

    /// Minimum milliseconds between tip polls
    #[arg(long, default_value_t = POLL_INTERVAL_MS)]
    poll_interval_ms: u64,

    /// Append mined blocks without checking them against the rules
    #[arg(long)]
    accept_all: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let params = match &args.params {
        Some(path) => ConsensusParams::from_json_file(path)?,
        None => ConsensusParams::default(),
    };
    let keys = match &args.key {
        Some(path) => keyfile::load_or_create(path)?,
        None => KeyPair::generate(),
    };
    let config = MinerConfig {
        nonces_per_poll: args.nonces_per_poll,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
    };

    let store = Arc::new(SledStore::open(&args.data_dir, args.ledger_id.clone())?);
    let mut ledger = Ledger::new(store).with_params(params);
    if !args.accept_all {
        ledger = ledger.with_verifier(ConsensusVerifier);
    }

    let height = ledger.height().context("reading chain height")?;
    if let Some(invalid) = ledger.first_invalid()? {
        warn!(%invalid, "stored chain is invalid; mining on top of it anyway");
    }
    info!(
        ledger_id = %args.ledger_id,
        height,
        address = %keys.address(),
        miners = args.miners,
        "ledger-node starting"
    );

    let mut miners = JoinSet::new();
    for _ in 0..args.miners.max(1) {
        let miner = Miner::new(Account::from_keys(keys.clone(), ledger.clone()), config.clone());
        miners.spawn_blocking(move || miner.mine_continuously());
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted; exiting");
            std::process::exit(0);
        }
        Some(joined) = miners.join_next() => {
            joined??;
        }
    }
    Ok(())
}
