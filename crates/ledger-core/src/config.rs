use crate::constants::*;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Consensus rule set shared by every participant of a ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Includes the coinbase transaction.
    pub max_tx_per_block: usize,
    pub target_block_time_ms: u64,
    /// Blocks between difficulty recalculations; 0 disables retargeting.
    pub retarget_interval: usize,
    pub max_difficulty: u32,
    pub mining_reward: u64,
    pub genesis_difficulty: u32,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            max_tx_per_block: MAX_TX_PER_BLOCK,
            target_block_time_ms: TARGET_BLOCK_TIME_MS,
            retarget_interval: RETARGET_INTERVAL,
            max_difficulty: MAX_DIFFICULTY,
            mining_reward: MINING_REWARD,
            genesis_difficulty: GENESIS_DIFFICULTY,
        }
    }
}

impl ConsensusParams {
    /// Read params from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading consensus params from {}", path.display()))?;
        let params = serde_json::from_str(&raw)
            .with_context(|| format!("parsing consensus params in {}", path.display()))?;
        Ok(params)
    }
}

/// How the proof-of-work search interleaves hashing with tip checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinerConfig {
    /// Nonces hashed between two opportunities to poll the tip.
    pub nonces_per_poll: u64,
    /// Minimum wall-clock time between tip polls. Zero polls after every batch.
    pub poll_interval: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            nonces_per_poll: NONCES_PER_POLL,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
        }
    }
}
