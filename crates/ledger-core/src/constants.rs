pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
pub const COMPACT_SIGNATURE_SIZE: usize = 64;
/// `previous_hash` of the first block in a chain.
pub const GENESIS_PREVIOUS_HASH: &str = "Genesis";
pub const MAX_TX_PER_BLOCK: usize = 5;
pub const TARGET_BLOCK_TIME_MS: u64 = 10_000;
pub const RETARGET_INTERVAL: usize = 5;
pub const MAX_DIFFICULTY: u32 = 4;
pub const MINING_REWARD: u64 = 100;
pub const GENESIS_DIFFICULTY: u32 = 1;
pub const NONCES_PER_POLL: u64 = 50_000;
pub const POLL_INTERVAL_MS: u64 = 1_000;
