use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod account;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod mine;
pub mod store;

pub use account::Account;
pub use config::{ConsensusParams, MinerConfig};
pub use error::{ChainInvalid, Invalidity, LedgerError};
pub use ledger::{AcceptAll, BlockVerifier, ConsensusVerifier, Ledger, Snapshot};
pub use mine::{Miner, MiningOutcome};
pub use store::{Collection, LedgerStore, MemoryStore};

pub type Hash = [u8; 32];

/// Milliseconds since the Unix epoch; a clock set before 1970 reads as 0.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..]);
    out
}

fn push_str(bytes: &mut Vec<u8>, s: &str) {
    bytes.extend_from_slice(&(s.len() as u64).to_le_bytes());
    bytes.extend_from_slice(s.as_bytes());
}

/// A transfer of `amount` units paying `fee` to whoever mines it.
///
/// A transaction without a sender is a coinbase (mining reward). The `hash`
/// covers sender, recipient and amount only and is fixed at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    from_address: Option<String>,
    to_address: String,
    amount: u64,
    fee: u64,
    hash: String,
    signature: Option<Vec<u8>>,
}

impl Transaction {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: u64, fee: u64) -> Self {
        Self::build(Some(from.into()), to.into(), amount, fee)
    }

    pub fn coinbase(to: impl Into<String>, amount: u64) -> Self {
        Self::build(None, to.into(), amount, 0)
    }

    fn build(from_address: Option<String>, to_address: String, amount: u64, fee: u64) -> Self {
        let hash = transaction_hash(from_address.as_deref(), &to_address, amount);
        Self {
            from_address,
            to_address,
            amount,
            fee,
            hash,
            signature: None,
        }
    }

    pub fn from_address(&self) -> Option<&str> {
        self.from_address.as_deref()
    }

    pub fn to_address(&self) -> &str {
        &self.to_address
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.signature.as_deref()
    }

    pub fn set_signature(&mut self, signature: Vec<u8>) {
        self.signature = Some(signature);
    }

    pub fn is_coinbase(&self) -> bool {
        self.from_address.is_none()
    }

    /// What the sender's balance is charged: amount plus fee, exact over the
    /// whole `u64` range of both.
    pub fn debit(&self) -> i128 {
        i128::from(self.amount) + i128::from(self.fee)
    }

    /// The transaction hash as raw bytes, or `None` if the stored hex is malformed.
    pub fn hash_digest(&self) -> Option<Hash> {
        let bytes = hex::decode(&self.hash).ok()?;
        bytes.try_into().ok()
    }

    pub fn has_valid_signature(&self) -> bool {
        crypto::verify_transaction(self)
    }

    fn hash_bytes(&self, bytes: &mut Vec<u8>) {
        match &self.from_address {
            Some(from) => {
                bytes.push(1);
                push_str(bytes, from);
            }
            None => bytes.push(0),
        }
        push_str(bytes, &self.to_address);
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.fee.to_le_bytes());
        push_str(bytes, &self.hash);
        match &self.signature {
            Some(sig) => {
                bytes.push(1);
                bytes.extend_from_slice(&(sig.len() as u64).to_le_bytes());
                bytes.extend_from_slice(sig);
            }
            None => bytes.push(0),
        }
    }
}

/// Hex SHA-256 over sender, recipient and amount. A coinbase has an empty sender.
pub fn transaction_hash(from: Option<&str>, to: &str, amount: u64) -> String {
    let data = format!("{}{}{}", from.unwrap_or_default(), to, amount);
    hex::encode(sha256(data.as_bytes()))
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let from = self.from_address.as_deref().unwrap_or("<coinbase>");
        write!(
            f,
            "{} -> {}: {} (fee {}) [{}]",
            short(from),
            short(&self.to_address),
            self.amount,
            self.fee,
            short(&self.hash)
        )
    }
}

fn short(s: &str) -> &str {
    s.get(..8).unwrap_or(s)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: String,
    pub difficulty: u32,
    pub nonce: u64,
    /// Empty until the block is sealed.
    pub hash: String,
}

impl Block {
    pub fn new(
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: impl Into<String>,
        difficulty: u32,
    ) -> Self {
        Self {
            timestamp,
            transactions,
            previous_hash: previous_hash.into(),
            difficulty,
            nonce: 0,
            hash: String::new(),
        }
    }

    /// Everything the block hash covers except the nonce, which `pow::digest` appends.
    pub fn hash_prefix(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.transactions.len() * 256 + 72);
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());
        bytes.extend_from_slice(&(self.transactions.len() as u64).to_le_bytes());
        for tx in &self.transactions {
            tx.hash_bytes(&mut bytes);
        }
        push_str(&mut bytes, &self.previous_hash);
        bytes
    }

    pub fn compute_hash(&self) -> String {
        hex::encode(pow::digest(&self.hash_prefix(), self.nonce))
    }

    pub fn seal(&mut self) {
        self.hash = self.compute_hash();
    }

    pub fn is_sealed(&self) -> bool {
        !self.hash.is_empty()
    }

    pub fn total_fees(&self) -> u128 {
        self.transactions.iter().map(|tx| u128::from(tx.fee())).sum()
    }

    /// Whether the stored hash has `difficulty` leading zero hex digits.
    pub fn meets_difficulty(&self) -> bool {
        pow::hex_meets_difficulty(&self.hash, self.difficulty)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "----BLOCK----")?;
        writeln!(f, "Difficulty: {}", self.difficulty)?;
        writeln!(f, "Hash: {}", self.hash)?;
        writeln!(f, "Previous Hash: {}", self.previous_hash)?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        writeln!(f, "Timestamp: {}", self.timestamp)?;
        writeln!(f, "Transactions:")?;
        for tx in self.transactions.iter().take(3) {
            writeln!(f, "  {tx}")?;
        }
        if self.transactions.len() > 3 {
            writeln!(f, "  + {} more...", self.transactions.len() - 3)?;
        }
        write!(f, "-------------")
    }
}

pub mod pow {
    use super::Hash;
    use rayon::prelude::*;
    use sha2::{Digest, Sha256};

    pub fn digest(prefix: &[u8], nonce: u64) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(prefix);
        hasher.update(nonce.to_le_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Number of leading zero hex digits (nibbles) in the hash.
    pub fn leading_zero_nibbles(hash: &Hash) -> u32 {
        let mut total = 0u32;
        for b in hash {
            if *b == 0 {
                total += 2;
            } else {
                if *b < 0x10 {
                    total += 1;
                }
                break;
            }
        }
        total
    }

    pub fn meets_difficulty(hash: &Hash, difficulty: u32) -> bool {
        leading_zero_nibbles(hash) >= difficulty
    }

    pub fn hex_meets_difficulty(hex: &str, difficulty: u32) -> bool {
        let difficulty = difficulty as usize;
        hex.len() >= difficulty && hex.bytes().take(difficulty).all(|c| c == b'0')
    }

    /// Search `count` nonces starting at `start` for one whose digest meets
    /// `difficulty`. Returns the lowest such nonce in the range.
    pub fn search_nonces(prefix: &[u8], start: u64, count: u64, difficulty: u32) -> Option<u64> {
        (start..start.saturating_add(count))
            .into_par_iter()
            .find_first(|nonce| meets_difficulty(&digest(prefix, *nonce), difficulty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let txs = vec![
            Transaction::new("alice", "bob", 10, 1),
            Transaction::coinbase("miner", 101),
        ];
        Block::new(1_600_000_000_000, txs, "Genesis", 1)
    }

    #[test]
    fn leading_zero_nibbles_examples() {
        let mut h = [0u8; 32];
        assert_eq!(pow::leading_zero_nibbles(&h), 64);
        h[0] = 0x0F;
        assert_eq!(pow::leading_zero_nibbles(&h), 1);
        h[0] = 0xF0;
        assert_eq!(pow::leading_zero_nibbles(&h), 0);
        h = [0u8; 32];
        h[1] = 0x01;
        assert_eq!(pow::leading_zero_nibbles(&h), 3);
    }

    #[test]
    fn hex_and_byte_difficulty_agree() {
        let block = sample_block();
        let prefix = block.hash_prefix();
        for nonce in 0..200 {
            let raw = pow::digest(&prefix, nonce);
            let hex = hex::encode(raw);
            for d in 0..4 {
                assert_eq!(
                    pow::meets_difficulty(&raw, d),
                    pow::hex_meets_difficulty(&hex, d)
                );
            }
        }
    }

    #[test]
    fn search_finds_lowest_nonce() {
        let block = sample_block();
        let prefix = block.hash_prefix();
        let found = pow::search_nonces(&prefix, 0, 1 << 20, 2).expect("nonce within range");
        let sequential = (0..).find(|n| pow::meets_difficulty(&pow::digest(&prefix, *n), 2));
        assert_eq!(Some(found), sequential);
    }

    #[test]
    fn block_hash_is_deterministic() {
        let block = sample_block();
        assert_eq!(block.compute_hash(), block.compute_hash());
        assert_eq!(block.compute_hash().len(), constants::HASH_HEX_SIZE);
    }

    #[test]
    fn block_hash_changes_with_each_field() {
        let block = sample_block();
        let base = block.compute_hash();

        let mut b = block.clone();
        b.timestamp += 1;
        assert_ne!(b.compute_hash(), base);

        let mut b = block.clone();
        b.nonce += 1;
        assert_ne!(b.compute_hash(), base);

        let mut b = block.clone();
        b.previous_hash = "00ab".into();
        assert_ne!(b.compute_hash(), base);

        let mut b = block.clone();
        b.transactions.pop();
        assert_ne!(b.compute_hash(), base);

        let mut b = block;
        b.transactions[0] = Transaction::new("alice", "bob", 10, 2);
        assert_ne!(b.compute_hash(), base);
    }

    #[test]
    fn new_block_is_unsealed() {
        let mut block = sample_block();
        assert_eq!(block.nonce, 0);
        assert!(!block.is_sealed());
        block.seal();
        assert_eq!(block.hash, block.compute_hash());
    }

    #[test]
    fn transaction_hash_covers_from_to_amount_only() {
        let a = Transaction::new("alice", "bob", 10, 1);
        let b = Transaction::new("alice", "bob", 10, 5);
        let c = Transaction::new("alice", "bob", 11, 1);
        assert_eq!(a.hash(), b.hash());
        assert_ne!(a.hash(), c.hash());
        assert_ne!(a, b, "fee is part of identity even though not of the hash");
        assert_eq!(a.hash(), transaction_hash(Some("alice"), "bob", 10));
    }

    #[test]
    fn transaction_hash_survives_signing() {
        let mut tx = Transaction::new("alice", "bob", 10, 1);
        let before = tx.hash().to_string();
        tx.set_signature(vec![1, 2, 3]);
        assert_eq!(tx.hash(), before);
    }

    #[test]
    fn coinbase_has_no_sender_or_fee() {
        let tx = Transaction::coinbase("miner", 100);
        assert!(tx.is_coinbase());
        assert_eq!(tx.fee(), 0);
        assert!(tx.signature().is_none());
        assert!(tx.hash_digest().is_some());
    }

    #[test]
    fn debit_is_exact_at_the_u64_limit() {
        let tx = Transaction::new("alice", "bob", u64::MAX, u64::MAX);
        assert_eq!(tx.debit(), 2 * i128::from(u64::MAX));
        assert!(tx.debit() > i128::from(i64::MAX));
    }

    #[test]
    fn total_fees_do_not_overflow() {
        let txs = vec![
            Transaction::new("alice", "bob", 0, u64::MAX),
            Transaction::new("carol", "bob", 0, u64::MAX),
        ];
        let block = Block::new(0, txs, "Genesis", 1);
        assert_eq!(block.total_fees(), 2 * u128::from(u64::MAX));
    }

    #[test]
    fn block_display_truncates_transactions() {
        let txs = (0..5)
            .map(|i| Transaction::new("alice", "bob", i, 0))
            .collect();
        let block = Block::new(0, txs, "Genesis", 1);
        let shown = block.to_string();
        assert!(shown.contains("+ 2 more..."));
        assert!(shown.starts_with("----BLOCK----"));
    }

    #[test]
    fn block_serialization_roundtrip() {
        let mut block = sample_block();
        block.seal();
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
        assert_eq!(back.compute_hash(), block.hash);
    }
}
