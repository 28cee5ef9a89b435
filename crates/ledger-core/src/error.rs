use thiserror::Error;

/// Failures of a ledger operation. Chain invalidity is not one of these; see
/// [`ChainInvalid`].
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
    #[error("signature error: {0}")]
    Crypto(#[from] secp256k1::Error),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("transaction {0} has a malformed hash")]
    MalformedHash(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Why a single block breaks the consensus rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Invalidity {
    #[error("previous hash {found} does not match predecessor hash {expected}")]
    PreviousHashMismatch { expected: String, found: String },
    #[error("stored hash does not match the block contents")]
    HashMismatch,
    #[error("hash does not have {difficulty} leading zero digits")]
    InsufficientWork { difficulty: u32 },
    #[error("difficulty is {found}, but should be {expected}")]
    DifficultyMismatch { expected: u32, found: u32 },
    #[error("{count} transactions, max allowed is {max}")]
    TooManyTransactions { count: usize, max: usize },
    #[error("transaction #{tx} spends {debit}, max allowed is {available} (total balance)")]
    Overspend {
        tx: usize,
        debit: i128,
        available: i128,
    },
    #[error("transaction #{tx} has a reward of {amount}, max allowed is {max}")]
    ExcessiveReward { tx: usize, amount: u64, max: u128 },
    #[error("transaction #{tx} has an invalid signature")]
    BadSignature { tx: usize },
    #[error("multiple miner reward transactions")]
    MultipleRewards,
}

/// The first block that fails validation, by chain index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("block #{index} is invalid: {reason}")]
pub struct ChainInvalid {
    pub index: usize,
    pub reason: Invalidity,
}
