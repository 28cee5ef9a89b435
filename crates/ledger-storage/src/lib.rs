//! Persistent backends for `ledger_core::LedgerStore`, plus key files.

pub mod keyfile;
pub mod sled_store;

pub use sled_store::SledStore;
