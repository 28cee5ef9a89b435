use crate::crypto::{sign_transaction, KeyPair};
use crate::error::Result;
use crate::ledger::Ledger;
use crate::store::LedgerStore;
use crate::Transaction;
use tracing::info;

/// A key holder on a ledger: signs and submits transfers, reads its balance.
pub struct Account<S: LedgerStore> {
    keys: KeyPair,
    address: String,
    ledger: Ledger<S>,
}

impl<S: LedgerStore> Account<S> {
    pub fn generate(ledger: Ledger<S>) -> Self {
        Self::from_keys(KeyPair::generate(), ledger)
    }

    pub fn from_keys(keys: KeyPair, ledger: Ledger<S>) -> Self {
        let address = keys.address();
        Self {
            keys,
            address,
            ledger,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn sign(&self, tx: &mut Transaction) -> Result<()> {
        sign_transaction(&self.keys, tx)
    }

    /// Sign a transfer from this account and queue it in the mempool.
    pub fn submit_transaction(&self, to: &str, amount: u64, fee: u64) -> Result<Transaction> {
        let mut tx = Transaction::new(self.address.clone(), to, amount, fee);
        self.sign(&mut tx)?;
        info!(from = %self.address, to, amount, fee, "submitting transaction");
        self.ledger.submit_transaction(tx.clone())?;
        Ok(tx)
    }

    pub fn balance(&self) -> Result<i128> {
        self.ledger.get_balance(&self.address, None)
    }
}
