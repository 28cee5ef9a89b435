//! Key handling, transaction signing, and signature checks by public-key recovery.

use crate::constants::COMPACT_SIGNATURE_SIZE;
use crate::error::{LedgerError, Result};
use crate::{sha256, Hash, Transaction};
use once_cell::sync::Lazy;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use std::fmt;

static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// An address is the hex SHA-256 of the compressed public key.
pub fn address_of(public_key: &PublicKey) -> String {
    hex::encode(sha256(&public_key.serialize()))
}

#[derive(Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self> {
        let bytes = hex::decode(secret_hex.trim())
            .map_err(|e| LedgerError::InvalidKey(format!("secret key is not hex: {e}")))?;
        let secret_key = SecretKey::from_slice(&bytes)?;
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn address(&self) -> String {
        address_of(&self.public_key)
    }

    /// Compact 64-byte signature over a 32-byte digest. The recovery id is
    /// dropped; verification tries all of them.
    pub fn sign_digest(&self, digest: &Hash) -> [u8; COMPACT_SIGNATURE_SIZE] {
        let message = Message::from_digest(*digest);
        let signature = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (_, compact) = signature.serialize_compact();
        compact
    }
}

/// All public keys consistent with `signature` over `digest`.
pub fn recover_public_keys(digest: &Hash, signature: &[u8]) -> Vec<PublicKey> {
    let message = Message::from_digest(*digest);
    (0..4)
        .filter_map(|id| {
            let recovery_id = RecoveryId::from_i32(id).ok()?;
            let sig = RecoverableSignature::from_compact(signature, recovery_id).ok()?;
            SECP256K1_CONTEXT.recover_ecdsa(&message, &sig).ok()
        })
        .collect()
}

pub fn sign_transaction(keys: &KeyPair, tx: &mut Transaction) -> Result<()> {
    let digest = tx
        .hash_digest()
        .ok_or_else(|| LedgerError::MalformedHash(tx.hash().to_string()))?;
    tx.set_signature(keys.sign_digest(&digest).to_vec());
    Ok(())
}

/// A coinbase always verifies. Otherwise some key recovered from the
/// signature must hash to the sender address.
pub fn verify_transaction(tx: &Transaction) -> bool {
    let Some(from) = tx.from_address() else {
        return true;
    };
    let (Some(signature), Some(digest)) = (tx.signature(), tx.hash_digest()) else {
        return false;
    };
    recover_public_keys(&digest, signature)
        .iter()
        .any(|key| address_of(key) == from)
}
