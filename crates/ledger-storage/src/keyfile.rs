use anyhow::{Context, Result};
use ledger_core::crypto::KeyPair;
use std::fs;
use std::path::Path;
use tracing::info;

/// Read a hex-encoded secret key.
pub fn load(path: &Path) -> Result<KeyPair> {
  let raw = fs::read_to_string(path).with_context(|| format!("reading key {}", path.display()))?;
  KeyPair::from_secret_hex(&raw).with_context(|| format!("parsing key {}", path.display()))
}

/// Write the secret key as hex, refusing to replace an existing file.
pub fn save(path: &Path, keys: &KeyPair) -> Result<()> {
  if path.exists() {
    anyhow::bail!("refusing to overwrite existing key {}", path.display());
  }
  if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
    fs::create_dir_all(dir)?;
  }
  fs::write(path, keys.secret_hex()).with_context(|| format!("writing key {}", path.display()))?;
  info!(path = %path.display(), address = %keys.address(), "key saved");
  Ok(())
}

pub fn load_or_create(path: &Path) -> Result<KeyPair> {
  if path.exists() {
    return load(path);
  }
  let keys = KeyPair::generate();
  save(path, &keys)?;
  Ok(keys)
}
