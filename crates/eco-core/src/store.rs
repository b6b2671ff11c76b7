//! Durable key/value store
//!
//! Each key maps to one file in the store directory, named by the hex
//! SHA-256 of the key. Values are JSON. Writes go to a temp file in the
//! same directory and are renamed into place, so a reader sees either the
//! old value or the new one.
//!
//! Clearing a key overwrites it with an empty file rather than removing
//! it; an empty file reads back as absent.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::StoreError;

/// Well-known store keys
pub mod keys {
    use eco_protocol::ServiceId;

    /// Persisted [`EcoState`](eco_protocol::EcoState)
    pub const ECO_STATE: &str = "ecoState";
    /// Passphrase crypter parameters
    pub const CRYPTER: &str = "crypter";
    /// Wallet seed, encrypted with the crypter
    pub const WALLET_SEED: &str = "walletSeed";

    /// Durable per-service state
    pub fn service(svc: ServiceId) -> String {
        format!("service#{}", svc)
    }
}

/// File-backed key/value store
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
}

impl Store {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Store directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.dir.join(hex::encode(digest))
    }

    /// Encode and store a value, replacing any previous one
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encoding {
            key: key.to_string(),
            source,
        })?;
        self.write_raw(key, &bytes)
    }

    /// Fetch and decode a value
    ///
    /// Returns `Ok(None)` if the key was never written or has been cleared.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let bytes = match fs::read(self.path_for(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if bytes.is_empty() {
            return Ok(None);
        }

        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| StoreError::Encoding {
                key: key.to_string(),
                source,
            })
    }

    /// Whether a live value exists for the key
    pub fn contains(&self, key: &str) -> bool {
        fs::metadata(self.path_for(key))
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    /// Destroy the value by overwriting it with nothing
    pub fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.write_raw(key, &[])
    }

    fn write_raw(&self, key: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(self.path_for(key)).map_err(|e| e.error)?;
        tracing::trace!("Stored {} bytes for {}", bytes.len(), key);
        Ok(())
    }
}
