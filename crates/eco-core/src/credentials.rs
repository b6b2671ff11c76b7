//! Secrets at rest
//!
//! Two mechanisms live here:
//!
//! - [`CachedSecret`] / [`CredentialCache`]: a secret that has to survive
//!   into a later daemon run (the wallet passphrase is needed again when the
//!   wallet process is first started, which may be after a restart). The
//!   secret is sealed with a random ephemeral key and the key is stored
//!   next to the ciphertext. This keeps the passphrase out of plain text on
//!   disk; it is not confidential against anyone who can read the store.
//!   Callers take the secret once and the record is cleared.
//!
//! - [`PassphraseCrypter`]: an Argon2id-derived key under the user's
//!   passphrase, used for the wallet seed kept for later export.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::Aead;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;
use crate::store::Store;

/// ChaCha20-Poly1305 key length
pub const KEY_LEN: usize = 32;

/// ChaCha20-Poly1305 nonce length
pub const NONCE_LEN: usize = 12;

/// Salt length for passphrase key derivation
pub const SALT_LEN: usize = 16;

/// Length of generated RPC user names and passwords
pub const RPC_TOKEN_LEN: usize = 16;

/// Generate a random base58 token for RPC credentials
pub fn generate_rpc_token() -> String {
    let mut bytes = [0u8; 24];
    OsRng.fill_bytes(&mut bytes);
    let mut token = bs58::encode(bytes).into_string();
    token.truncate(RPC_TOKEN_LEN);
    token
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// A secret sealed under an ephemeral key that travels with it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSecret {
    pub ciphertext: Vec<u8>,
    pub key: Vec<u8>,
    /// Serialized cipher parameters (the nonce)
    pub params: Vec<u8>,
}

impl CachedSecret {
    /// Seal a secret under a fresh random key
    pub fn seal(secret: &[u8]) -> Result<Self, CredentialError> {
        let key = random_bytes::<KEY_LEN>();
        let nonce = random_bytes::<NONCE_LEN>();

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret)
            .map_err(|_| CredentialError::Encrypt)?;

        Ok(Self {
            ciphertext,
            key: key.to_vec(),
            params: nonce.to_vec(),
        })
    }

    /// Recover the secret
    pub fn open(&self) -> Result<Vec<u8>, CredentialError> {
        if self.key.len() != KEY_LEN || self.params.len() != NONCE_LEN {
            return Err(CredentialError::Decode);
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt(Nonce::from_slice(&self.params), self.ciphertext.as_slice())
            .map_err(|_| CredentialError::Decode)
    }
}

/// What a cached secret is for
///
/// Each purpose holds at most one live secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    /// Wallet passphrase, handed to the wallet on its first start
    WalletUnlock,
    /// App passphrase for the exchange client's first initialization
    ExchangeInit,
}

impl Purpose {
    /// Store key for this purpose
    pub fn key(&self) -> &'static str {
        match self {
            Self::WalletUnlock => "extraInput",
            Self::ExchangeInit => "dexInput",
        }
    }
}

/// Purpose-keyed credential cache over the durable store
#[derive(Debug, Clone)]
pub struct CredentialCache {
    store: Store,
}

impl CredentialCache {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Seal and persist a secret, replacing any previous one for the purpose
    pub fn store(&self, purpose: Purpose, secret: &[u8]) -> Result<(), CredentialError> {
        let record = CachedSecret::seal(secret)?;
        self.store.put(purpose.key(), &record)?;
        tracing::debug!("Cached credential for {}", purpose.key());
        Ok(())
    }

    /// Whether a live secret exists for the purpose
    pub fn contains(&self, purpose: Purpose) -> bool {
        self.store.contains(purpose.key())
    }

    /// Decrypt the live secret without consuming it
    pub fn fetch(&self, purpose: Purpose) -> Result<Vec<u8>, CredentialError> {
        let record: CachedSecret = self
            .store
            .get(purpose.key())?
            .ok_or(CredentialError::NotFound(purpose.key()))?;
        record.open()
    }

    /// Destroy the secret for the purpose
    pub fn clear(&self, purpose: Purpose) -> Result<(), CredentialError> {
        self.store.clear(purpose.key())?;
        tracing::debug!("Cleared credential for {}", purpose.key());
        Ok(())
    }

    /// Fetch the secret and destroy the record
    pub fn take(&self, purpose: Purpose) -> Result<Vec<u8>, CredentialError> {
        let secret = self.fetch(purpose)?;
        self.clear(purpose)?;
        Ok(secret)
    }
}

/// Persisted key derivation parameters for a [`PassphraseCrypter`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrypterParams {
    pub salt: Vec<u8>,
    pub m_cost: u32,
    pub t_cost: u32,
    pub p_cost: u32,
}

impl CrypterParams {
    fn generate() -> Self {
        Self {
            salt: random_bytes::<SALT_LEN>().to_vec(),
            m_cost: 19 * 1024,
            t_cost: 2,
            p_cost: 1,
        }
    }
}

/// Symmetric cipher keyed by a user passphrase
pub struct PassphraseCrypter {
    cipher: ChaCha20Poly1305,
    params: CrypterParams,
}

impl PassphraseCrypter {
    /// Derive a crypter with fresh parameters
    pub fn generate(passphrase: &[u8]) -> Result<Self, CredentialError> {
        Self::derive(passphrase, CrypterParams::generate())
    }

    /// Re-derive a crypter from stored parameters
    pub fn derive(passphrase: &[u8], params: CrypterParams) -> Result<Self, CredentialError> {
        let argon_params = Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
            .map_err(|e| CredentialError::KeyDerivation(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase, &params.salt, &mut key)
            .map_err(|e| CredentialError::KeyDerivation(e.to_string()))?;

        Ok(Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
            params,
        })
    }

    /// Parameters to persist so the crypter can be re-derived
    pub fn params(&self) -> &CrypterParams {
        &self.params
    }

    /// Encrypt; the output is `nonce || ciphertext`
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        let nonce = random_bytes::<NONCE_LEN>();
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CredentialError::Encrypt)?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypt data produced by [`encrypt`](Self::encrypt)
    ///
    /// A wrong passphrase surfaces here as [`CredentialError::Decode`].
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CredentialError> {
        if data.len() < NONCE_LEN {
            return Err(CredentialError::Decode);
        }
        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CredentialError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_seal_open() {
        let record = CachedSecret::seal(b"correct horse").unwrap();
        assert_ne!(record.ciphertext, b"correct horse");
        assert_eq!(record.open().unwrap(), b"correct horse");
    }

    #[test]
    fn test_open_malformed() {
        let mut record = CachedSecret::seal(b"secret").unwrap();
        record.params.truncate(4);
        assert!(matches!(record.open(), Err(CredentialError::Decode)));

        let mut record = CachedSecret::seal(b"secret").unwrap();
        record.ciphertext[0] ^= 0xFF;
        assert!(matches!(record.open(), Err(CredentialError::Decode)));
    }

    #[test]
    fn test_cache_take_then_not_found() {
        let dir = tempdir().unwrap();
        let cache = CredentialCache::new(Store::open(dir.path()).unwrap());

        cache.store(Purpose::WalletUnlock, b"wallet pass").unwrap();
        assert!(cache.contains(Purpose::WalletUnlock));
        assert!(!cache.contains(Purpose::ExchangeInit));

        assert_eq!(cache.take(Purpose::WalletUnlock).unwrap(), b"wallet pass");
        assert!(matches!(
            cache.fetch(Purpose::WalletUnlock),
            Err(CredentialError::NotFound("extraInput"))
        ));
    }

    #[test]
    fn test_cache_one_secret_per_purpose() {
        let dir = tempdir().unwrap();
        let cache = CredentialCache::new(Store::open(dir.path()).unwrap());

        cache.store(Purpose::ExchangeInit, b"first").unwrap();
        cache.store(Purpose::ExchangeInit, b"second").unwrap();
        assert_eq!(cache.fetch(Purpose::ExchangeInit).unwrap(), b"second");
    }

    #[test]
    fn test_crypter_rederive() {
        let crypter = PassphraseCrypter::generate(b"passphrase").unwrap();
        let sealed = crypter.encrypt(b"seed bytes").unwrap();

        let again = PassphraseCrypter::derive(b"passphrase", crypter.params().clone()).unwrap();
        assert_eq!(again.decrypt(&sealed).unwrap(), b"seed bytes");

        let wrong = PassphraseCrypter::derive(b"wrong", crypter.params().clone()).unwrap();
        assert!(matches!(wrong.decrypt(&sealed), Err(CredentialError::Decode)));
    }

    #[test]
    fn test_rpc_token() {
        let a = generate_rpc_token();
        let b = generate_rpc_token();
        assert_eq!(a.len(), RPC_TOKEN_LEN);
        assert_ne!(a, b);
        assert!(bs58::decode(&a).into_vec().is_ok());
    }
}
