//! Core error types for eco

use eco_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for eco-core
#[derive(Error, Debug)]
pub enum EcoError {
    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Credential error
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Durable store errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be encoded or decoded
    #[error("Encoding error for {key}: {source}")]
    Encoding {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Credential cache and crypter errors
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No live secret for this purpose
    #[error("No cached credential for {0}")]
    NotFound(&'static str),

    /// Record is malformed or fails authentication
    #[error("Failed to decode cached credential")]
    Decode,

    /// Encryption failed
    #[error("Failed to encrypt credential")]
    Encrypt,

    /// Key derivation failed
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Underlying store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// TLS material errors
#[derive(Error, Debug)]
pub enum TlsError {
    /// Only one of the certificate/key pair is on disk
    #[error("Found {present:?} but not {missing:?}")]
    PartialPair { present: PathBuf, missing: PathBuf },

    /// No private key in the key file
    #[error("No private key found in {0:?}")]
    MissingKey(PathBuf),

    /// Certificate generation failed
    #[error("Certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    /// rustls rejected the configuration
    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
