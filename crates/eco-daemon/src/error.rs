//! Daemon error types
//!
//! Variants group into the categories callers act on:
//!
//! - precondition: rejected immediately, never retried
//! - transient: RPC or HTTP failures, retried by the caller's loop
//! - integrity: manifest and hash failures, fatal to an install attempt
//! - install: missing releases, assets or broken archives
//! - supervision: process exits, stop timeouts, run exclusivity
//!
//! The `Display` string of a variant is what clients get to see.

use std::path::PathBuf;
use std::process::ExitStatus;

use eco_core::error::{CredentialError, StoreError, TlsError};
use eco_core::EcoError;
use eco_protocol::{ProtocolError, ServiceId};
use thiserror::Error;

/// Errors raised by the daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    /// First initialization without a passphrase
    #[error("Password required to initialize wallet")]
    NoPassphrase,

    /// Initialization requested twice
    #[error("Eco is already initialized")]
    AlreadyInitialized,

    /// Sync mode byte is not a mode that can be initialized
    #[error("Unknown sync mode requested")]
    UnknownSyncMode,

    /// Operation needs an installed release
    #[error("not initialized")]
    NotInitialized,

    /// Run exclusivity for the service is already held
    #[error("{0} already running")]
    AlreadyRunning(ServiceId),

    /// Service has no running process
    #[error("Cannot stop {0}. Not running")]
    NotRunning(ServiceId),

    /// Control command refused
    #[error("method not allowed")]
    NotAllowed,

    /// Empty control command
    #[error("no command")]
    NoCommand,

    /// Control command line could not be tokenized
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Control command failed against every endpoint
    #[error("{reason}: {output}")]
    CtlFailed { reason: String, output: String },

    /// An initialization is already underway
    #[error("Initialization already in progress")]
    InitInProgress,

    /// Exchange requested in lightweight mode
    #[error("Cannot run DEX in SPV mode")]
    ExchangeSpv,

    /// Only one exchange window at a time
    #[error("DEX window already open")]
    WindowOpen,

    /// JSON-RPC call failed
    #[error("RPC error: {0}")]
    Rpc(String),

    /// HTTP transport failure
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request answered with a non-success status
    #[error("Request error: code = {code}, msg = {message}")]
    Request { code: u16, message: String },

    /// Server stopped sending before the download finished
    #[error("Download of {0} stalled")]
    Stalled(String),

    /// Malformed hash manifest line
    #[error("Manifest parse error on line {line}: {reason}")]
    Manifest { line: usize, reason: String },

    /// Downloaded file does not match its manifest hash
    #[error("Hash mismatch for {file}")]
    HashMismatch { file: String },

    /// No manifest entry for a downloaded file
    #[error("No hash found for {0}")]
    MissingHash(String),

    /// Release feed returned nothing
    #[error("No releases fetched")]
    NoReleases,

    /// A required asset role was not matched in the release
    #[error("No {0} asset found in release")]
    MissingAsset(&'static str),

    /// Archive could not be unpacked
    #[error("Archive error: {0}")]
    Archive(String),

    /// Executable could not be launched
    #[error("Failed to start {path:?}: {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Process exited unsuccessfully
    #[error("Process exited with {0}")]
    Exited(ExitStatus),

    /// Process did not stop in time and was killed
    #[error("Timed out waiting for {0} to shutdown. Killing the process")]
    StopTimeout(ServiceId),

    /// No usable browser for the exchange window
    #[error("Failed to locate chromium-based browser")]
    BrowserNotFound,

    /// Platform services could not be set up
    #[error("Platform error: {0}")]
    Platform(#[from] regex::Error),

    /// Operation abandoned because of shutdown
    #[error("Operation cancelled")]
    Cancelled,

    /// Core error
    #[error(transparent)]
    Core(#[from] EcoError),

    /// Store error
    #[error("DB error: {0}")]
    Store(#[from] StoreError),

    /// Credential error
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[from] TlsError),

    /// Wire protocol error
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<zip::result::ZipError> for DaemonError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl DaemonError {
    /// Whether the error rejects a request outright, without side effects
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::NoPassphrase
                | Self::AlreadyInitialized
                | Self::UnknownSyncMode
                | Self::NotInitialized
                | Self::AlreadyRunning(_)
                | Self::NotAllowed
                | Self::NoCommand
                | Self::InvalidCommand(_)
                | Self::InitInProgress
                | Self::ExchangeSpv
                | Self::WindowOpen
        )
    }

    /// Whether the error is an integrity failure of downloaded content
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            Self::Manifest { .. } | Self::HashMismatch { .. } | Self::MissingHash(_)
        )
    }
}

/// Result alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;
