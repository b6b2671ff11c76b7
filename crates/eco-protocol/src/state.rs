//! State types visible on the wire
//!
//! These are the values clients observe: the aggregate [`MetaState`]
//! returned by `service_status`, the [`Progress`] updates streamed during
//! init and sync, and the per-service [`ServiceStatus`] pushed on the feed.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Progress at or above this value counts as complete
pub const COMPLETE_THRESHOLD: f64 = 0.9999;

/// How the node validates the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// No install has completed yet
    #[default]
    Uninitialized,
    /// Lightweight mode, the wallet syncs without a full node
    Spv,
    /// Full node validation
    Full,
}

impl SyncMode {
    /// Raw value used in init requests
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Uninitialized => 0,
            Self::Spv => 1,
            Self::Full => 2,
        }
    }

    /// Parse a raw init request value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Uninitialized),
            1 => Some(Self::Spv),
            2 => Some(Self::Full),
            _ => None,
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "uninitialized"),
            Self::Spv => write!(f, "spv"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spv" | "lightweight" => Ok(Self::Spv),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown sync mode: {}", other)),
        }
    }
}

/// Persistent installation state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcoState {
    /// Chosen sync mode
    pub sync_mode: SyncMode,
    /// Whether a wallet has been created
    pub wallet_exists: bool,
    /// Installed release version, empty before the first install
    pub version: String,
}

/// A managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServiceId {
    /// The full node
    Dcrd,
    /// The wallet daemon
    Dcrwallet,
    /// The GUI wallet app
    Decrediton,
    /// The exchange client
    Dexc,
}

impl ServiceId {
    /// Every managed service, in dependency order
    pub const ALL: [ServiceId; 4] = [Self::Dcrd, Self::Dcrwallet, Self::Decrediton, Self::Dexc];

    /// Program name, also used as the service id on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dcrd => "dcrd",
            Self::Dcrwallet => "dcrwallet",
            Self::Decrediton => "decrediton",
            Self::Dexc => "dexc",
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|svc| svc.as_str() == s)
            .ok_or_else(|| format!("unknown service: {}", s))
    }
}

/// Whether a service's process is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub service: ServiceId,
    pub on: bool,
}

/// Installation state plus the status of every service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaState {
    pub eco: EcoState,
    pub services: BTreeMap<ServiceId, ServiceStatus>,
}

/// A progress report for an install, init, or sync operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Service (or pseudo-service such as `eco`) the report is about
    pub service: String,
    /// Human-readable status
    pub status: String,
    /// Non-empty on failure
    pub err: String,
    /// Fraction complete in [0, 1]
    pub progress: f64,
}

impl Progress {
    /// A normal progress report
    pub fn new(service: impl Into<String>, status: impl Into<String>, progress: f64) -> Self {
        Self {
            service: service.into(),
            status: status.into(),
            err: String::new(),
            progress: progress.clamp(0.0, 1.0),
        }
    }

    /// A failure report
    pub fn failed(service: impl Into<String>, status: impl Into<String>, err: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: status.into(),
            err: err.into(),
            progress: 0.0,
        }
    }

    /// Whether this report marks completion
    pub fn is_complete(&self) -> bool {
        self.progress >= COMPLETE_THRESHOLD
    }

    /// Whether no further reports follow this one on an init stream
    pub fn is_terminal(&self) -> bool {
        !self.err.is_empty() || self.is_complete()
    }
}

/// User-adjustable node settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub debug_level: String,
}

/// Durable node state: settings and generated RPC credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub user_settings: UserSettings,
    pub rpc_user: String,
    pub rpc_pass: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_mode_raw_values() {
        for mode in [SyncMode::Uninitialized, SyncMode::Spv, SyncMode::Full] {
            assert_eq!(SyncMode::from_u8(mode.as_u8()), Some(mode));
        }
        assert_eq!(SyncMode::from_u8(7), None);
    }

    #[test]
    fn test_service_id_parse() {
        assert_eq!("dexc".parse::<ServiceId>().unwrap(), ServiceId::Dexc);
        assert!("eco".parse::<ServiceId>().is_err());
    }

    #[test]
    fn test_progress_terminal() {
        assert!(!Progress::new("eco", "Downloading", 0.5).is_terminal());
        assert!(Progress::new("eco", "Done", 1.0).is_terminal());
        assert!(Progress::new("eco", "Almost", 0.99995).is_complete());
        assert!(Progress::failed("eco", "Downloading", "boom").is_terminal());
    }

    #[test]
    fn test_progress_clamped() {
        assert_eq!(Progress::new("dcrd", "x", 1.7).progress, 1.0);
        assert_eq!(Progress::new("dcrd", "x", -0.2).progress, 0.0);
    }
}
