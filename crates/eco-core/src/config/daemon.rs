//! Daemon configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;
use super::AppPaths;
use crate::netaddr::NetAddr;

/// Release feed listing the published bundles
pub const DEFAULT_RELEASE_FEED: &str =
    "https://api.github.com/repos/decred/decred-binaries/releases";

/// Configuration for the eco daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Root of all daemon state: store, TLS files, install tree, service data
    pub app_dir: PathBuf,

    /// Control-plane listen address (platform default when unset)
    pub listen: Option<NetAddr>,

    /// URL of the release feed
    pub release_feed_url: String,

    /// Default debug level for supervised services
    pub debug_level: String,

    /// Delay between restarts of a crashed service
    #[serde(with = "duration_secs")]
    pub restart_delay: Duration,

    /// How long a stopping service may take before it is killed
    #[serde(with = "duration_secs")]
    pub stop_timeout: Duration,

    /// How long child processes outlive the shutdown signal
    #[serde(with = "duration_secs")]
    pub shutdown_grace: Duration,

    /// Delay between RPC connection attempts
    #[serde(with = "duration_secs")]
    pub rpc_retry: Duration,

    /// Sync poll interval while behind
    #[serde(with = "duration_secs")]
    pub poll_syncing: Duration,

    /// Sync poll interval once caught up
    #[serde(with = "duration_secs")]
    pub poll_synced: Duration,

    /// Timeout for a passthrough control command
    #[serde(with = "duration_secs")]
    pub ctl_timeout: Duration,

    /// Timeout for a client to send its request frame
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,

    /// Local ports for the supervised services
    pub ports: Ports,

    /// Pinned browser archive for the exchange window
    pub browser: Option<BrowserArchive>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            app_dir: super::default_app_dir(),
            listen: None,
            release_feed_url: DEFAULT_RELEASE_FEED.to_string(),
            debug_level: "debug".to_string(),
            restart_delay: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(30),
            rpc_retry: Duration::from_secs(5),
            poll_syncing: Duration::from_secs(5),
            poll_synced: Duration::from_secs(30),
            ctl_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(10),
            ports: Ports::default(),
            browser: None,
        }
    }
}

impl DaemonConfig {
    /// Paths derived from the app directory
    pub fn paths(&self) -> AppPaths {
        AppPaths::new(&self.app_dir)
    }

    /// Effective listen address
    pub fn listen_addr(&self) -> NetAddr {
        self.listen
            .clone()
            .unwrap_or_else(|| NetAddr::default_for(&self.app_dir))
    }
}

/// Loopback ports used by the supervised services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Ports {
    pub node_rpc: u16,
    pub node_p2p: u16,
    pub wallet_rpc: u16,
    pub dex_web: u16,
}

impl Default for Ports {
    fn default() -> Self {
        Self {
            node_rpc: 19703,
            node_p2p: 19704,
            wallet_rpc: 19705,
            dex_web: 26270,
        }
    }
}

impl Ports {
    pub fn node_rpc_addr(&self) -> String {
        format!("127.0.0.1:{}", self.node_rpc)
    }

    pub fn node_p2p_addr(&self) -> String {
        format!("127.0.0.1:{}", self.node_p2p)
    }

    pub fn wallet_rpc_addr(&self) -> String {
        format!("127.0.0.1:{}", self.wallet_rpc)
    }

    pub fn dex_web_addr(&self) -> String {
        format!("127.0.0.1:{}", self.dex_web)
    }

    pub fn dex_url(&self) -> String {
        format!("http://localhost:{}", self.dex_web)
    }
}

/// A browser archive to install when none is found on the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowserArchive {
    pub url: String,
    /// Expected hex SHA-256 of the archive
    pub sha256: String,
}
