//! RPC capabilities of the supervised services
//!
//! The orchestrator talks to the node and wallet only through the
//! [`NodeClient`] and [`WalletClient`] traits, obtained from an
//! [`RpcConnector`]. The default connector speaks JSON-RPC over HTTPS;
//! tests substitute in-memory fakes.

mod exchange;
mod jsonrpc;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::Result;

pub use exchange::{ExchangeAsset, ExchangeClient, ExchangeUser, NewWalletForm, DCR_ASSET_ID};
pub use jsonrpc::{HttpRpcConnector, JsonRpcClient};

/// Where and how to reach an RPC server
#[derive(Debug, Clone)]
pub struct RpcEndpoint {
    /// Base URL, e.g. `https://localhost:19703`
    pub url: String,
    pub user: String,
    pub pass: String,
    /// Server certificate to trust
    pub cert: PathBuf,
}

/// Node chain state, from `getblockchaininfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BlockchainInfo {
    #[serde(default)]
    pub blocks: i64,
    #[serde(default)]
    pub headers: i64,
    #[serde(default)]
    pub syncheight: i64,
    #[serde(default)]
    pub initialblockdownload: bool,
}

impl BlockchainInfo {
    /// Best known chain height, from either sync height or headers
    pub fn target_height(&self) -> i64 {
        self.syncheight.max(self.headers)
    }
}

/// Wallet state, from `getinfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WalletInfo {
    #[serde(default)]
    pub blocks: i64,
}

/// Calls the orchestrator makes on the node
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn blockchain_info(&self) -> Result<BlockchainInfo>;

    /// Ask the node to shut down
    async fn stop(&self) -> Result<()>;
}

/// Calls the orchestrator makes on the wallet
#[async_trait]
pub trait WalletClient: Send + Sync {
    async fn info(&self) -> Result<WalletInfo>;

    /// Account names and balances
    async fn list_accounts(&self) -> Result<HashMap<String, f64>>;

    /// Unlock the wallet for `timeout_secs` (0 for no timeout)
    async fn unlock(&self, passphrase: &str, timeout_secs: u64) -> Result<()>;

    async fn create_account(&self, name: &str) -> Result<()>;

    /// Ask the wallet to shut down
    async fn stop(&self) -> Result<()>;
}

/// Builds RPC clients for the supervised services
#[async_trait]
pub trait RpcConnector: Send + Sync {
    async fn node(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn NodeClient>>;

    async fn wallet(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn WalletClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blockchain_info_decode() {
        let info: BlockchainInfo = serde_json::from_str(
            r#"{"chain":"mainnet","blocks":500,"headers":620,"syncheight":600,
                "initialblockdownload":true,"bestblockhash":"00ab"}"#,
        )
        .unwrap();
        assert_eq!(info.blocks, 500);
        assert_eq!(info.target_height(), 620);
        assert!(info.initialblockdownload);
    }
}
