//! JSON-RPC over HTTPS, as spoken by the node and the wallet

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{BlockchainInfo, NodeClient, RpcConnector, RpcEndpoint, WalletClient, WalletInfo};
use crate::error::{DaemonError, Result};

const CALL_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
struct RpcFault {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// A JSON-RPC client trusting one self-signed server certificate
pub struct JsonRpcClient {
    http: reqwest::Client,
    endpoint: RpcEndpoint,
    next_id: AtomicU64,
}

impl JsonRpcClient {
    /// Build a client for `endpoint`
    ///
    /// Fails while the server has not yet written its certificate.
    pub async fn connect(endpoint: &RpcEndpoint) -> Result<Self> {
        let pem = tokio::fs::read(&endpoint.cert).await?;
        let cert = reqwest::Certificate::from_pem(&pem)?;
        let http = reqwest::Client::builder()
            .add_root_certificate(cert)
            .timeout(CALL_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Call `method`, decoding the result as `T`
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let resp = self
            .http
            .post(&self.endpoint.url)
            .basic_auth(&self.endpoint.user, Some(&self.endpoint.pass))
            .json(&body)
            .send()
            .await?;

        // Servers answer RPC errors with a non-200 status and a JSON body
        let status = resp.status();
        let text = resp.text().await?;
        let reply: RpcReply = match serde_json::from_str(&text) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                return Err(DaemonError::Request {
                    code: status.as_u16(),
                    message: text.trim().to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(fault) = reply.error {
            return Err(DaemonError::Rpc(format!(
                "{}: {} (code {})",
                method, fault.message, fault.code
            )));
        }
        Ok(serde_json::from_value(reply.result)?)
    }
}

#[async_trait]
impl NodeClient for JsonRpcClient {
    async fn blockchain_info(&self) -> Result<BlockchainInfo> {
        self.call("getblockchaininfo", json!([])).await
    }

    async fn stop(&self) -> Result<()> {
        self.call::<Value>("stop", json!([])).await.map(drop)
    }
}

#[async_trait]
impl WalletClient for JsonRpcClient {
    async fn info(&self) -> Result<WalletInfo> {
        self.call("getinfo", json!([])).await
    }

    async fn list_accounts(&self) -> Result<HashMap<String, f64>> {
        self.call("listaccounts", json!([])).await
    }

    async fn unlock(&self, passphrase: &str, timeout_secs: u64) -> Result<()> {
        self.call::<Value>("walletpassphrase", json!([passphrase, timeout_secs]))
            .await
            .map(drop)
    }

    async fn create_account(&self, name: &str) -> Result<()> {
        self.call::<Value>("createnewaccount", json!([name]))
            .await
            .map(drop)
    }

    async fn stop(&self) -> Result<()> {
        self.call::<Value>("stop", json!([])).await.map(drop)
    }
}

/// Connector producing [`JsonRpcClient`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpRpcConnector;

#[async_trait]
impl RpcConnector for HttpRpcConnector {
    async fn node(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn NodeClient>> {
        Ok(Arc::new(JsonRpcClient::connect(endpoint).await?))
    }

    async fn wallet(&self, endpoint: &RpcEndpoint) -> Result<Arc<dyn WalletClient>> {
        Ok(Arc::new(JsonRpcClient::connect(endpoint).await?))
    }
}
