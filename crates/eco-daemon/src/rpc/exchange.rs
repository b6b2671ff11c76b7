//! HTTP client for the exchange's web API

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DaemonError, Result};

/// Asset ID of the native coin on the exchange
pub const DCR_ASSET_ID: u32 = 42;

const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(10);

/// `GET /api/user` response, reduced to what initialization needs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeUser {
    #[serde(default, rename = "inited")]
    pub initialized: bool,
    #[serde(default)]
    pub authed: bool,
    #[serde(default)]
    pub assets: HashMap<u32, ExchangeAsset>,
}

impl ExchangeUser {
    /// Whether the exchange already has a wallet for `asset_id`
    pub fn has_wallet(&self, asset_id: u32) -> bool {
        self.assets
            .get(&asset_id)
            .and_then(|a| a.wallet.as_ref())
            .is_some_and(|w| !w.is_null())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExchangeAsset {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub wallet: Option<Value>,
}

/// `POST /api/newwallet` body
#[derive(Debug, Clone, Serialize)]
pub struct NewWalletForm {
    #[serde(rename = "assetID")]
    pub asset_id: u32,
    pub config: BTreeMap<String, String>,
    pub pass: String,
    #[serde(rename = "appPass")]
    pub app_pass: String,
}

#[derive(Serialize)]
struct PassForm<'a> {
    pass: &'a str,
}

/// Session-keeping client for the exchange's local web server
pub struct ExchangeClient {
    http: reqwest::Client,
    base: String,
}

impl ExchangeClient {
    /// Client for the exchange served at `base` (e.g. `http://localhost:26270`)
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(EXCHANGE_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
        })
    }

    fn api(&self, route: &str) -> String {
        format!("{}/api/{}", self.base, route)
    }

    pub async fn user(&self) -> Result<ExchangeUser> {
        let resp = self.http.get(self.api("user")).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    /// Whether the web server answers at all
    pub async fn is_up(&self) -> bool {
        self.http.get(self.api("user")).send().await.is_ok()
    }

    /// POST a JSON body to `/api/<route>`
    pub async fn post<B: Serialize + ?Sized>(&self, route: &str, body: &B) -> Result<Vec<u8>> {
        let resp = self.http.post(self.api(route)).json(body).send().await?;
        Ok(check(resp).await?.bytes().await?.to_vec())
    }

    /// Set the application password on a fresh exchange
    pub async fn init(&self, pass: &str) -> Result<()> {
        self.post("init", &PassForm { pass }).await.map(drop)
    }

    pub async fn login(&self, pass: &str) -> Result<()> {
        self.post("login", &PassForm { pass }).await.map(drop)
    }

    pub async fn new_wallet(&self, form: &NewWalletForm) -> Result<()> {
        self.post("newwallet", form).await.map(drop)
    }
}

/// Exchange errors carry the status code and body text
async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == reqwest::StatusCode::OK {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(DaemonError::Request {
        code: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_decode() {
        let user: ExchangeUser = serde_json::from_str(
            r#"{"inited":true,"authed":false,
                "assets":{"42":{"symbol":"dcr","wallet":null},"0":{"symbol":"btc","wallet":{"open":true}}}}"#,
        )
        .unwrap();
        assert!(user.initialized);
        assert!(!user.authed);
        assert!(!user.has_wallet(DCR_ASSET_ID));
        assert!(user.has_wallet(0));
    }

    #[test]
    fn test_new_wallet_form_field_names() {
        let form = NewWalletForm {
            asset_id: DCR_ASSET_ID,
            config: BTreeMap::from([("account".to_string(), "dex".to_string())]),
            pass: "w".into(),
            app_pass: "a".into(),
        };
        let v = serde_json::to_value(&form).unwrap();
        assert_eq!(v["assetID"], 42);
        assert_eq!(v["appPass"], "a");
        assert_eq!(v["config"]["account"], "dex");
    }

    #[test]
    fn test_api_route() {
        let client = ExchangeClient::new("http://localhost:26270/").unwrap();
        assert_eq!(client.api("user"), "http://localhost:26270/api/user");
    }
}
