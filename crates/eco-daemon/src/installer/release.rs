//! Release feed client and asset resolution

use std::path::Path;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use super::manifest::HASH_LEN;
use crate::error::{DaemonError, Result};
use crate::platform::AssetPatterns;

const CLIENT_AGENT: &str = concat!("eco/", env!("CARGO_PKG_VERSION"));

/// Longest wait for a response or the next chunk of a body
pub const STALL_TIMEOUT: Duration = Duration::from_secs(60);

/// One published release
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub prerelease: bool,
    /// RFC 3339 timestamp
    #[serde(default)]
    pub published_at: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    /// Version string used to name the install directory
    pub fn version(&self) -> &str {
        if self.name.is_empty() {
            &self.tag_name
        } else {
            &self.name
        }
    }
}

/// A downloadable file attached to a release
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    /// API URL; serves the file body with `Accept: application/octet-stream`
    pub url: String,
    #[serde(default)]
    pub browser_download_url: String,
}

/// A release's assets sorted into roles
#[derive(Debug, Clone)]
pub struct ReleaseAssets {
    pub version: String,
    pub program: Asset,
    pub gui: Asset,
    pub exchange: Asset,
    pub manifests: Vec<Asset>,
}

impl ReleaseAssets {
    /// Match `release`'s assets against the platform patterns
    pub fn resolve(release: &Release, patterns: &AssetPatterns) -> Result<Self> {
        let find = |role: &'static str, re: &regex::Regex| {
            release
                .assets
                .iter()
                .find(|a| re.is_match(&a.name))
                .cloned()
                .ok_or(DaemonError::MissingAsset(role))
        };

        let manifests: Vec<Asset> = release
            .assets
            .iter()
            .filter(|a| patterns.manifest.is_match(&a.name))
            .cloned()
            .collect();
        if manifests.is_empty() {
            return Err(DaemonError::MissingAsset("manifest"));
        }

        Ok(Self {
            version: release.version().to_string(),
            program: find("decred", &patterns.program)?,
            gui: find("decrediton", &patterns.gui)?,
            exchange: find("dexc", &patterns.exchange)?,
            manifests,
        })
    }
}

/// HTTP client for the release feed and asset downloads
#[derive(Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    stall: Duration,
}

impl ReleaseClient {
    pub fn new() -> Result<Self> {
        Self::with_stall_timeout(STALL_TIMEOUT)
    }

    /// Client that gives up on a server silent for longer than `stall`
    ///
    /// Feed and manifest requests are bounded by `stall` as a whole; asset
    /// downloads by `stall` per chunk, so large bundles are not cut off.
    pub fn with_stall_timeout(stall: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(CLIENT_AGENT)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { http, stall })
    }

    /// Newest release in the feed
    pub async fn latest(&self, feed_url: &str) -> Result<Release> {
        let resp = self.http.get(feed_url).timeout(self.stall).send().await?;
        let mut releases: Vec<Release> = check(resp).await?.json().await?;

        // RFC 3339 in UTC sorts lexically
        releases.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        let release = releases.into_iter().next().ok_or(DaemonError::NoReleases)?;
        tracing::info!("Latest release is {}", release.version());
        Ok(release)
    }

    /// Fetch a small text asset
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .header(ACCEPT, "application/octet-stream")
            .timeout(self.stall)
            .send()
            .await?;
        Ok(check(resp).await?.text().await?)
    }

    /// Stream an asset to `dest`, returning its SHA-256
    pub async fn download(&self, url: &str, dest: &Path) -> Result<[u8; HASH_LEN]> {
        tracing::info!("Fetching {} to {:?}", url, dest);
        let request = self
            .http
            .get(url)
            .header(ACCEPT, "application/octet-stream")
            .send();
        let resp = tokio::time::timeout(self.stall, request)
            .await
            .map_err(|_| DaemonError::Stalled(url.to_string()))??;
        let mut resp = check(resp).await?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        loop {
            let chunk = tokio::time::timeout(self.stall, resp.chunk())
                .await
                .map_err(|_| DaemonError::Stalled(url.to_string()))??;
            let Some(chunk) = chunk else { break };
            hasher.update(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(hasher.finalize().into())
    }
}

/// Turn a non-success status into [`DaemonError::Request`]
pub(crate) async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(DaemonError::Request {
        code: status.as_u16(),
        message: message.trim().to_string(),
    })
}
