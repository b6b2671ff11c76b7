//! Install pipeline
//!
//! Installs the newest published release into `<app_dir>/<version>/`:
//!
//! 1. fetch the release feed and take the newest entry
//! 2. sort its assets into roles using the platform's name patterns
//! 3. download every hash manifest and parse it
//! 4. for each bundle: download, verify against the manifest, unpack into
//!    the version tree
//! 5. remove the helper binaries shipped inside the GUI wallet bundle
//!
//! Any failure aborts the attempt. Callers only record the new version
//! after [`Install::install`] returns successfully, so a failed attempt is
//! retried from scratch.

mod archive;
mod browser;
mod manifest;
mod release;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use eco_core::config::{AppPaths, BrowserArchive, DaemonConfig};
use eco_protocol::ServiceId;
use tokio_util::sync::CancellationToken;

use crate::error::{DaemonError, Result};
use crate::feed::ProgressReporter;
use crate::platform::Platform;

pub use archive::{install_archive, move_contents, ArchiveKind};
pub use browser::{browser_version, find_browser, parse_version, MIN_BROWSER_MAJOR};
pub use manifest::{Manifest, HASH_LEN};
pub use release::{Asset, Release, ReleaseAssets, ReleaseClient};

/// Something that can install releases and locate a browser
#[async_trait]
pub trait Install: Send + Sync {
    /// Install the newest release, returning its version
    ///
    /// Progress is reported on `reporter` in the ranges 0.05 to 0.80.
    /// Cancelling `cancel` abandons the attempt with
    /// [`DaemonError::Cancelled`].
    async fn install(
        &self,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// A compatible browser, if one is present
    async fn find_browser(&self) -> Option<PathBuf>;

    /// A compatible browser, downloading the pinned one when none is present
    async fn ensure_browser(
        &self,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

/// Installer backed by the HTTP release feed
pub struct Installer {
    client: ReleaseClient,
    feed_url: String,
    paths: AppPaths,
    platform: Arc<dyn Platform>,
    browser: Option<BrowserArchive>,
}

impl Installer {
    pub fn new(config: &DaemonConfig, platform: Arc<dyn Platform>) -> Result<Self> {
        Ok(Self {
            client: ReleaseClient::new()?,
            feed_url: config.release_feed_url.clone(),
            paths: config.paths(),
            platform,
            browser: config.browser.clone(),
        })
    }

    async fn fetch_manifests(&self, assets: &ReleaseAssets) -> Result<Manifest> {
        tracing::info!("Retrieving {} manifest files", assets.manifests.len());
        let mut manifest = Manifest::default();
        for asset in &assets.manifests {
            tracing::debug!("Downloading {}", asset.name);
            let text = self.client.fetch_text(&asset.url).await?;
            manifest.extend_from(&text)?;
        }
        Ok(manifest)
    }

    /// Download, verify and unpack one bundle into `dest`
    async fn install_bundle(
        &self,
        scratch: &std::path::Path,
        asset: &Asset,
        manifest: &Manifest,
        dest: PathBuf,
    ) -> Result<()> {
        // Fail before downloading if the manifest does not list the file
        if manifest.get(&asset.name).is_none() {
            return Err(DaemonError::MissingHash(asset.name.clone()));
        }

        let download = scratch.join(&asset.name);
        let digest = self.client.download(&asset.url, &download).await?;
        manifest.verify(&asset.name, &digest)?;

        let name = asset.name.clone();
        tokio::task::spawn_blocking(move || install_archive(&download, &name, &dest))
            .await
            .map_err(|e| DaemonError::Archive(e.to_string()))?
    }

    async fn install_release(&self, reporter: &ProgressReporter) -> Result<String> {
        reporter.report(0.05, "Checking for updates");
        let release = self.client.latest(&self.feed_url).await?;
        let assets = ReleaseAssets::resolve(&release, self.platform.asset_patterns())?;
        let version = assets.version.clone();

        let scratch = tempfile::tempdir()?;

        reporter.report(0.1, "Downloading hash manifests");
        let manifest = self.fetch_manifests(&assets).await?;

        let sub = reporter.sub_reporter(0.12, 0.80);
        sub.report(0.25, format!("Installing program files for {}", version));
        self.install_bundle(
            scratch.path(),
            &assets.program,
            &manifest,
            self.paths.bundle_dir(&version, ServiceId::Dcrd),
        )
        .await?;

        sub.report(0.60, format!("Installing Decrediton {}", version));
        self.install_bundle(
            scratch.path(),
            &assets.gui,
            &manifest,
            self.paths.bundle_dir(&version, ServiceId::Decrediton),
        )
        .await?;

        // The GUI wallet is pointed at the program bundle instead
        let helper_bin = self
            .paths
            .bundle_dir(&version, ServiceId::Decrediton)
            .join("resources")
            .join("bin");
        if helper_bin.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&helper_bin).await {
                tracing::error!("Error removing Decrediton bin directory: {}", e);
            }
        }

        sub.report(0.85, format!("Installing DEX {}", version));
        self.install_bundle(
            scratch.path(),
            &assets.exchange,
            &manifest,
            self.paths.bundle_dir(&version, ServiceId::Dexc),
        )
        .await?;

        tracing::info!("Installed release {}", version);
        Ok(version)
    }

    async fn install_browser(&self, reporter: &ProgressReporter) -> Result<PathBuf> {
        if let Some(path) = Install::find_browser(self).await {
            return Ok(path);
        }
        let Some(pinned) = &self.browser else {
            return Err(DaemonError::BrowserNotFound);
        };

        let name = pinned
            .url
            .rsplit('/')
            .next()
            .filter(|n| !n.is_empty())
            .unwrap_or("chromium.zip")
            .to_string();
        let scratch = tempfile::tempdir()?;
        let download = scratch.path().join(&name);

        reporter.report(0.0, "Fetching Chromium");
        let digest = self.client.download(&pinned.url, &download).await?;

        reporter.report(0.75, "Validating Chromium download");
        if !hex::encode(digest).eq_ignore_ascii_case(pinned.sha256.trim()) {
            return Err(DaemonError::HashMismatch { file: name });
        }

        reporter.report(0.80, "Extracting Chromium");
        let dest = self.paths.browser_dir();
        let unpack_dest = dest.clone();
        tokio::task::spawn_blocking(move || install_archive(&download, &name, &unpack_dest))
            .await
            .map_err(|e| DaemonError::Archive(e.to_string()))??;

        let browser = self.platform.browser_in(&dest);
        if !browser.is_file() {
            return Err(DaemonError::BrowserNotFound);
        }
        Ok(browser)
    }
}

#[async_trait]
impl Install for Installer {
    async fn install(
        &self,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<String> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DaemonError::Cancelled),
            result = self.install_release(reporter) => result,
        }
    }

    async fn find_browser(&self) -> Option<PathBuf> {
        find_browser(self.platform.as_ref(), &self.paths.browser_dir()).await
    }

    async fn ensure_browser(
        &self,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DaemonError::Cancelled),
            result = self.install_browser(reporter) => result,
        }
    }
}
