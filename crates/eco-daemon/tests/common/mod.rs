//! Shared fixtures for the daemon integration tests
#![allow(dead_code)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use eco_core::config::{AppPaths, DaemonConfig};
use eco_core::store::{keys, Store};
use eco_daemon::error::{DaemonError, Result};
use eco_daemon::feed::ProgressReporter;
use eco_daemon::installer::Install;
use eco_daemon::platform::UnixPlatform;
use eco_daemon::rpc::{
    BlockchainInfo, NodeClient, RpcConnector, RpcEndpoint, WalletClient, WalletInfo,
};
use eco_daemon::{Collaborators, Eco};
use eco_protocol::{EcoState, ServiceId};
use tokio_util::sync::CancellationToken;

pub const VERSION: &str = "v1.6.0";

/// Config with short timings rooted at `dir`
pub fn test_config(dir: &Path) -> DaemonConfig {
    DaemonConfig {
        app_dir: dir.to_path_buf(),
        restart_delay: Duration::from_millis(100),
        stop_timeout: Duration::from_millis(300),
        shutdown_grace: Duration::from_secs(2),
        rpc_retry: Duration::from_millis(50),
        poll_syncing: Duration::from_millis(50),
        poll_synced: Duration::from_millis(200),
        ctl_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(2),
        ..Default::default()
    }
}

/// Long-running stand-in for every supervised program
///
/// A `<name>.crash` file next to the link makes it exit with an error
/// shortly after starting.
const SERVICE_SCRIPT: &str = r#"#!/bin/sh
case "$*" in
  *--create*) cat > /dev/null; exit 0 ;;
esac
if [ -e "$0.crash" ]; then
  sleep 0.2
  exit 2
fi
exec sleep 30
"#;

/// Stand-in for dcrctl: the wallet only knows getbalance
const CTL_SCRIPT: &str = r#"#!/bin/sh
case "$*" in
  *--wallet*getbalance*) echo "wallet 42" ;;
  *--wallet*) echo "unknown wallet method" >&2; exit 1 ;;
  *fail*) echo "node rejected command" >&2; exit 3 ;;
  *) echo "node $*" ;;
esac
"#;

/// Scripts written once per test binary, before anything is spawned
fn scripts() -> &'static Path {
    static SCRIPTS: OnceLock<tempfile::TempDir> = OnceLock::new();
    SCRIPTS
        .get_or_init(|| {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            for (name, body) in [("service", SERVICE_SCRIPT), ("dcrctl", CTL_SCRIPT)] {
                let path = dir.path().join(name);
                std::fs::write(&path, body).unwrap();
                std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            }
            dir
        })
        .path()
}

fn link(target: &Path, at: PathBuf) {
    std::fs::create_dir_all(at.parent().unwrap()).unwrap();
    let _ = std::fs::remove_file(&at);
    std::os::unix::fs::symlink(target, at).unwrap();
}

/// Put stand-in executables where a release install would
pub fn install_scripts(paths: &AppPaths, version: &str) {
    let service = scripts().join("service");
    for svc in ServiceId::ALL {
        link(&service, paths.bundle_dir(version, svc).join(svc.as_str()));
    }
    link(
        &scripts().join("dcrctl"),
        paths.program_dir(version).join("dcrctl"),
    );
}

/// Persist an installed state before the orchestrator opens
pub fn write_state(paths: &AppPaths, state: &EcoState) {
    Store::open(paths.db_dir())
        .unwrap()
        .put(keys::ECO_STATE, state)
        .unwrap();
}

/// Installer that drops the stand-in scripts instead of downloading
pub struct FakeInstaller {
    paths: AppPaths,
    pub installs: AtomicUsize,
}

impl FakeInstaller {
    pub fn new(paths: AppPaths) -> Self {
        Self {
            paths,
            installs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Install for FakeInstaller {
    async fn install(
        &self,
        reporter: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        reporter.report(0.05, "Checking for updates");
        install_scripts(&self.paths, VERSION);
        self.installs.fetch_add(1, Ordering::SeqCst);
        reporter.report(0.80, format!("Installed {}", VERSION));
        Ok(VERSION.to_string())
    }

    async fn find_browser(&self) -> Option<PathBuf> {
        None
    }

    async fn ensure_browser(
        &self,
        _reporter: &ProgressReporter,
        _cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        Err(DaemonError::BrowserNotFound)
    }
}

/// Node that ignores stop requests; synced unless `syncing` is set
#[derive(Default)]
pub struct FakeNode {
    pub stops: AtomicUsize,
    pub syncing: AtomicBool,
}

#[async_trait]
impl NodeClient for FakeNode {
    async fn blockchain_info(&self) -> Result<BlockchainInfo> {
        let syncing = self.syncing.load(Ordering::SeqCst);
        Ok(BlockchainInfo {
            blocks: if syncing { 500 } else { 1000 },
            headers: 1000,
            syncheight: 1000,
            initialblockdownload: syncing,
        })
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wallet with no accounts; its chain is loaded unless `loading` is set
#[derive(Default)]
pub struct FakeWallet {
    pub stops: AtomicUsize,
    pub loading: AtomicBool,
    pub accounts_created: AtomicUsize,
}

#[async_trait]
impl WalletClient for FakeWallet {
    async fn info(&self) -> Result<WalletInfo> {
        let blocks = if self.loading.load(Ordering::SeqCst) { 0 } else { 1000 };
        Ok(WalletInfo { blocks })
    }

    async fn list_accounts(&self) -> Result<std::collections::HashMap<String, f64>> {
        Ok(Default::default())
    }

    async fn unlock(&self, _passphrase: &str, _timeout_secs: u64) -> Result<()> {
        Ok(())
    }

    async fn create_account(&self, _name: &str) -> Result<()> {
        self.accounts_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRpc {
    pub node: Arc<FakeNode>,
    pub wallet: Arc<FakeWallet>,
}

#[async_trait]
impl RpcConnector for FakeRpc {
    async fn node(&self, _endpoint: &RpcEndpoint) -> Result<Arc<dyn NodeClient>> {
        Ok(self.node.clone())
    }

    async fn wallet(&self, _endpoint: &RpcEndpoint) -> Result<Arc<dyn WalletClient>> {
        Ok(self.wallet.clone())
    }
}

/// Orchestrator over the fakes
pub fn open_eco(
    config: DaemonConfig,
    installer: Arc<dyn Install>,
    rpc: Arc<FakeRpc>,
    cancel: &CancellationToken,
) -> Arc<Eco> {
    let parts = Collaborators {
        platform: Arc::new(UnixPlatform::new("linux", "amd64").unwrap()),
        installer,
        rpc,
    };
    Eco::new(config, parts, cancel).unwrap()
}

/// Poll `check` until it holds, failing the test after five seconds
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {}", what);
}
