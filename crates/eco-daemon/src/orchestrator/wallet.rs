//! Wallet: launch arguments, readiness and sync polling

use std::sync::Arc;
use std::time::Duration;

use eco_core::credentials::Purpose;
use eco_protocol::{Progress, ServiceId, SyncMode};
use tokio_util::sync::CancellationToken;

use super::{wallet_progress, Eco, Launch, FULLY_SYNCED};
use crate::error::{DaemonError, Result};

/// Poll interval while the wallet loads its chain
const WALLET_LOAD_POLL: Duration = Duration::from_secs(1);

impl Eco {
    pub(super) async fn start_wallet(self: &Arc<Self>) -> Result<()> {
        let svc = ServiceId::Dcrwallet;
        let guard = self
            .flags
            .get(svc)
            .try_acquire()
            .ok_or(DaemonError::AlreadyRunning(svc))?;
        let version = self.installed_version().await?;
        let mode = self.eco_state().await.sync_mode;
        let run = self.begin_run(svc).await;

        let this = Arc::clone(self);
        tokio::spawn(async move {
            if mode != SyncMode::Spv && !this.node_synced.is_open() {
                tracing::info!("dcrwallet waiting for dcrd to sync");
                tokio::select! {
                    _ = run.cancelled() => return,
                    _ = this.node_synced.wait() => {}
                }
            }

            let launch = match this.wallet_launch(&version, mode).await {
                Ok(launch) => launch,
                Err(e) => {
                    tracing::error!("Error preparing dcrwallet: {}", e);
                    return;
                }
            };
            tokio::spawn(Arc::clone(&this).track_wallet(run.clone(), mode));
            this.supervise(svc, guard, run, launch, true).await;
        });
        Ok(())
    }

    async fn wallet_launch(&self, version: &str, mode: SyncMode) -> Result<Launch> {
        let svc = ServiceId::Dcrwallet;
        let node_state = self.node_state().await;
        let ports = &self.config.ports;

        let mut args = vec![
            format!("--appdata={}", self.paths.service_data_dir(svc).display()),
            format!("--debuglevel={}", node_state.user_settings.debug_level),
            format!("--rpclisten={}", ports.wallet_rpc_addr()),
            format!("--username={}", node_state.rpc_user),
            format!("--password={}", node_state.rpc_pass),
            format!("--rpccert={}", self.paths.wallet_rpc_cert().display()),
            format!("--rpckey={}", self.paths.wallet_rpc_key().display()),
            "--nogrpc".to_string(),
        ];
        if mode == SyncMode::Spv {
            args.push("--spv".to_string());
        } else {
            args.push(format!("--rpcconnect={}", ports.node_rpc_addr()));
            args.push(format!("--cafile={}", self.paths.node_rpc_cert().display()));
        }

        // The passphrase from initialization unlocks the wallet on first start
        if self.credentials.contains(Purpose::WalletUnlock) {
            let secret = self.credentials.fetch(Purpose::WalletUnlock)?;
            args.push(format!("--pass={}", String::from_utf8_lossy(&secret)));
        }

        Ok(Launch {
            path: self.exe_path(version, svc),
            args,
        })
    }

    /// Connect to the wallet, open the ready gate once it has loaded, then
    /// publish its sync progress until `run` ends
    async fn track_wallet(self: Arc<Self>, run: CancellationToken, mode: SyncMode) {
        let svc = ServiceId::Dcrwallet;
        let endpoint = self.wallet_endpoint(&self.node_state().await);
        let Some(client) = self
            .connect(&run, svc, || self.rpc.wallet(&endpoint))
            .await
        else {
            return;
        };
        self.inner.write().await.wallet = Some(Arc::clone(&client));

        loop {
            match client.info().await {
                Ok(info) if info.blocks > 0 => break,
                Ok(_) => {}
                Err(e) => tracing::debug!(service = %svc, "dcrwallet not loaded: {}", e),
            }
            tokio::select! {
                _ = run.cancelled() => return,
                _ = tokio::time::sleep(WALLET_LOAD_POLL) => {}
            }
        }

        if let Err(e) = self.credentials.clear(Purpose::WalletUnlock) {
            tracing::error!("Error clearing wallet credentials: {}", e);
        }
        self.wallet_ready.open();
        tracing::info!("dcrwallet ready");

        let mut connected = true;
        loop {
            let delay = match client.info().await {
                Ok(info) => {
                    connected = true;
                    self.report_wallet_sync(mode, info.blocks).await
                }
                Err(e) => {
                    tracing::warn!(service = %svc, "Error getting wallet info: {}", e);
                    if connected {
                        self.feed.publish_progress(&Progress::failed(
                            svc.as_str(),
                            "",
                            "dcrwallet disconnected",
                        ));
                    }
                    connected = false;
                    self.config.poll_syncing
                }
            };

            tokio::select! {
                _ = run.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!("dcrwallet sync polling stopped");
    }

    /// Publish wallet progress against the node; returns the next poll delay
    ///
    /// SPV wallets have no local node to compare against and report nothing.
    async fn report_wallet_sync(&self, mode: SyncMode, blocks: i64) -> Duration {
        let svc = ServiceId::Dcrwallet;
        if mode != SyncMode::Full {
            return self.config.poll_synced;
        }
        let Some(node) = self.inner.read().await.node.clone() else {
            return self.config.poll_syncing;
        };

        match node.blockchain_info().await {
            Ok(info) => {
                let progress = wallet_progress(blocks, &info);
                let status = if progress >= 1.0 { FULLY_SYNCED } else { "Syncing" };
                self.feed
                    .publish_progress(&Progress::new(svc.as_str(), status, progress));
                if progress >= 1.0 {
                    self.config.poll_synced
                } else {
                    self.config.poll_syncing
                }
            }
            Err(e) => {
                tracing::warn!(service = %svc, "Error getting blockchain info: {}", e);
                self.feed
                    .publish_progress(&Progress::failed(svc.as_str(), "", "Wallet sync error"));
                self.config.poll_syncing
            }
        }
    }
}
