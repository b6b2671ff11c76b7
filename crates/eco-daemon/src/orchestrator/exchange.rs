//! Exchange client: launch, first-run initialization and the app window

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use eco_core::credentials::Purpose;
use eco_core::error::CredentialError;
use eco_protocol::{ServiceId, ServiceStatus, SyncMode};
use tokio_util::sync::CancellationToken;

use super::{should_warn, Eco, Launch};
use crate::error::{DaemonError, Result};
use crate::rpc::{ExchangeClient, NewWalletForm, DCR_ASSET_ID};

/// Wallet account funding the exchange
pub const EXCHANGE_ACCOUNT: &str = "dex";

/// Health checks before giving up on opening the window
const WINDOW_POLL_ATTEMPTS: u32 = 30;
const WINDOW_POLL_INTERVAL: Duration = Duration::from_secs(1);

impl Eco {
    pub(super) async fn start_exchange(self: &Arc<Self>) -> Result<()> {
        let svc = ServiceId::Dexc;
        let state = self.eco_state().await;

        // Funding the exchange wallet needs a full node
        if state.sync_mode == SyncMode::Spv {
            if self.credentials.contains(Purpose::ExchangeInit) {
                tracing::warn!("Discarding cached exchange credentials in SPV mode");
                self.credentials.clear(Purpose::ExchangeInit)?;
            }
            return Err(DaemonError::ExchangeSpv);
        }

        let guard = self
            .flags
            .get(svc)
            .try_acquire()
            .ok_or(DaemonError::AlreadyRunning(svc))?;
        let version = self.installed_version().await?;

        let launch = Launch {
            path: self.exe_path(&version, svc),
            args: vec![
                format!("--appdata={}", self.paths.service_data_dir(svc).display()),
                format!("--webaddr=localhost:{}", self.config.ports.dex_web),
            ],
        };
        let run = self.begin_run(svc).await;

        if self.credentials.contains(Purpose::ExchangeInit) {
            tokio::spawn(Arc::clone(self).initialize_exchange(run.clone()));
        }
        tokio::spawn(Arc::clone(self).supervise(svc, guard, run, launch, true));
        Ok(())
    }

    /// Retry first-run setup until it succeeds or `run` ends
    async fn initialize_exchange(self: Arc<Self>, run: CancellationToken) {
        tokio::select! {
            _ = run.cancelled() => return,
            _ = self.wallet_ready.wait() => {}
        }

        let client = match ExchangeClient::new(self.config.ports.dex_url()) {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Error creating exchange client: {}", e);
                return;
            }
        };

        let mut attempts: u32 = 0;
        loop {
            match self.try_initialize_exchange(&client).await {
                Ok(()) => {
                    if let Err(e) = self.credentials.clear(Purpose::ExchangeInit) {
                        tracing::error!("Error clearing exchange credentials: {}", e);
                    }
                    tracing::info!("Exchange initialized");

                    // Re-announce so clients see the exchange is usable
                    let on = self
                        .inner
                        .read()
                        .await
                        .services
                        .get(&ServiceId::Dexc)
                        .is_some_and(|s| s.on);
                    self.feed.publish_status(&ServiceStatus {
                        service: ServiceId::Dexc,
                        on,
                    });
                    return;
                }
                Err(e) => {
                    attempts += 1;
                    if should_warn(attempts) {
                        tracing::warn!("Exchange initialization attempt {} failed: {}", attempts, e);
                    } else {
                        tracing::debug!("Exchange initialization failed: {}", e);
                    }
                }
            }

            tokio::select! {
                _ = run.cancelled() => return,
                _ = tokio::time::sleep(self.config.rpc_retry) => {}
            }
        }
    }

    async fn try_initialize_exchange(&self, client: &ExchangeClient) -> Result<()> {
        let wallet = self.inner.read().await.wallet.clone().ok_or_else(|| {
            DaemonError::Rpc("Cannot initialize DEX: No dcrwallet rpc client found".into())
        })?;
        let pass = String::from_utf8(self.credentials.fetch(Purpose::ExchangeInit)?)
            .map_err(|_| CredentialError::Decode)?;

        let accounts = wallet.list_accounts().await?;
        if !accounts.contains_key(EXCHANGE_ACCOUNT) {
            wallet.unlock(&pass, 0).await?;
            tracing::info!("Creating new '{}' account", EXCHANGE_ACCOUNT);
            wallet.create_account(EXCHANGE_ACCOUNT).await?;
        }

        let user = client.user().await?;
        if user.initialized {
            client.login(&pass).await?;
        } else {
            client.init(&pass).await?;
        }

        if !user.has_wallet(DCR_ASSET_ID) {
            let node_state = self.node_state().await;
            let config = BTreeMap::from([
                ("account".to_string(), EXCHANGE_ACCOUNT.to_string()),
                ("username".to_string(), node_state.rpc_user),
                ("password".to_string(), node_state.rpc_pass),
                ("rpclisten".to_string(), self.config.ports.wallet_rpc_addr()),
                (
                    "rpccert".to_string(),
                    self.paths.wallet_rpc_cert().display().to_string(),
                ),
            ]);
            let form = NewWalletForm {
                asset_id: DCR_ASSET_ID,
                config,
                pass: pass.clone(),
                app_pass: pass,
            };
            if let Err(e) = client.new_wallet(&form).await {
                if !e.to_string().contains("already initialized") {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Start the exchange if needed and open its UI in an app window
    ///
    /// Returns once the window launch is underway; the browser starts after
    /// the exchange's web server answers.
    pub async fn open_exchange_window(self: &Arc<Self>) -> Result<()> {
        match self.start_exchange().await {
            Ok(()) | Err(DaemonError::AlreadyRunning(_)) => {}
            Err(e) => return Err(e),
        }

        let browser = self
            .installer
            .find_browser()
            .await
            .ok_or(DaemonError::BrowserNotFound)?;
        let guard = self
            .window_flag
            .try_acquire()
            .ok_or(DaemonError::WindowOpen)?;
        let client = ExchangeClient::new(self.config.ports.dex_url())?;

        let launch = Launch {
            path: browser,
            args: vec![
                format!(
                    "--user-data-dir={}",
                    self.paths.browser_profile_dir().display()
                ),
                "--disable-extensions".to_string(),
                "--no-first-run".to_string(),
                format!("--app={}", self.config.ports.dex_url()),
            ],
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = guard;
            if !this.wait_for_exchange(&client).await {
                tracing::warn!("Exchange web server did not respond, not opening window");
                return;
            }
            let exe = launch.exe(&this.processes);
            if let Err(e) = exe.run().await {
                tracing::warn!("Exchange window exited with error: {}", e);
            }
        });
        Ok(())
    }

    async fn wait_for_exchange(&self, client: &ExchangeClient) -> bool {
        for _ in 0..WINDOW_POLL_ATTEMPTS {
            if client.is_up().await {
                return true;
            }
            tokio::select! {
                _ = self.outer.cancelled() => return false,
                _ = tokio::time::sleep(WINDOW_POLL_INTERVAL) => {}
            }
        }
        false
    }
}
