//! First-time initialization: install, wallet creation and state commit

use std::sync::Arc;

use eco_core::credentials::{PassphraseCrypter, Purpose};
use eco_core::store::keys;
use eco_protocol::{EcoState, ServiceId, SyncMode};
use rand::RngCore;

use super::{Eco, Launch};
use crate::error::{DaemonError, Result};
use crate::feed::ProgressReporter;

/// Length of a generated wallet seed
pub const SEED_LEN: usize = 32;

impl Eco {
    /// Initialize the install with the requested sync mode
    ///
    /// Progress is reported on `reporter`; the caller reports the returned
    /// error. Nothing is committed to the eco state unless every step
    /// succeeds, so a failed attempt can simply be repeated.
    pub async fn init(
        self: &Arc<Self>,
        sync_mode: u8,
        passphrase: &[u8],
        reporter: &ProgressReporter,
    ) -> Result<()> {
        let mode = SyncMode::from_u8(sync_mode)
            .filter(|m| *m != SyncMode::Uninitialized)
            .ok_or(DaemonError::UnknownSyncMode)?;
        let _guard = self
            .init_flag
            .try_acquire()
            .ok_or(DaemonError::InitInProgress)?;

        let current = self.eco_state().await;
        if current.sync_mode != SyncMode::Uninitialized {
            return Err(DaemonError::AlreadyInitialized);
        }

        let wallet_exists = self.paths.wallet_db().exists();
        if passphrase.is_empty() && !wallet_exists {
            return Err(DaemonError::NoPassphrase);
        }
        if !current.version.is_empty() && self.store.contains(keys::CRYPTER) {
            return Err(DaemonError::AlreadyInitialized);
        }

        tracing::info!("Initializing in {} mode", mode);
        let version = self.installer.install(reporter, &self.outer).await?;

        // The exchange window can fall back to asking the user for a browser
        if let Err(e) = self
            .installer
            .ensure_browser(&reporter.sub_reporter(0.80, 0.85), &self.outer)
            .await
        {
            tracing::warn!("No browser available for the exchange: {}", e);
        }

        let crypter = if passphrase.is_empty() {
            None
        } else {
            let crypter = PassphraseCrypter::generate(passphrase)?;
            self.store.put(keys::CRYPTER, crypter.params())?;
            self.credentials.store(Purpose::ExchangeInit, passphrase)?;
            Some(crypter)
        };

        if !wallet_exists {
            if let Some(crypter) = &crypter {
                reporter.report(0.85, "Initializing dcrwallet");
                self.create_wallet(&version, passphrase, crypter).await?;
            }
        }

        self.commit_state(EcoState {
            sync_mode: mode,
            wallet_exists: true,
            version,
        })
        .await?;
        reporter.report(1.0, "Upgrade complete");

        let this = Arc::clone(self);
        tokio::spawn(async move { this.start_services().await });
        Ok(())
    }

    /// Create the wallet by answering the wallet program's prompts
    ///
    /// The generated seed is kept encrypted with the passphrase crypter and
    /// the passphrase is cached to unlock the wallet on its first start.
    async fn create_wallet(
        &self,
        version: &str,
        passphrase: &[u8],
        crypter: &PassphraseCrypter,
    ) -> Result<()> {
        let svc = ServiceId::Dcrwallet;

        let scratch = tempfile::tempdir()?;
        let config_file = scratch.path().join("dcrwallet.conf");
        let mut contents = b"pass=".to_vec();
        contents.extend_from_slice(passphrase);
        contents.push(b'\n');
        tokio::fs::write(&config_file, contents).await?;

        let mut seed = [0u8; SEED_LEN];
        rand::thread_rng().fill_bytes(&mut seed);
        let sealed = crypter.encrypt(&seed)?;
        self.store.put(keys::WALLET_SEED, &hex::encode(sealed))?;

        // Private passphrase from the config file, no public passphrase,
        // then the seed we generated
        let answers = format!("y\nn\ny\n{}\n", hex::encode(seed));
        let launch = Launch {
            path: self.exe_path(version, svc),
            args: vec![
                format!("--appdata={}", self.paths.service_data_dir(svc).display()),
                "--create".to_string(),
                format!("--configfile={}", config_file.display()),
            ],
        };
        // The wallet echoes the seed back; keep it out of the log
        launch
            .exe(&self.processes)
            .with_stdin(answers)
            .with_sink(Arc::new(|_: &str| {}))
            .run()
            .await?;
        if self.outer.is_cancelled() {
            return Err(DaemonError::Cancelled);
        }

        self.credentials.store(Purpose::WalletUnlock, passphrase)?;
        tracing::info!("Created wallet");
        Ok(())
    }
}
