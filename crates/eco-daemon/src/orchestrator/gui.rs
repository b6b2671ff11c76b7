//! GUI wallet launch

use std::path::Path;
use std::sync::Arc;

use eco_protocol::{ServiceId, SyncMode};
use serde_json::json;

use super::{Eco, Launch};
use crate::error::{DaemonError, Result};

/// Write the GUI wallet's first-run config unless one exists
///
/// The defaults skip the language picker and tutorial and start the wallet
/// in advanced daemon mode, so it attaches to our services instead of
/// launching its own. Returns whether a file was written.
pub async fn write_default_gui_config(path: &Path) -> Result<bool> {
    if tokio::fs::try_exists(path).await? {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let config = json!({
        "daemon_start_advanced": true,
        "set_language": false,
        "show_tutorial": false,
        "locale": "en",
        "network": "mainnet",
        "theme": "theme-dark",
        "ui_animations": true,
    });
    tokio::fs::write(path, serde_json::to_vec_pretty(&config)?).await?;
    tracing::info!("Wrote default Decrediton config to {:?}", path);
    Ok(true)
}

impl Eco {
    pub(super) async fn start_gui(self: &Arc<Self>) -> Result<()> {
        let svc = ServiceId::Decrediton;
        let guard = self
            .flags
            .get(svc)
            .try_acquire()
            .ok_or(DaemonError::AlreadyRunning(svc))?;
        let state = self.eco_state().await;
        let version = self.installed_version().await?;

        if let Some(path) = self.platform.gui_config_path() {
            write_default_gui_config(&path).await?;
        }

        let node_state = self.node_state().await;
        let mut args = vec![
            "--advanced".to_string(),
            format!("--rpcuser={}", node_state.rpc_user),
            format!("--rpcpass={}", node_state.rpc_pass),
            format!("--rpccert={}", self.paths.node_rpc_cert().display()),
            format!("--rpcconnect=localhost:{}", self.config.ports.node_rpc),
            format!(
                "--custombinpath={}",
                self.paths.program_dir(&version).display()
            ),
        ];
        if state.sync_mode == SyncMode::Spv {
            args.push("--spv".to_string());
        }

        let launch = Launch {
            path: self.exe_path(&version, svc),
            args,
        };
        let run = self.begin_run(svc).await;
        // Closing the GUI ends it; no restart
        tokio::spawn(Arc::clone(self).supervise(svc, guard, run, launch, false));
        Ok(())
    }
}
