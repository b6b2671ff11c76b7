//! Control command passthrough to the wallet or node

use std::path::Path;
use std::process::Output;

use eco_protocol::ServiceId;
use tokio::process::Command;

use super::Eco;
use crate::error::{DaemonError, Result};

/// Split a command line on spaces, honouring double quotes
pub fn tokenize(cmd: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b' ')
        .has_headers(false)
        .flexible(true)
        .from_reader(cmd.trim().as_bytes());

    match reader.records().next() {
        None => Ok(Vec::new()),
        Some(record) => Ok(record
            .map_err(|e| DaemonError::InvalidCommand(e.to_string()))?
            .iter()
            .filter(|field| !field.is_empty())
            .map(str::to_string)
            .collect()),
    }
}

impl Eco {
    /// Run a control command, trying the wallet first and then the node
    ///
    /// Returns the command's output. A failure against the node carries the
    /// combined output in the error.
    pub async fn ctl(&self, cmd: &str) -> Result<String> {
        let tokens = tokenize(cmd)?;
        match tokens.first().map(String::as_str) {
            None => return Err(DaemonError::NoCommand),
            Some("stop") => return Err(DaemonError::NotAllowed),
            Some(_) => {}
        }
        let version = self.installed_version().await?;

        let exe = self
            .paths
            .program_dir(&version)
            .join(self.platform.exe_name("dcrctl"));
        let node_state = self.node_state().await;
        let ports = &self.config.ports;

        let mut wallet_args = vec![
            format!("--rpcuser={}", node_state.rpc_user),
            format!("--rpcpass={}", node_state.rpc_pass),
            format!("--rpcserver={}", ports.wallet_rpc_addr()),
            format!("--rpccert={}", self.paths.wallet_rpc_cert().display()),
            "--wallet".to_string(),
        ];
        wallet_args.extend(tokens.iter().cloned());

        match self.run_ctl(&exe, &wallet_args).await {
            Ok(out) if out.status.success() => {
                return Ok(String::from_utf8_lossy(&out.stdout).into_owned())
            }
            Ok(out) => tracing::debug!(
                "{} rejected {:?} ({}), trying {}",
                ServiceId::Dcrwallet,
                tokens[0],
                out.status,
                ServiceId::Dcrd
            ),
            Err(e) => tracing::debug!("dcrctl wallet call failed: {}", e),
        }

        let mut node_args = vec![
            format!("--rpcuser={}", node_state.rpc_user),
            format!("--rpcpass={}", node_state.rpc_pass),
            format!("--rpcserver={}", ports.node_rpc_addr()),
            format!("--rpccert={}", self.paths.node_rpc_cert().display()),
        ];
        node_args.extend(tokens);

        let out = self.run_ctl(&exe, &node_args).await?;
        let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&out.stderr));
        if out.status.success() {
            Ok(combined)
        } else {
            Err(DaemonError::CtlFailed {
                reason: out.status.to_string(),
                output: combined.trim().to_string(),
            })
        }
    }

    async fn run_ctl(&self, exe: &Path, args: &[String]) -> Result<Output> {
        let output = Command::new(exe).args(args).kill_on_drop(true).output();
        match tokio::time::timeout(self.config.ctl_timeout, output).await {
            Ok(result) => result.map_err(|source| DaemonError::Spawn {
                path: exe.to_path_buf(),
                source,
            }),
            Err(_) => Err(DaemonError::CtlFailed {
                reason: "dcrctl timed out".to_string(),
                output: format!("no response after {:?}", self.config.ctl_timeout),
            }),
        }
    }
}
