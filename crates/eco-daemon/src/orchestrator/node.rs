//! Full node: launch arguments and sync polling

use std::sync::Arc;

use eco_protocol::{Progress, ServiceId};
use tokio_util::sync::CancellationToken;

use super::{Eco, Launch, NodeSyncTracker};
use crate::error::{DaemonError, Result};

impl Eco {
    pub(super) async fn start_node(self: &Arc<Self>) -> Result<()> {
        let svc = ServiceId::Dcrd;
        let guard = self
            .flags
            .get(svc)
            .try_acquire()
            .ok_or(DaemonError::AlreadyRunning(svc))?;
        let version = self.installed_version().await?;
        let node_state = self.node_state().await;
        let ports = &self.config.ports;

        let launch = Launch {
            path: self.exe_path(&version, svc),
            args: vec![
                format!("--appdata={}", self.paths.service_data_dir(svc).display()),
                format!("--debuglevel={}", node_state.user_settings.debug_level),
                format!("--rpclisten={}", ports.node_rpc_addr()),
                format!("--rpcuser={}", node_state.rpc_user),
                format!("--rpcpass={}", node_state.rpc_pass),
                format!("--listen={}", ports.node_p2p_addr()),
            ],
        };

        let run = self.begin_run(svc).await;
        tokio::spawn(Arc::clone(self).track_node(run.clone()));
        tokio::spawn(Arc::clone(self).supervise(svc, guard, run, launch, true));
        Ok(())
    }

    /// Connect to the node and publish its sync progress until `run` ends
    async fn track_node(self: Arc<Self>, run: CancellationToken) {
        let svc = ServiceId::Dcrd;
        let endpoint = self.node_endpoint(&self.node_state().await);
        let Some(client) = self
            .connect(&run, svc, || self.rpc.node(&endpoint))
            .await
        else {
            return;
        };
        self.inner.write().await.node = Some(Arc::clone(&client));

        let mut tracker = NodeSyncTracker::default();
        loop {
            let delay = match client.blockchain_info().await {
                Ok(info) => {
                    let report = tracker.observe(&info);
                    let synced = report.synced;
                    self.feed.publish_progress(&Progress::new(
                        svc.as_str(),
                        report.status,
                        report.progress,
                    ));

                    if synced {
                        if !self.node_synced.is_open() {
                            tracing::info!("dcrd synced at block {}", info.blocks);
                            self.node_synced.open();
                        }
                        self.config.poll_synced
                    } else {
                        self.config.poll_syncing
                    }
                }
                Err(e) => {
                    tracing::warn!(service = %svc, "Error getting blockchain info: {}", e);
                    self.config.poll_syncing
                }
            };

            tokio::select! {
                _ = run.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!("dcrd sync polling stopped");
    }
}
