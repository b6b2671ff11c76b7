//! Sync progress arithmetic

use crate::rpc::BlockchainInfo;

/// Status text once the node has caught up
pub const FULLY_SYNCED: &str = "Fully synced";

/// One node sync observation turned into a report
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub synced: bool,
    pub progress: f64,
    pub status: String,
}

/// Tracks node sync progress relative to where polling started
#[derive(Debug, Default)]
pub struct NodeSyncTracker {
    start_height: Option<i64>,
}

impl NodeSyncTracker {
    pub fn observe(&mut self, info: &BlockchainInfo) -> SyncReport {
        let start = *self.start_height.get_or_insert(info.blocks);
        let target = info.target_height();
        let to_go = target - info.blocks;

        if !info.initialblockdownload && to_go <= 1 {
            return SyncReport {
                synced: true,
                progress: 1.0,
                status: FULLY_SYNCED.to_string(),
            };
        }

        let span = target - start;
        let progress = if span > 0 {
            1.0 - to_go as f64 / span as f64
        } else {
            0.0
        };
        SyncReport {
            synced: false,
            progress: progress.clamp(0.0, 1.0),
            status: format!("Syncing blockchain at block {}", info.blocks),
        }
    }
}

/// Wallet progress against the node's best known height
pub fn wallet_progress(wallet_blocks: i64, node: &BlockchainInfo) -> f64 {
    let target = node.target_height();
    if wallet_blocks >= target {
        1.0
    } else if target > 0 {
        (wallet_blocks as f64 / target as f64).clamp(0.0, 1.0)
    } else {
        0.0
    }
}
