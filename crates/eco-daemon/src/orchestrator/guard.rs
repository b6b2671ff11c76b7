//! Run exclusivity and one-shot gates

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Compare-and-swap exclusivity flag for one service
#[derive(Debug, Default)]
pub struct RunFlag {
    held: AtomicBool,
}

impl RunFlag {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Take the flag, or `None` if someone else holds it
    ///
    /// The flag is released when the returned guard drops, so only the
    /// acquirer can ever release it.
    pub fn try_acquire(self: &Arc<Self>) -> Option<RunGuard> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                flag: Arc::clone(self),
            })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Proof of holding a [`RunFlag`]
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<RunFlag>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.held.store(false, Ordering::Release);
    }
}

/// A gate that opens exactly once and stays open
#[derive(Debug, Clone, Default)]
pub struct Gate {
    token: CancellationToken,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the gate; later calls are no-ops
    pub fn open(&self) {
        self.token.cancel();
    }

    pub fn is_open(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the gate is open
    pub async fn wait(&self) {
        self.token.cancelled().await
    }
}
