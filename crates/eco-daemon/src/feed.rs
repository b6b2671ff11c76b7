//! Event bus and progress reporting
//!
//! The [`Feed`] fans out [`FeedMessage`]s to every subscriber. Keyed
//! messages are also cached, last value per key, and replayed to new
//! subscribers so they start from the current state. Delivery never blocks
//! the publisher: a subscriber whose buffer is full misses that message.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use eco_protocol::{FeedMessage, Progress, ServiceStatus};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Live-update headroom of each subscriber, on top of the replayed cache
pub const SUBSCRIBER_BUFFER: usize = 64;

/// Cache key for a service's sync progress
pub fn sync_key(service: &str) -> String {
    format!("sync#{}", service)
}

/// Cache key for a service's run status
pub fn status_key(service: &str) -> String {
    format!("status#{}", service)
}

#[derive(Default)]
struct FeedInner {
    cache: BTreeMap<String, FeedMessage>,
    subscribers: HashMap<Uuid, mpsc::Sender<FeedMessage>>,
}

/// Fan-out of feed messages with a last-value cache
#[derive(Default)]
pub struct Feed {
    inner: Mutex<FeedInner>,
}

impl Feed {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Cache `msg` under `key` (unless empty) and offer it to every subscriber
    pub fn publish(&self, key: &str, msg: FeedMessage) {
        let mut inner = self.inner.lock();
        if !key.is_empty() {
            inner.cache.insert(key.to_string(), msg.clone());
        }

        for (id, tx) in &inner.subscribers {
            match tx.try_send(msg.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("Feed subscriber {} is full, dropping {:?} message", id, msg.kind);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::trace!("Feed subscriber {} is gone", id);
                }
            }
        }
    }

    /// Publish a sync progress update
    pub fn publish_progress(&self, progress: &Progress) {
        match FeedMessage::sync_update(progress) {
            Ok(msg) => self.publish(&sync_key(&progress.service), msg),
            Err(e) => tracing::error!("Failed to encode progress for {}: {}", progress.service, e),
        }
    }

    /// Publish a service status change
    pub fn publish_status(&self, status: &ServiceStatus) {
        match FeedMessage::service_status(status) {
            Ok(msg) => self.publish(&status_key(status.service.as_str()), msg),
            Err(e) => tracing::error!("Failed to encode status for {}: {}", status.service, e),
        }
    }

    /// Register a subscriber, preloaded with every cached message
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut inner = self.inner.lock();
        let (tx, rx) = mpsc::channel(inner.cache.len() + SUBSCRIBER_BUFFER);
        for msg in inner.cache.values() {
            // Capacity covers the whole cache
            let _ = tx.try_send(msg.clone());
        }

        let id = Uuid::new_v4();
        inner.subscribers.insert(id, tx);
        tracing::debug!("Feed subscriber {} registered ({} total)", id, inner.subscribers.len());

        Subscription {
            id,
            rx,
            feed: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: &Uuid) {
        if self.inner.lock().subscribers.remove(id).is_some() {
            tracing::debug!("Feed subscriber {} removed", id);
        }
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// A registration on the [`Feed`]; unsubscribes when dropped
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<FeedMessage>,
    feed: Weak<Feed>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Next message, or None once the feed is gone
    pub async fn recv(&mut self) -> Option<FeedMessage> {
        self.rx.recv().await
    }

    /// Next message if one is already buffered
    pub fn try_recv(&mut self) -> Option<FeedMessage> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feed) = self.feed.upgrade() {
            feed.unsubscribe(&self.id);
        }
    }
}

/// Destination of a [`ProgressReporter`]
pub trait ProgressSink: Send + Sync {
    /// Deliver one report; false means the destination is gone
    fn deliver(&self, progress: Progress) -> bool;
}

impl ProgressSink for mpsc::UnboundedSender<Progress> {
    fn deliver(&self, progress: Progress) -> bool {
        self.send(progress).is_ok()
    }
}

impl ProgressSink for mpsc::Sender<Progress> {
    fn deliver(&self, progress: Progress) -> bool {
        self.try_send(progress).is_ok()
    }
}

/// Turns `(fraction, status)` pairs into [`Progress`] reports
///
/// All reporters derived from one root share a failure flag. After a failure
/// is reported, or the sink refuses a delivery, every further report is
/// dropped. A sub-reporter maps its own `[0, 1]` onto a slice of its
/// parent's range.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn ProgressSink>,
    service: String,
    start: f64,
    end: f64,
    failed: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub fn new(service: impl Into<String>, sink: Arc<dyn ProgressSink>) -> Self {
        Self {
            sink,
            service: service.into(),
            start: 0.0,
            end: 1.0,
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn absolute(&self, fraction: f64) -> f64 {
        self.start + fraction.clamp(0.0, 1.0) * (self.end - self.start)
    }

    /// Report progress within this reporter's range
    pub fn report(&self, fraction: f64, status: impl Into<String>) {
        if self.is_failed() {
            return;
        }
        let progress = Progress::new(&self.service, status, self.absolute(fraction));
        if !self.sink.deliver(progress) {
            tracing::debug!("Progress sink for {} closed", self.service);
            self.failed.store(true, Ordering::SeqCst);
        }
    }

    /// Report a hard failure; later reports are suppressed
    pub fn fail(&self, err: impl Display) {
        if self.failed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.sink.deliver(Progress::failed(&self.service, "", err.to_string()));
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Reporter for the `[start, end]` slice of this reporter's range
    pub fn sub_reporter(&self, start: f64, end: f64) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
            service: self.service.clone(),
            start: self.absolute(start),
            end: self.absolute(end),
            failed: Arc::clone(&self.failed),
        }
    }
}
