//! Progress, price and cache-hit notifications for fetches and batches.
//!
//! Notifications are awaited in place, so a slow observer applies backpressure to the unit
//! of work that produced the event.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Receives batch events. Every method defaults to a no-op.
#[async_trait]
pub trait PricingObserver: Send + Sync {
    /// A lookup was answered from the cache (including a cached "unavailable").
    async fn on_cache_hit(&self) {}

    /// A batch unit resolved. Always delivered before the matching `on_progress`.
    async fn on_price(&self, _instance_type: &str, _price: Option<f64>) {}

    async fn on_progress(&self, _completed: usize, _total: usize) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

#[async_trait]
impl PricingObserver for NoopObserver {}

/// Event form of the [`PricingObserver`] callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    CacheHit,
    Price {
        instance_type: String,
        price: Option<f64>,
    },
    Progress {
        completed: usize,
        total: usize,
    },
}

/// Forwards events into a bounded channel.
///
/// A full channel suspends the producing unit. A dropped receiver is ignored: the batch
/// keeps running and its result is still returned.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::Sender<BatchEvent>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::Sender<BatchEvent>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving half of a channel with room for `capacity` events.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<BatchEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    async fn send(&self, event: BatchEvent) {
        if self.tx.send(event).await.is_err() {
            log::trace!("Batch event receiver dropped");
        }
    }
}

#[async_trait]
impl PricingObserver for ChannelObserver {
    async fn on_cache_hit(&self) {
        self.send(BatchEvent::CacheHit).await;
    }

    async fn on_price(&self, instance_type: &str, price: Option<f64>) {
        self.send(BatchEvent::Price {
            instance_type: instance_type.to_string(),
            price,
        })
        .await;
    }

    async fn on_progress(&self, completed: usize, total: usize) {
        self.send(BatchEvent::Progress { completed, total }).await;
    }
}
