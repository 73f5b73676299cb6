//! Bounded, lossy broadcast bus carrying [`Event`]s out to subscribers
//! (status dashboards, log shippers). Modeled on the workspace's
//! general-purpose agent message bus: a single bounded
//! `tokio::sync::broadcast` channel, a configurable policy for what a slow
//! subscriber should experience, and atomic counters a caller can poll
//! without holding a lock.

use orc_kernel::event::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// What a subscriber should see when it falls behind the bus's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LagPolicy {
    /// Surface the lag as an error from `recv`, forcing the caller to
    /// notice and resynchronize.
    Error,
    /// Silently skip the missed events and resume from the next one.
    SkipAndContinue,
}

#[derive(Debug, Default)]
pub struct BusMetrics {
    pub published: AtomicU64,
    pub dropped_no_subscribers: AtomicU64,
    pub lagged_events: AtomicU64,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BusRecvError {
    #[error("subscriber lagged behind by {0} events")]
    Lagged(u64),

    #[error("event bus closed")]
    Closed,
}

pub struct EventBus {
    sender: broadcast::Sender<Event>,
    policy: LagPolicy,
    pub metrics: Arc<BusMetrics>,
}

impl EventBus {
    pub fn new(capacity: usize, policy: LagPolicy) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            policy,
            metrics: Arc::new(BusMetrics::default()),
        }
    }

    pub fn publish(&self, event: Event) {
        self.metrics.published.fetch_add(1, Ordering::Relaxed);
        if self.sender.send(event).is_err() {
            self.metrics
                .dropped_no_subscribers
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            receiver: self.sender.subscribe(),
            policy: self.policy,
            metrics: self.metrics.clone(),
        }
    }
}

pub struct EventSubscription {
    receiver: broadcast::Receiver<Event>,
    policy: LagPolicy,
    metrics: Arc<BusMetrics>,
}

impl EventSubscription {
    /// Receive the next event. Under [`LagPolicy::SkipAndContinue`], a lag
    /// is absorbed transparently and the next available event is returned;
    /// under [`LagPolicy::Error`] it is surfaced once as
    /// [`BusRecvError::Lagged`].
    pub async fn recv(&mut self) -> Result<Event, BusRecvError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Closed) => return Err(BusRecvError::Closed),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.metrics.lagged_events.fetch_add(n, Ordering::Relaxed);
                    warn!(lagged = n, "event bus subscriber fell behind");
                    match self.policy {
                        LagPolicy::Error => return Err(BusRecvError::Lagged(n)),
                        LagPolicy::SkipAndContinue => continue,
                    }
                }
            }
        }
    }
}
