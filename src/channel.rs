//! Publish/subscribe channel for completed records

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error};

use crate::record::Record;

/// Error a subscriber may report while handling a record
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&Record) -> std::result::Result<(), SubscriberError> + Send + Sync>;

/// Identifier of a registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Publish point delivering each completed record to all current subscribers.
///
/// Delivery is isolated per subscriber: a handler returning `Err` is logged
/// and never prevents delivery to the remaining subscribers, nor does it
/// affect the exchange whose record is being published.
#[derive(Clone, Default)]
pub struct EventChannel {
    inner: Arc<ChannelInner>,
}

#[derive(Default)]
struct ChannelInner {
    subscribers: DashMap<u64, Handler>,
    next_id: AtomicU64,
}

impl EventChannel {
    /// Create a channel with no subscribers
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler invoked once per completed exchange
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Record) -> std::result::Result<(), SubscriberError> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.subscribers.insert(id, Arc::new(handler));
        debug!(subscriber = id, "record subscriber added");
        SubscriptionId(id)
    }

    /// Remove a subscriber; returns whether it was registered.
    ///
    /// Removal does not retroactively cancel a publication already in
    /// flight to this subscriber.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.inner.subscribers.remove(&id.0).is_some();
        if removed {
            debug!(subscriber = id.0, "record subscriber removed");
        }
        removed
    }

    /// Number of current subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    /// Deliver a record to every current subscriber.
    ///
    /// The subscriber set is snapshotted first so handlers are free to
    /// subscribe or unsubscribe while a publication is in progress.
    pub fn publish(&self, record: &Record) {
        let snapshot: Vec<(u64, Handler)> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();

        for (id, handler) in snapshot {
            if let Err(e) = handler(record) {
                error!(subscriber = id, error = %e, "record subscriber failed");
            }
        }
    }
}
