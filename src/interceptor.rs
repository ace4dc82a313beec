//! Process-wide interception controller

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::channel::{EventChannel, SubscriberError, SubscriptionId};
use crate::config::CaptureConfig;
use crate::exchange::Exchange;
use crate::record::{Record, RequestHead};

/// Owned switch controlling whether new requests are tapped.
///
/// The handle is cheap to clone and shared between the instrumented client
/// and the application. `enable`/`disable` are idempotent and only affect
/// exchanges begun afterwards: a request in flight keeps whichever behavior
/// was active when it was created. Disabling never clears subscribers.
#[derive(Clone, Default)]
pub struct Interceptor {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    enabled: AtomicBool,
    channel: EventChannel,
}

impl Interceptor {
    /// Create a controller in the disabled state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a controller honoring `start_enabled` from configuration
    #[must_use]
    pub fn from_config(config: &CaptureConfig) -> Self {
        let interceptor = Self::new();
        if config.start_enabled {
            interceptor.enable();
        }
        interceptor
    }

    /// Install taps on all future requests. Idempotent.
    pub fn enable(&self) {
        if !self.shared.enabled.swap(true, Ordering::SeqCst) {
            info!("capture enabled");
        }
    }

    /// Stop tapping future requests. Idempotent; in-flight captures and
    /// the subscriber set are untouched.
    pub fn disable(&self) {
        if self.shared.enabled.swap(false, Ordering::SeqCst) {
            info!("capture disabled");
        }
    }

    /// Whether future requests will be tapped
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    /// Register a handler receiving one [`Record`] per completed exchange
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&Record) -> std::result::Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.shared.channel.subscribe(handler)
    }

    /// Remove a subscriber; returns whether it was registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.channel.unsubscribe(id)
    }

    /// Number of current subscribers
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.channel.subscriber_count()
    }

    /// Open an exchange for a request being sent now.
    ///
    /// Returns `None` while disabled — the zero-overhead path with no taps
    /// installed. The returned handle stays valid across a later
    /// `disable()`, so the exchange completes under the behavior it was
    /// created with.
    #[must_use]
    pub fn begin_exchange(&self, request: RequestHead) -> Option<Exchange> {
        if !self.is_enabled() {
            return None;
        }
        Some(Exchange::new(request, self.shared.channel.clone()))
    }
}
