use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the client connector
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    reconnect_count: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent.load(Ordering::Relaxed)
    }

    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }
}

/// Counters maintained by the router control loop
#[derive(Debug, Default)]
pub struct AtomicHubMetrics {
    messages_routed: AtomicU64,
    deliveries: AtomicU64,
    dropped_deliveries: AtomicU64,
    marshal_failures: AtomicU64,
    registrations: AtomicU64,
    unregistrations: AtomicU64,
}

/// Snapshot of [`AtomicHubMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubMetrics {
    pub messages_routed: u64,
    pub deliveries: u64,
    pub dropped_deliveries: u64,
    pub marshal_failures: u64,
    pub registrations: u64,
    pub unregistrations: u64,
}

impl AtomicHubMetrics {
    pub(crate) fn record_routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.dropped_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_marshal_failure(&self) {
        self.marshal_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unregistration(&self) {
        self.unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HubMetrics {
        HubMetrics {
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            dropped_deliveries: self.dropped_deliveries.load(Ordering::Relaxed),
            marshal_failures: self.marshal_failures.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            unregistrations: self.unregistrations.load(Ordering::Relaxed),
        }
    }
}
