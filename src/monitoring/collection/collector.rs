/*!
 * Lifecycle Collector
 * Central sink for guard events: counters plus live subscribers
 */

use crate::core::guard::ReleasePath;
use crate::monitoring::events::{Event, EventFilter, Payload};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Point-in-time view of lifecycle counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub registered: u64,
    pub cancelled: u64,
    pub released_explicit: u64,
    pub released_last_chance: u64,
    pub close_failures: u64,
    pub slow_closes: u64,
    pub shared_released: u64,
    pub cleanup_panics: u64,
}

impl MetricsSnapshot {
    /// Total handles released by either path
    #[inline]
    pub fn released(&self) -> u64 {
        self.released_explicit + self.released_last_chance
    }

    /// Registered guards not yet released
    #[inline]
    pub fn outstanding(&self) -> u64 {
        self.registered.saturating_sub(self.released() + self.close_failures)
    }
}

#[derive(Default)]
struct Counters {
    registered: AtomicU64,
    cancelled: AtomicU64,
    released_explicit: AtomicU64,
    released_last_chance: AtomicU64,
    close_failures: AtomicU64,
    slow_closes: AtomicU64,
    shared_released: AtomicU64,
    cleanup_panics: AtomicU64,
}

struct Subscription {
    filter: EventFilter,
    tx: flume::Sender<Event>,
}

/// Unified lifecycle collector
#[derive(Clone, Default)]
pub struct Collector {
    counters: Arc<Counters>,
    subscribers: Arc<Mutex<Vec<Subscription>>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an event (primary API)
    #[inline]
    pub fn emit(&self, event: Event) {
        self.update_metrics(&event);

        let mut subscribers = self.subscribers.lock();
        if subscribers.is_empty() {
            return;
        }
        // Disconnected subscribers are dropped on the next emit
        subscribers.retain(|sub| {
            if !event.matches(&sub.filter) {
                return !sub.tx.is_disconnected();
            }
            sub.tx.send(event.clone()).is_ok()
        });
    }

    /// Subscribe to every event
    pub fn subscribe(&self) -> flume::Receiver<Event> {
        self.subscribe_filtered(EventFilter::new())
    }

    /// Subscribe to events matching `filter`
    pub fn subscribe_filtered(&self, filter: EventFilter) -> flume::Receiver<Event> {
        let (tx, rx) = flume::unbounded();
        self.subscribers.lock().push(Subscription { filter, tx });
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Get metrics snapshot
    pub fn metrics(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            registered: c.registered.load(Ordering::Relaxed),
            cancelled: c.cancelled.load(Ordering::Relaxed),
            released_explicit: c.released_explicit.load(Ordering::Relaxed),
            released_last_chance: c.released_last_chance.load(Ordering::Relaxed),
            close_failures: c.close_failures.load(Ordering::Relaxed),
            slow_closes: c.slow_closes.load(Ordering::Relaxed),
            shared_released: c.shared_released.load(Ordering::Relaxed),
            cleanup_panics: c.cleanup_panics.load(Ordering::Relaxed),
        }
    }

    fn update_metrics(&self, event: &Event) {
        let c = &self.counters;
        let counter = match &event.payload {
            Payload::GuardRegistered { .. } => &c.registered,
            Payload::GuardCancelled { .. } => &c.cancelled,
            Payload::HandleReleased {
                path: ReleasePath::Explicit,
                ..
            } => &c.released_explicit,
            Payload::HandleReleased {
                path: ReleasePath::LastChance,
                ..
            } => &c.released_last_chance,
            Payload::CloseFailed { .. } => &c.close_failures,
            Payload::SlowClose { .. } => &c.slow_closes,
            Payload::SharedAllocationReleased { .. } => &c.shared_released,
            Payload::CleanupPanicked { .. } => &c.cleanup_panics,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
