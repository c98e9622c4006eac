/*!
 * Event System
 * Strongly-typed lifecycle events for guarded handles
 */

use crate::core::guard::ReleasePath;
use crate::core::types::{RawHandle, RegistrationId};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Event severity for filtering and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Severity {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
    Critical = 5,
}

/// Event category for organization and querying
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Category {
    Handle,
    Socket,
    Key,
    Cleaner,
}

/// Unified event type - all lifecycle events flow through this
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic timestamp (nanoseconds since first event)
    pub timestamp_ns: u64,
    pub severity: Severity,
    pub category: Category,
    /// Guarded handle if applicable
    pub handle: Option<RawHandle>,
    pub payload: Payload,
}

/// Event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    GuardRegistered {
        registration: RegistrationId,
        resource_type: String,
    },
    GuardCancelled {
        registration: RegistrationId,
    },
    HandleReleased {
        path: ReleasePath,
        lifetime_micros: u64,
    },
    CloseFailed {
        path: ReleasePath,
        code: i32,
        message: String,
    },
    SlowClose {
        duration_ms: u64,
        threshold_ms: u64,
    },
    SharedAllocationReleased {
        provider: RawHandle,
        key: RawHandle,
    },
    CleanupPanicked {
        registration: RegistrationId,
    },
}

impl Event {
    #[inline]
    pub fn new(severity: Severity, category: Category, payload: Payload) -> Self {
        Self {
            timestamp_ns: Self::now_ns(),
            severity,
            category,
            handle: None,
            payload,
        }
    }

    #[inline]
    pub fn with_handle(mut self, handle: RawHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    #[inline]
    fn now_ns() -> u64 {
        static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
        let start = START.get_or_init(Instant::now);
        start.elapsed().as_nanos() as u64
    }

    #[inline]
    pub fn age(&self) -> Duration {
        Duration::from_nanos(Self::now_ns().saturating_sub(self.timestamp_ns))
    }

    #[inline]
    pub fn matches(&self, filter: &EventFilter) -> bool {
        if let Some(min_severity) = filter.min_severity {
            if self.severity < min_severity {
                return false;
            }
        }

        if let Some(category) = filter.category {
            if self.category != category {
                return false;
            }
        }

        if let Some(handle) = filter.handle {
            if self.handle != Some(handle) {
                return false;
            }
        }

        true
    }
}

/// Event filter for subscribers
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub min_severity: Option<Severity>,
    pub category: Option<Category>,
    pub handle: Option<RawHandle>,
}

impl EventFilter {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn severity(mut self, severity: Severity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    #[inline]
    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    #[inline]
    pub fn handle(mut self, handle: RawHandle) -> Self {
        self.handle = Some(handle);
        self
    }
}
