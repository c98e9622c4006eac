/*!
 * Shared Key Allocation
 *
 * One provider context plus one key handle, referenced by both facets of
 * a key pair. Each facet holds one hold; the last hold dropped destroys
 * the key and then releases the provider.
 */

use crate::core::errors::NativeError;
use crate::core::types::RawHandle;
use crate::monitoring::{Category, Collector, Event, Payload, Severity};
use crate::native::NativeCloser;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Platform operations on a key allocation
pub trait KeyBackend: Send + Sync {
    /// Destroy the key handle
    fn destroy_key(&self, key: RawHandle) -> Result<(), NativeError>;

    /// Release the provider context the key lives in
    fn release_provider(&self, provider: RawHandle) -> Result<(), NativeError>;

    fn name(&self) -> &'static str {
        "key-backend"
    }
}

/// Provider and key handle shared by the facets of one key pair
pub struct NativeKeyHandles {
    provider: RawHandle,
    key: RawHandle,
    holders: AtomicUsize,
    released: AtomicBool,
    backend: Arc<dyn KeyBackend>,
    collector: Option<Arc<Collector>>,
}

impl NativeKeyHandles {
    pub(crate) fn new(
        provider: RawHandle,
        key: RawHandle,
        holders: usize,
        backend: Arc<dyn KeyBackend>,
        collector: Option<Arc<Collector>>,
    ) -> Self {
        Self {
            provider,
            key,
            holders: AtomicUsize::new(holders),
            released: AtomicBool::new(false),
            backend,
            collector,
        }
    }

    #[inline]
    pub fn provider(&self) -> RawHandle {
        self.provider
    }

    #[inline]
    pub fn key(&self) -> RawHandle {
        self.key
    }

    /// Facets that have not released their hold yet
    #[inline]
    pub fn holders(&self) -> usize {
        self.holders.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Drop one hold; the last one releases the allocation
    ///
    /// Returns `Ok(true)` if this call released the allocation. A hold
    /// dropped after the count reached zero is ignored. The provider is
    /// released even when destroying the key fails; the first failure is
    /// returned.
    pub fn release_hold(&self) -> Result<bool, NativeError> {
        let previous = self
            .holders
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));

        match previous {
            Ok(1) => {}
            Ok(_) => return Ok(false),
            Err(_) => {
                log::warn!("Extra hold released on key {}", self.key);
                return Ok(false);
            }
        }

        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }

        let key_result = self.backend.destroy_key(self.key);
        let provider_result = self.backend.release_provider(self.provider);

        if let Err(ref e) = key_result {
            log::error!("Destroying key {} failed: {}", self.key, e);
        }
        if let Err(ref e) = provider_result {
            log::error!("Releasing provider {} failed: {}", self.provider, e);
        }

        if let Some(ref collector) = self.collector {
            let severity = if key_result.is_ok() && provider_result.is_ok() {
                Severity::Debug
            } else {
                Severity::Error
            };
            collector.emit(
                Event::new(
                    severity,
                    Category::Key,
                    Payload::SharedAllocationReleased {
                        provider: self.provider,
                        key: self.key,
                    },
                )
                .with_handle(self.key),
            );
        }

        key_result.and(provider_result).map(|()| true)
    }
}

impl fmt::Debug for NativeKeyHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeKeyHandles")
            .field("provider", &self.provider)
            .field("key", &self.key)
            .field("holders", &self.holders())
            .field("released", &self.is_released())
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Guard closer for one facet: drops that facet's hold
pub(crate) struct FacetCloser {
    shared: Arc<NativeKeyHandles>,
}

impl FacetCloser {
    pub(crate) fn new(shared: Arc<NativeKeyHandles>) -> Self {
        Self { shared }
    }
}

impl NativeCloser for FacetCloser {
    fn close(&self, _handle: RawHandle) -> Result<(), NativeError> {
        self.shared.release_hold().map(|_| ())
    }

    fn name(&self) -> &'static str {
        "key-facet"
    }
}
