/*!
 * Finalization Guards
 *
 * Exactly-once release of raw OS handles.
 *
 * ## Design Principles
 *
 * 1. **One Winner**: explicit close and last-chance cleanup race on one
 *    atomic state word; only the side that leaves `Active` closes
 * 2. **No Retry**: a failed close is reported, never repeated
 * 3. **Off-Thread Safety Net**: last-chance cleanup runs on the tracker's
 *    background thread, never on the mutator
 * 4. **Observable**: guards emit lifecycle events to an optional collector
 *
 * ## Example
 *
 * ```ignore
 * let (guard, token) = FinalizationGuard::create(handle, closer, &tracker, GuardOptions::default())?;
 * // explicit path
 * if guard.cancel() {
 *     closer.close(handle)?;
 * }
 * // or: drop(token) and the cleaner closes it
 * ```
 */

mod finalization;
mod traits;

pub use finalization::{FinalizationGuard, GuardOptions, GuardState, ReleasePath};
pub use traits::{Guard, Observable};

use crate::core::types::RawHandle;

/// Guard metadata for observability
#[derive(Debug, Clone)]
pub struct GuardMetadata {
    pub resource_type: &'static str,
    pub creation_time: std::time::Instant,
    pub handle: Option<RawHandle>,
}

impl GuardMetadata {
    #[inline]
    pub fn new(resource_type: &'static str) -> Self {
        Self {
            resource_type,
            creation_time: std::time::Instant::now(),
            handle: None,
        }
    }

    #[inline]
    pub fn with_handle(mut self, handle: RawHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    #[inline]
    pub fn lifetime_micros(&self) -> u64 {
        self.creation_time.elapsed().as_micros() as u64
    }
}
