/*!
 * Handle Owner Registry
 *
 * Associates each owner (socket descriptor, key facet, ...) with its
 * finalization guard. Owners call `register` once they hold a valid raw
 * handle, and `unregister` immediately before their own native close so
 * the close can never be duplicated by an in-flight last-chance cleanup.
 */

use crate::core::config::FailurePolicy;
use crate::core::errors::{HandleError, HandleResult};
use crate::core::guard::{FinalizationGuard, GuardOptions, GuardState};
use crate::core::types::RawHandle;
use crate::monitoring::{Category, Collector};
use crate::native::NativeCloser;
use crate::reachability::{Cleaner, Reachability, ReachabilityTracker};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Language-level object owning one raw handle
pub trait HandleOwner: Send + Sync {
    /// The handle this owner is responsible for
    fn raw_handle(&self) -> RawHandle;

    /// Where the registry keeps this owner's guard
    fn cleanup_slot(&self) -> &CleanupSlot;
}

struct Registered {
    guard: FinalizationGuard,
    // Dropped together with the owner: that drop is the unreachability signal
    _reachability: Reachability,
}

/// Per-owner storage for its finalization guard
///
/// Embedded in the owner so the reachability token lives and dies with
/// it.
#[derive(Default)]
pub struct CleanupSlot {
    inner: Mutex<Option<Registered>>,
    // Set once an unguarded handle has been closed directly
    closed_unguarded: AtomicBool,
}

impl CleanupSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// The currently registered guard, if any
    pub fn guard(&self) -> Option<FinalizationGuard> {
        self.inner.lock().as_ref().map(|r| r.guard.clone())
    }

    pub fn is_registered(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Guard state, `None` if never registered
    pub fn state(&self) -> Option<GuardState> {
        self.inner.lock().as_ref().map(|r| r.guard.state())
    }

    fn install(&self, registered: Registered) -> Option<Registered> {
        self.inner.lock().replace(registered)
    }

    /// Claim the direct close of a handle that never had a guard
    fn claim_unguarded_close(&self) -> bool {
        !self.closed_unguarded.swap(true, Ordering::AcqRel)
    }
}

impl fmt::Debug for CleanupSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupSlot")
            .field("guard", &self.guard())
            .finish()
    }
}

/// Outcome of `unregister`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistered {
    /// Nothing was registered (absent owner, invalid handle, never registered)
    NotRegistered,
    /// This call cancelled the guard; the caller owns the close
    Cancelled,
    /// Already released by an earlier cancel or by last-chance cleanup
    AlreadyReleased,
}

impl Unregistered {
    /// Whether the caller should perform the native close itself
    #[inline]
    pub fn must_close(self) -> bool {
        !matches!(self, Unregistered::AlreadyReleased)
    }
}

/// Registers and cancels finalization guards for owners
#[derive(Clone)]
pub struct HandleOwnerRegistry {
    tracker: Arc<dyn ReachabilityTracker>,
    closer: Arc<dyn NativeCloser>,
    options: GuardOptions,
}

impl HandleOwnerRegistry {
    pub fn new(tracker: Arc<dyn ReachabilityTracker>, closer: Arc<dyn NativeCloser>) -> Self {
        Self {
            tracker,
            closer,
            options: GuardOptions::default(),
        }
    }

    /// Registry on a cleaner, inheriting its failure policy and slow-close threshold
    pub fn with_cleaner(cleaner: Arc<Cleaner>, closer: Arc<dyn NativeCloser>) -> Self {
        let options = GuardOptions::from_config(cleaner.config());
        Self {
            tracker: cleaner,
            closer,
            options,
        }
    }

    /// Registry on the process-wide cleaner
    pub fn global(closer: Arc<dyn NativeCloser>) -> HandleResult<Self> {
        Ok(Self::with_cleaner(Cleaner::global()?, closer))
    }

    #[inline]
    pub fn with_collector(mut self, collector: Arc<Collector>) -> Self {
        self.options = self.options.with_collector(collector);
        self
    }

    #[inline]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.options = self.options.with_failure_policy(policy);
        self
    }

    #[inline]
    pub fn with_resource_type(mut self, resource_type: &'static str, category: Category) -> Self {
        self.options = self.options.with_resource_type(resource_type, category);
        self
    }

    /// Same tracker and options, different closer
    pub fn derive(&self, closer: Arc<dyn NativeCloser>) -> Self {
        Self {
            tracker: Arc::clone(&self.tracker),
            closer,
            options: self.options.clone(),
        }
    }

    #[inline]
    pub fn closer(&self) -> &Arc<dyn NativeCloser> {
        &self.closer
    }

    #[inline]
    pub fn tracker(&self) -> &Arc<dyn ReachabilityTracker> {
        &self.tracker
    }

    #[inline]
    pub fn options(&self) -> &GuardOptions {
        &self.options
    }

    /// Protect `owner`'s handle with a new finalization guard
    ///
    /// Returns `Ok(false)` without registering anything for an absent owner
    /// or an owner holding the invalid sentinel. Registering an owner that
    /// already has a guard cancels the previous one.
    pub fn register<O>(&self, owner: Option<&O>) -> HandleResult<bool>
    where
        O: HandleOwner + ?Sized,
    {
        let Some(owner) = owner else {
            return Ok(false);
        };

        let handle = owner.raw_handle();
        if !handle.is_valid() {
            return Ok(false);
        }

        let (guard, reachability) = FinalizationGuard::create(
            handle,
            Arc::clone(&self.closer),
            &self.tracker,
            self.options.clone(),
        )?;

        log::trace!(
            "Registered {} handle {} (registration {})",
            self.options.resource_type,
            handle,
            guard.registration()
        );

        let previous = owner.cleanup_slot().install(Registered {
            guard,
            _reachability: reachability,
        });
        if let Some(previous) = previous {
            previous.guard.cancel();
        }
        Ok(true)
    }

    /// Cancel `owner`'s last-chance cleanup
    ///
    /// Safe for absent owners, owners never registered, and owners whose
    /// cleanup already ran. Call this before the owner's own native close.
    pub fn unregister<O>(&self, owner: Option<&O>) -> Unregistered
    where
        O: HandleOwner + ?Sized,
    {
        let Some(guard) = owner.and_then(|o| o.cleanup_slot().guard()) else {
            return Unregistered::NotRegistered;
        };

        if guard.cancel() {
            Unregistered::Cancelled
        } else {
            Unregistered::AlreadyReleased
        }
    }

    /// Explicit close path: unregister, then one native close
    ///
    /// Returns `Ok(true)` if this call closed the handle, `Ok(false)` if
    /// there was nothing to close or an earlier close (explicit or
    /// last-chance) already did. An owner that was never registered is
    /// closed at most once as well.
    pub fn close_owner<O>(&self, owner: &O) -> HandleResult<bool>
    where
        O: HandleOwner + ?Sized,
    {
        if let Some(guard) = owner.cleanup_slot().guard() {
            return guard.close_explicitly();
        }

        let handle = owner.raw_handle();
        if !handle.is_valid() || !owner.cleanup_slot().claim_unguarded_close() {
            return Ok(false);
        }
        self.closer.close(handle).map_err(HandleError::from)?;
        Ok(true)
    }
}

impl fmt::Debug for HandleOwnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleOwnerRegistry")
            .field("closer", &self.closer.name())
            .field("resource_type", &self.options.resource_type)
            .field("failure_policy", &self.options.failure_policy)
            .finish()
    }
}
