/*!
 * Finalization Guard
 *
 * Per-handle state machine deciding which of two paths closes a raw
 * handle: the owner's explicit close, or the tracker's last-chance
 * cleanup after the owner became unreachable.
 *
 * ```text
 * Active --(cancel, explicit close)--> Released(Explicit)
 * Active --(last-chance cleanup)-----> Released(LastChance)
 * ```
 *
 * Both edges are the two outcomes of one compare-and-set on `state`.
 * There is no edge back to `Active`.
 */

use super::traits::{Guard, Observable};
use super::GuardMetadata;
use crate::core::config::{CleanerConfig, FailurePolicy};
use crate::core::errors::{FinalizationError, HandleError, HandleResult, NativeError};
use crate::core::limits::SLOW_CLOSE_THRESHOLD;
use crate::core::types::{RawHandle, RegistrationId};
use crate::monitoring::{Category, Collector, Event, Payload, Severity};
use crate::native::NativeCloser;
use crate::reachability::{Reachability, ReachabilityTracker};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

const ACTIVE: u8 = 0;
const RELEASED_EXPLICIT: u8 = 1;
const RELEASED_LAST_CHANCE: u8 = 2;

/// Externally visible guard state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardState {
    /// Eligible for last-chance cleanup
    Active,
    /// Closed, or claimed for closing, by one of the two paths
    Released,
}

/// Which path won the release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleasePath {
    Explicit,
    LastChance,
}

impl ReleasePath {
    #[inline]
    const fn code(self) -> u8 {
        match self {
            ReleasePath::Explicit => RELEASED_EXPLICIT,
            ReleasePath::LastChance => RELEASED_LAST_CHANCE,
        }
    }
}

/// Per-guard settings shared by every guard a registry creates
#[derive(Clone)]
pub struct GuardOptions {
    pub resource_type: &'static str,
    pub category: Category,
    pub failure_policy: FailurePolicy,
    pub slow_close_threshold: Duration,
    pub collector: Option<Arc<Collector>>,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            resource_type: "handle",
            category: Category::Handle,
            failure_policy: FailurePolicy::Log,
            slow_close_threshold: SLOW_CLOSE_THRESHOLD,
            collector: None,
        }
    }
}

impl GuardOptions {
    /// Options matching a cleaner's failure policy and slow-close threshold
    pub fn from_config(config: &CleanerConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            slow_close_threshold: config.slow_close_threshold(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn with_resource_type(mut self, resource_type: &'static str, category: Category) -> Self {
        self.resource_type = resource_type;
        self.category = category;
        self
    }

    #[inline]
    pub fn with_collector(mut self, collector: Arc<Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    #[inline]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

/// State shared between the owner's guard and the scheduled action
struct GuardCore {
    handle: RawHandle,
    state: AtomicU8,
    registration: AtomicU64,
    closer: Arc<dyn NativeCloser>,
    options: GuardOptions,
    metadata: GuardMetadata,
}

impl GuardCore {
    /// Leave `Active` via `path`; `true` only for the single winner
    #[inline]
    fn try_release(&self, path: ReleasePath) -> bool {
        self.state
            .compare_exchange(ACTIVE, path.code(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    fn state(&self) -> GuardState {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => GuardState::Active,
            _ => GuardState::Released,
        }
    }

    #[inline]
    fn released_by(&self) -> Option<ReleasePath> {
        match self.state.load(Ordering::Acquire) {
            RELEASED_EXPLICIT => Some(ReleasePath::Explicit),
            RELEASED_LAST_CHANCE => Some(ReleasePath::LastChance),
            _ => None,
        }
    }

    fn last_chance_cleanup(&self) -> Result<bool, FinalizationError> {
        if !self.try_release(ReleasePath::LastChance) {
            return Ok(false);
        }

        self.close_as(ReleasePath::LastChance)
            .map_err(|e| FinalizationError::new(self.handle, e))?;
        Ok(true)
    }

    /// Single native close; caller must have won the transition
    fn close_as(&self, path: ReleasePath) -> Result<(), NativeError> {
        let start = Instant::now();
        let result = self.closer.close(self.handle);
        let elapsed = start.elapsed();

        if elapsed >= self.options.slow_close_threshold {
            log::warn!(
                "Slow {} close of {} handle {}: {:?}",
                self.closer.name(),
                self.options.resource_type,
                self.handle,
                elapsed
            );
            self.emit(
                Severity::Warn,
                Payload::SlowClose {
                    duration_ms: elapsed.as_millis() as u64,
                    threshold_ms: self.options.slow_close_threshold.as_millis() as u64,
                },
            );
        }

        match &result {
            Ok(()) => self.emit_released(path),
            Err(e) => self.emit_error(path, e),
        }

        result
    }

    /// Entry point for the tracker's background thread
    fn run_last_chance(&self) {
        match self.last_chance_cleanup() {
            Ok(true) => log::debug!(
                "Last-chance close of {} handle {}",
                self.options.resource_type,
                self.handle
            ),
            Ok(false) => {}
            Err(e) => {
                log::error!(
                    "{} ({} handle, code {}): {}",
                    e,
                    self.options.resource_type,
                    e.source.code,
                    e.source.message
                );
                if self.options.failure_policy.aborts() {
                    log::error!("Aborting: failure policy forbids a failed last-chance close");
                    std::process::abort();
                }
            }
        }
    }

    fn emit(&self, severity: Severity, payload: Payload) {
        if let Some(ref collector) = self.options.collector {
            collector.emit(
                Event::new(severity, self.options.category, payload).with_handle(self.handle),
            );
        }
    }
}

/// Guard protecting one raw handle against double release
///
/// Cloning yields another view of the same guard; all clones share one
/// state word.
#[derive(Clone)]
pub struct FinalizationGuard {
    core: Arc<GuardCore>,
    registration: RegistrationId,
    tracker: Weak<dyn ReachabilityTracker>,
}

impl FinalizationGuard {
    /// Create an `Active` guard and schedule its last-chance cleanup
    ///
    /// Returns the guard and the `Reachability` token the owner must keep
    /// alive. Dropping the token without cancelling the guard hands the
    /// close to the tracker.
    pub fn create(
        handle: RawHandle,
        closer: Arc<dyn NativeCloser>,
        tracker: &Arc<dyn ReachabilityTracker>,
        options: GuardOptions,
    ) -> HandleResult<(Self, Reachability)> {
        if !handle.is_valid() {
            return Err(HandleError::InvalidHandle(handle));
        }

        let metadata = GuardMetadata::new(options.resource_type).with_handle(handle);
        let core = Arc::new(GuardCore {
            handle,
            state: AtomicU8::new(ACTIVE),
            registration: AtomicU64::new(0),
            closer,
            options,
            metadata,
        });

        let action_core = Arc::clone(&core);
        let reachability = tracker.schedule(Box::new(move || action_core.run_last_chance()))?;

        core.registration.store(reachability.id(), Ordering::Release);
        let guard = Self {
            core,
            registration: reachability.id(),
            tracker: Arc::downgrade(tracker),
        };
        guard.emit_created();
        Ok((guard, reachability))
    }

    #[inline]
    pub fn handle(&self) -> RawHandle {
        self.core.handle
    }

    #[inline]
    pub fn registration(&self) -> RegistrationId {
        self.registration
    }

    #[inline]
    pub fn state(&self) -> GuardState {
        self.core.state()
    }

    /// Path that released the handle, if any
    #[inline]
    pub fn released_by(&self) -> Option<ReleasePath> {
        self.core.released_by()
    }

    /// Claim the close for the explicit path and stop last-chance cleanup
    ///
    /// Idempotent. Returns `true` only for the call that moved the guard
    /// out of `Active`: that caller must now close the handle itself.
    /// Returns `false` if the handle was already claimed by either path.
    pub fn cancel(&self) -> bool {
        if !self.core.try_release(ReleasePath::Explicit) {
            return false;
        }

        if let Some(tracker) = self.tracker.upgrade() {
            tracker.deschedule(self.registration);
        }
        self.emit_cancelled();
        true
    }

    /// Cancel, then close through the guard's own closer
    ///
    /// Returns `Ok(false)` when the last-chance path already owned the
    /// close. Close failures propagate and are not retried.
    pub fn close_explicitly(&self) -> HandleResult<bool> {
        if !self.cancel() {
            return Ok(false);
        }
        self.core.close_as(ReleasePath::Explicit)?;
        Ok(true)
    }

    /// Last-resort release, normally invoked by the tracker
    ///
    /// Closes the handle only if the guard was still `Active`. Returns
    /// whether this call performed the close.
    pub fn last_chance_cleanup(&self) -> Result<bool, FinalizationError> {
        let closed = self.core.last_chance_cleanup();
        if matches!(closed, Ok(true) | Err(_)) {
            if let Some(tracker) = self.tracker.upgrade() {
                tracker.deschedule(self.registration);
            }
        }
        closed
    }
}

impl Guard for GuardCore {
    fn resource_type(&self) -> &'static str {
        self.options.resource_type
    }

    fn metadata(&self) -> &GuardMetadata {
        &self.metadata
    }

    fn is_active(&self) -> bool {
        self.state() == GuardState::Active
    }
}

impl Observable for GuardCore {
    fn emit_created(&self) {
        self.emit(
            Severity::Debug,
            Payload::GuardRegistered {
                registration: self.registration.load(Ordering::Acquire),
                resource_type: self.options.resource_type.to_string(),
            },
        );
    }

    fn emit_cancelled(&self) {
        self.emit(
            Severity::Debug,
            Payload::GuardCancelled {
                registration: self.registration.load(Ordering::Acquire),
            },
        );
    }

    fn emit_released(&self, path: ReleasePath) {
        self.emit(
            Severity::Debug,
            Payload::HandleReleased {
                path,
                lifetime_micros: self.metadata.lifetime_micros(),
            },
        );
    }

    fn emit_error(&self, path: ReleasePath, error: &NativeError) {
        self.emit(
            Severity::Error,
            Payload::CloseFailed {
                path,
                code: error.code,
                message: error.message.clone(),
            },
        );
    }
}

impl Guard for FinalizationGuard {
    fn resource_type(&self) -> &'static str {
        self.core.resource_type()
    }

    fn metadata(&self) -> &GuardMetadata {
        self.core.metadata()
    }

    fn is_active(&self) -> bool {
        self.core.is_active()
    }
}

impl Observable for FinalizationGuard {
    fn emit_created(&self) {
        self.core.emit_created();
    }

    fn emit_cancelled(&self) {
        self.core.emit_cancelled();
    }

    fn emit_released(&self, path: ReleasePath) {
        self.core.emit_released(path);
    }

    fn emit_error(&self, path: ReleasePath, error: &NativeError) {
        self.core.emit_error(path, error);
    }
}

impl fmt::Debug for FinalizationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinalizationGuard")
            .field("handle", &self.core.handle)
            .field("registration", &self.registration)
            .field("state", &self.state())
            .field("released_by", &self.released_by())
            .finish()
    }
}
