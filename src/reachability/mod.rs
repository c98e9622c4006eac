/*!
 * Reachability Tracking
 *
 * Schedules a last-chance action to run when an owner becomes
 * unreachable. An owner is unreachable once the `Reachability` token it
 * holds is dropped; the action then runs at most once, on the tracker's
 * own background context and never on the thread that dropped the token.
 *
 * ## Contract
 *
 * - `schedule(action)` returns the token the owner must keep alive
 * - `deschedule(id)` stops an action that has not started yet
 * - an action is removed before it runs, so it can never run twice
 */

mod cleaner;

pub use cleaner::{Cleaner, CleanerStats};

use crate::core::errors::HandleResult;
use crate::core::types::RegistrationId;
use std::fmt;

/// A last-chance action, run at most once
pub type CleanupAction = Box<dyn FnOnce() + Send + Sync + 'static>;

/// Messages delivered to a tracker's background context
pub enum TrackerSignal {
    /// The owner behind this registration became unreachable
    Unreachable(RegistrationId),
    /// Acknowledge once every earlier signal has been handled
    Barrier(flume::Sender<()>),
    /// Stop the background context
    Shutdown,
}

/// Schedules last-chance actions for owners that become unreachable
pub trait ReachabilityTracker: Send + Sync {
    /// Register `action` to run at most once after the returned token drops
    fn schedule(&self, action: CleanupAction) -> HandleResult<Reachability>;

    /// Prevent a scheduled action from running if it has not started
    ///
    /// Returns `true` if the action was still pending.
    fn deschedule(&self, id: RegistrationId) -> bool;
}

/// Liveness token for one scheduled action
///
/// Held by the owner. Dropping it tells the tracker the owner is gone.
/// The notification is a non-blocking channel send, so dropping an owner
/// never waits on a native close.
pub struct Reachability {
    id: RegistrationId,
    notify: Option<flume::Sender<TrackerSignal>>,
}

impl Reachability {
    pub fn new(id: RegistrationId, notify: flume::Sender<TrackerSignal>) -> Self {
        Self {
            id,
            notify: Some(notify),
        }
    }

    #[inline]
    pub fn id(&self) -> RegistrationId {
        self.id
    }
}

impl Drop for Reachability {
    fn drop(&mut self) {
        if let Some(notify) = self.notify.take() {
            // A stopped tracker has nothing left to run
            let _ = notify.send(TrackerSignal::Unreachable(self.id));
        }
    }
}

impl fmt::Debug for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reachability").field("id", &self.id).finish()
    }
}
