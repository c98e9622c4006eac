/*!
 * Cleaner
 *
 * The shipped reachability tracker. Pending actions live in a DashMap
 * keyed by registration id; `Reachability` tokens report drops over an
 * unbounded flume channel; one dedicated, named thread drains the channel
 * and runs the matching action.
 *
 * Removing the action from the map is what claims it, so a concurrent
 * `deschedule` and an incoming drop notification can never both see it.
 */

use super::{CleanupAction, Reachability, ReachabilityTracker, TrackerSignal};
use crate::core::config::CleanerConfig;
use crate::core::errors::{HandleError, HandleResult};
use crate::core::limits::DEFAULT_FLUSH_TIMEOUT;
use crate::core::types::RegistrationId;
use crate::monitoring::{Category, Collector, Event, Payload, Severity};
use ahash::RandomState;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cleaner counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanerStats {
    pub scheduled: u64,
    pub descheduled: u64,
    pub executed: u64,
    pub panicked: u64,
    pub pending: usize,
}

struct CleanerInner {
    pending: DashMap<RegistrationId, CleanupAction, RandomState>,
    next_id: AtomicU64,
    tx: flume::Sender<TrackerSignal>,
    running: AtomicBool,
    scheduled: AtomicU64,
    descheduled: AtomicU64,
    executed: AtomicU64,
    panicked: AtomicU64,
    collector: Option<Arc<Collector>>,
}

impl CleanerInner {
    fn run(&self, rx: flume::Receiver<TrackerSignal>) {
        debug!("Cleaner thread running");

        for signal in rx.iter() {
            match signal {
                TrackerSignal::Unreachable(id) => self.run_action(id),
                TrackerSignal::Barrier(ack) => {
                    let _ = ack.send(());
                }
                TrackerSignal::Shutdown => break,
            }
        }

        debug!(pending = self.pending.len(), "Cleaner thread exiting");
    }

    fn run_action(&self, id: RegistrationId) {
        // Descheduled registrations still send a drop notification
        let Some((_, action)) = self.pending.remove(&id) else {
            return;
        };

        let _span = tracing::debug_span!("last_chance", registration = id).entered();
        match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(()) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                self.panicked.fetch_add(1, Ordering::Relaxed);
                error!(
                    registration = id,
                    panic = %panic_message(payload.as_ref()),
                    "Last-chance action panicked"
                );
                if let Some(ref collector) = self.collector {
                    collector.emit(Event::new(
                        Severity::Critical,
                        Category::Cleaner,
                        Payload::CleanupPanicked { registration: id },
                    ));
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}

/// Reachability tracker backed by a dedicated cleanup thread
///
/// # Example
///
/// ```ignore
/// let cleaner = Arc::new(Cleaner::new()?);
/// let token = cleaner.schedule(Box::new(|| close_somehow()))?;
/// drop(token); // action runs on the cleaner thread
/// cleaner.flush();
/// ```
pub struct Cleaner {
    inner: Arc<CleanerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
    exited: flume::Receiver<()>,
    config: CleanerConfig,
}

static GLOBAL: OnceLock<Arc<Cleaner>> = OnceLock::new();

impl Cleaner {
    /// Start a cleaner with default configuration
    pub fn new() -> HandleResult<Self> {
        Self::with_config(CleanerConfig::default())
    }

    /// Start a cleaner thread with the given configuration
    pub fn with_config(config: CleanerConfig) -> HandleResult<Self> {
        Self::spawn(config, None)
    }

    /// Start a cleaner that reports contained panics to `collector`
    pub fn with_collector(config: CleanerConfig, collector: Arc<Collector>) -> HandleResult<Self> {
        Self::spawn(config, Some(collector))
    }

    fn spawn(config: CleanerConfig, collector: Option<Arc<Collector>>) -> HandleResult<Self> {
        config.validate()?;

        let (tx, rx) = flume::unbounded();
        let (exited_tx, exited) = flume::bounded::<()>(1);

        let inner = Arc::new(CleanerInner {
            pending: DashMap::with_hasher(RandomState::new()),
            next_id: AtomicU64::new(1),
            tx,
            running: AtomicBool::new(true),
            scheduled: AtomicU64::new(0),
            descheduled: AtomicU64::new(0),
            executed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
            collector,
        });

        let worker_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                // Dropped on exit, which is what `shutdown` waits for
                let _exited = exited_tx;
                worker_inner.run(rx);
            })
            .map_err(|e| {
                HandleError::TrackerUnavailable(format!("failed to spawn cleaner thread: {}", e))
            })?;

        info!(thread = %config.thread_name, "Cleaner started");

        Ok(Self {
            inner,
            worker_id: handle.thread().id(),
            worker: Mutex::new(Some(handle)),
            exited,
            config,
        })
    }

    /// Process-wide cleaner, started on first use from `CleanerConfig::from_env`
    pub fn global() -> HandleResult<Arc<Cleaner>> {
        if let Some(cleaner) = GLOBAL.get() {
            return Ok(Arc::clone(cleaner));
        }

        let cleaner = Arc::new(Cleaner::with_config(CleanerConfig::from_env()?)?);
        // A racing initializer may win; the loser shuts its thread down on drop
        Ok(Arc::clone(GLOBAL.get_or_init(|| cleaner)))
    }

    #[inline]
    pub fn config(&self) -> &CleanerConfig {
        &self.config
    }

    /// Id of the thread that runs last-chance actions
    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.worker_id
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of scheduled actions that have neither run nor been descheduled
    #[inline]
    pub fn pending(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn stats(&self) -> CleanerStats {
        CleanerStats {
            scheduled: self.inner.scheduled.load(Ordering::Relaxed),
            descheduled: self.inner.descheduled.load(Ordering::Relaxed),
            executed: self.inner.executed.load(Ordering::Relaxed),
            panicked: self.inner.panicked.load(Ordering::Relaxed),
            pending: self.inner.pending.len(),
        }
    }

    /// Wait until every drop notification sent before this call is handled
    ///
    /// Returns `false` on timeout, after shutdown, or when called from the
    /// cleaner thread itself.
    pub fn flush(&self) -> bool {
        self.flush_timeout(DEFAULT_FLUSH_TIMEOUT)
    }

    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        if !self.is_running() || thread::current().id() == self.worker_id {
            return false;
        }

        let (ack_tx, ack_rx) = flume::bounded(1);
        if self.inner.tx.send(TrackerSignal::Barrier(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Stop the cleaner thread
    ///
    /// Notifications already queued are handled first. Actions still
    /// pending afterwards never run and their handles stay open.
    pub fn shutdown(&self) -> HandleResult<()> {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        let _ = self.inner.tx.send(TrackerSignal::Shutdown);

        let Some(handle) = self.worker.lock().take() else {
            return Ok(());
        };

        // Shutdown requested by an action; the loop exits after it returns
        if thread::current().id() == self.worker_id {
            return Ok(());
        }

        match self.exited.recv_timeout(self.config.shutdown_timeout()) {
            Err(flume::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.config.shutdown_timeout_ms,
                    "Cleaner thread did not stop in time; detaching"
                );
                return Err(HandleError::TrackerUnavailable(
                    "cleaner thread did not stop within the shutdown timeout".into(),
                ));
            }
            Ok(()) | Err(flume::RecvTimeoutError::Disconnected) => {}
        }

        handle
            .join()
            .map_err(|_| HandleError::TrackerUnavailable("cleaner thread panicked".into()))?;

        let leaked = self.inner.pending.len();
        if leaked > 0 {
            warn!(pending = leaked, "Cleaner stopped with live registrations");
        } else {
            info!("Cleaner stopped");
        }
        Ok(())
    }
}

impl ReachabilityTracker for Cleaner {
    fn schedule(&self, action: CleanupAction) -> HandleResult<Reachability> {
        if !self.is_running() {
            return Err(HandleError::TrackerUnavailable(
                "cleaner has shut down".into(),
            ));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.pending.insert(id, action);
        self.inner.scheduled.fetch_add(1, Ordering::Relaxed);

        Ok(Reachability::new(id, self.inner.tx.clone()))
    }

    fn deschedule(&self, id: RegistrationId) -> bool {
        let removed = self.inner.pending.remove(&id).is_some();
        if removed {
            self.inner.descheduled.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }
}

impl Drop for Cleaner {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Cleaner shutdown on drop failed");
        }
    }
}
