/*!
 * AI-OS Handle Library
 *
 * Exactly-once release of OS handles. Every owner of a raw handle gets a
 * finalization guard: either the owner closes explicitly, or the dedicated
 * cleaner thread closes the handle after the owner is dropped. One atomic
 * transition decides which, so no handle is ever closed twice.
 */

pub mod core;
pub mod monitoring;
pub mod native;
pub mod net;
pub mod reachability;
pub mod registry;
pub mod security;

// Re-exports
pub use crate::core::{
    CleanerConfig, FailurePolicy, FinalizationError, FinalizationGuard, GuardOptions, GuardState,
    HandleError, HandleResult, NativeError, RawHandle, ReleasePath,
};
pub use monitoring::{init_tracing, Collector, MetricsSnapshot};
#[cfg(unix)]
pub use native::SocketCloser;
pub use native::NativeCloser;
pub use net::SocketDescriptor;
pub use reachability::{Cleaner, Reachability, ReachabilityTracker};
pub use registry::{CleanupSlot, HandleOwner, HandleOwnerRegistry, Unregistered};
pub use security::{KeyBackend, KeyPair, PrivateKey, PublicKey};
