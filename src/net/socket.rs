/*!
 * Socket Descriptors
 *
 * Owner for a raw socket descriptor with last-chance close. A descriptor
 * other than -1 is registered at construction; an explicit `close`
 * cancels the registration before closing, so a descriptor number the
 * kernel has since handed to someone else is never closed twice.
 */

use crate::core::errors::{HandleError, HandleResult};
use crate::core::guard::{FinalizationGuard, GuardState};
use crate::core::types::RawHandle;
use crate::monitoring::Category;
use crate::registry::{CleanupSlot, HandleOwner, HandleOwnerRegistry, Unregistered};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Socket descriptor with exactly-once release
///
/// # Example
///
/// ```ignore
/// let registry = HandleOwnerRegistry::global(Arc::new(SocketCloser))?;
/// let sock = SocketDescriptor::new(fd, &registry)?;
/// // Use socket
/// sock.close()?; // or drop it and let the cleaner close it
/// ```
pub struct SocketDescriptor {
    raw: RawHandle,
    closed: AtomicBool,
    registry: HandleOwnerRegistry,
    slot: CleanupSlot,
}

impl SocketDescriptor {
    /// Take ownership of `raw` and register its last-chance close
    pub fn new(raw: impl Into<RawHandle>, registry: &HandleOwnerRegistry) -> HandleResult<Self> {
        let descriptor = Self {
            raw: raw.into(),
            closed: AtomicBool::new(false),
            registry: socket_registry(registry),
            slot: CleanupSlot::new(),
        };

        descriptor.registry.register(Some(&descriptor))?;
        Ok(descriptor)
    }

    /// Descriptor holding no socket
    pub fn invalid(registry: &HandleOwnerRegistry) -> Self {
        Self {
            raw: RawHandle::INVALID,
            closed: AtomicBool::new(false),
            registry: socket_registry(registry),
            slot: CleanupSlot::new(),
        }
    }

    /// Registry this descriptor registers and closes through
    pub fn registry(&self) -> &HandleOwnerRegistry {
        &self.registry
    }

    #[inline]
    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    /// Holds an open socket: not the sentinel and not closed
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.raw.is_valid() && !self.closed.load(Ordering::Acquire)
    }

    /// State of the finalization guard, `None` if never registered
    pub fn guard_state(&self) -> Option<GuardState> {
        self.slot.state()
    }

    pub fn guard(&self) -> Option<FinalizationGuard> {
        self.slot.guard()
    }

    /// Close the socket
    ///
    /// Idempotent. If the cleaner already closed the socket this is a
    /// no-op. A failed close is returned and not retried.
    pub fn close(&self) -> HandleResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        match self.registry.close_owner(self) {
            Ok(closed) => {
                log::debug!("Socket {} closed (by this call: {})", self.raw, closed);
                Ok(())
            }
            Err(e) => {
                log::error!("Socket {} close failed: {}", self.raw, e);
                Err(e)
            }
        }
    }

    /// Give up ownership without closing
    ///
    /// Cancels the last-chance close and returns the raw descriptor; the
    /// caller becomes responsible for closing it.
    pub fn into_raw(self) -> HandleResult<RawHandle> {
        if !self.raw.is_valid() {
            return Err(HandleError::InvalidHandle(self.raw));
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(HandleError::AlreadyReleased(self.raw));
        }

        match self.registry.unregister(Some(&self)) {
            Unregistered::AlreadyReleased => Err(HandleError::AlreadyReleased(self.raw)),
            Unregistered::Cancelled | Unregistered::NotRegistered => Ok(self.raw),
        }
    }
}

fn socket_registry(registry: &HandleOwnerRegistry) -> HandleOwnerRegistry {
    registry.clone().with_resource_type("socket", Category::Socket)
}

impl HandleOwner for SocketDescriptor {
    fn raw_handle(&self) -> RawHandle {
        self.raw
    }

    fn cleanup_slot(&self) -> &CleanupSlot {
        &self.slot
    }
}

#[cfg(unix)]
impl std::os::fd::AsRawFd for SocketDescriptor {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.raw.as_fd().unwrap_or(-1)
    }
}

impl fmt::Debug for SocketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketDescriptor")
            .field("raw", &self.raw)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("guard", &self.guard_state())
            .finish()
    }
}
