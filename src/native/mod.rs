/*!
 * Native Close
 *
 * The one privileged operation: hand a raw handle back to the platform.
 * Everything that actually closes a descriptor or destroys a key goes
 * through a `NativeCloser`, so tests can substitute a counting double.
 */

use crate::core::errors::NativeError;
use crate::core::types::RawHandle;

/// Performs the platform close primitive on a raw handle
///
/// Implementations must call the platform exactly once per invocation and
/// must not retry on failure: after a failed close the identifier may
/// already be torn down or reused.
pub trait NativeCloser: Send + Sync {
    /// Close `handle`, translating platform failure into `NativeError`
    fn close(&self, handle: RawHandle) -> Result<(), NativeError>;

    /// Closer name for logging
    fn name(&self) -> &'static str {
        "native"
    }
}

impl<F> NativeCloser for F
where
    F: Fn(RawHandle) -> Result<(), NativeError> + Send + Sync,
{
    #[inline]
    fn close(&self, handle: RawHandle) -> Result<(), NativeError> {
        self(handle)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}

/// Closes socket descriptors with `close(2)`
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketCloser;

#[cfg(unix)]
impl NativeCloser for SocketCloser {
    fn close(&self, handle: RawHandle) -> Result<(), NativeError> {
        let fd = handle.as_fd().ok_or_else(|| {
            NativeError::from_errno(handle, nix::errno::Errno::EBADF)
        })?;

        nix::unistd::close(fd).map_err(|errno| NativeError::from_errno(handle, errno))
    }

    fn name(&self) -> &'static str {
        "socket"
    }
}
