/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::RawHandle;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a platform close call
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[error("native close of handle {handle} failed: {message} (code {code})")]
#[diagnostic(
    code(native::close_failed),
    help("The handle is left as-is. Closing it again is unsafe because the identifier may have been reused.")
)]
pub struct NativeError {
    pub handle: RawHandle,
    pub code: i32,
    pub message: String,
}

impl NativeError {
    pub fn new(handle: RawHandle, code: i32, message: impl Into<String>) -> Self {
        Self {
            handle,
            code,
            message: message.into(),
        }
    }

    /// Translate an errno from a failed close
    #[cfg(unix)]
    pub fn from_errno(handle: RawHandle, errno: nix::errno::Errno) -> Self {
        Self::new(handle, errno as i32, errno.desc())
    }
}

/// Errors surfaced by the handle lifecycle layer
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum HandleError {
    #[error("Invalid handle: {0}")]
    #[diagnostic(
        code(handle::invalid),
        help("The sentinel handle (-1) owns no resource and cannot be guarded.")
    )]
    InvalidHandle(RawHandle),

    #[error("Native close failed: {0}")]
    #[diagnostic(transparent)]
    NativeCloseFailure(#[from] NativeError),

    #[error("Handle {0} already released")]
    #[diagnostic(
        code(handle::already_released),
        help("The owner was closed or handed its handle out. Obtain a new owner.")
    )]
    AlreadyReleased(RawHandle),

    #[error("Reachability tracker unavailable: {0}")]
    #[diagnostic(
        code(handle::tracker_unavailable),
        help("The cleaner thread has shut down or could not be started.")
    )]
    TrackerUnavailable(String),

    #[error("Invalid configuration: {0}")]
    #[diagnostic(
        code(handle::invalid_config),
        help("Check HANDLE_CLEANER_* environment variables or the JSON config.")
    )]
    InvalidConfig(String),
}

/// Unrecoverable failure of a last-chance close
///
/// Produced on the cleaner thread, where no caller is positioned to
/// handle it. Logged, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
#[error("last-chance cleanup of handle {handle} failed")]
#[diagnostic(
    code(handle::finalization_failed),
    help("The owner was dropped without an explicit close and the safety-net close failed.")
)]
pub struct FinalizationError {
    pub handle: RawHandle,
    #[source]
    pub source: NativeError,
}

impl FinalizationError {
    pub fn new(handle: RawHandle, source: NativeError) -> Self {
        Self { handle, source }
    }
}

/// Common result type for handle operations
pub type HandleResult<T> = Result<T, HandleError>;
