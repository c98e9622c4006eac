/*!
 * Core Types
 * Common types used across the handle lifecycle layer
 */

use super::limits::INVALID_HANDLE_VALUE;
use serde::{Deserialize, Serialize};
use std::fmt;

/// File descriptor type
pub type Fd = i32;

/// Identifier of one scheduled last-chance action
pub type RegistrationId = u64;

/// Opaque identifier for an OS-level resource
///
/// Wraps either an integer descriptor or a native pointer value. A
/// `RawHandle` carries no lifecycle of its own: copying it never
/// duplicates the underlying resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawHandle(i64);

impl RawHandle {
    /// The "no resource" sentinel
    pub const INVALID: RawHandle = RawHandle(INVALID_HANDLE_VALUE);

    #[inline]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != INVALID_HANDLE_VALUE
    }

    /// Interpret as a file descriptor, if it fits
    #[inline]
    pub fn as_fd(self) -> Option<Fd> {
        Fd::try_from(self.0).ok().filter(|fd| *fd >= 0)
    }
}

impl Default for RawHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<i32> for RawHandle {
    #[inline]
    fn from(value: i32) -> Self {
        Self(value as i64)
    }
}

impl From<i64> for RawHandle {
    #[inline]
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::LowerHex for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
