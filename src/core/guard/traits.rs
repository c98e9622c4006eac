/*!
 * Guard Traits
 *
 * Core abstractions for finalization guards
 */

use super::{GuardMetadata, ReleasePath};
use crate::core::errors::NativeError;

/// Core guard trait
///
/// All guards must implement this to provide:
/// - Resource type identification
/// - Metadata access
/// - Liveness check
pub trait Guard: Send + Sync {
    /// Resource type name for logging/debugging
    fn resource_type(&self) -> &'static str;

    /// Get guard metadata
    fn metadata(&self) -> &GuardMetadata;

    /// Check if the guarded handle is still eligible for release
    fn is_active(&self) -> bool;
}

/// Guards with observable lifecycle
///
/// Emits events for registration, cancellation, release and failures
pub trait Observable: Guard {
    /// Emit registration event
    fn emit_created(&self);

    /// Emit cancellation event (explicit path took over)
    fn emit_cancelled(&self);

    /// Emit release event for whichever path closed the handle
    fn emit_released(&self, path: ReleasePath);

    /// Emit close failure event
    fn emit_error(&self, path: ReleasePath, error: &NativeError);
}
