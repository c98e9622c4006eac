/*!
 * Handle Lifecycle Limits and Constants
 *
 * Centralized location for sentinels, thread names and timeouts used by
 * the guard, registry and cleaner layers.
 */

use std::time::Duration;

// =============================================================================
// HANDLES
// =============================================================================

/// "No resource" sentinel for raw handles
/// [LINUX-COMPAT] Matches the -1 returned by failed open/socket calls
pub const INVALID_HANDLE_VALUE: i64 = -1;

// =============================================================================
// CLEANER
// =============================================================================

/// Name of the dedicated last-chance cleanup thread
pub const CLEANER_THREAD_NAME: &str = "handle-cleaner";

/// Default time to wait for the cleaner thread on shutdown (5s)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time `flush` waits for the cleaner to drain (5s)
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Native closes slower than this are logged at warn level (10ms)
/// [PERF] Close normally completes in microseconds; slow closes point at
/// lingering sockets or a stalled crypto provider
pub const SLOW_CLOSE_THRESHOLD: Duration = Duration::from_millis(10);
