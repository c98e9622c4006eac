/*!
 * Monitoring
 * Lifecycle events, counters and structured tracing
 */

pub mod collection;
pub mod events;
mod tracer;

pub use collection::{Collector, MetricsSnapshot};
pub use events::{Category, Event, EventFilter, Payload, Severity};
pub use tracer::init_tracing;
