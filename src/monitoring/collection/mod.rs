/*!
 * Collection
 * Central sink for lifecycle observability data
 */

mod collector;

pub use collector::{Collector, MetricsSnapshot};
