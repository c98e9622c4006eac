/*!
 * Core Module
 * Fundamental handle types, guards and error handling
 */

pub mod config;
pub mod errors;
pub mod guard;
pub mod limits;
pub mod types;

// Re-export for convenience
pub use config::{CleanerConfig, FailurePolicy};
pub use errors::*;
pub use guard::{
    FinalizationGuard, Guard, GuardMetadata, GuardOptions, GuardState, Observable, ReleasePath,
};
pub use types::*;
