//! Top-level error type for the daemon binary, with a `spec.md §6` exit-code
//! mapping attached.

use crate::config::ConfigError;
use crate::tick::TickError;
use fleetsched_store_core::StoreError;
use fleetsched_termination::TerminationError;

/// Exit code for a successful run.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for a configuration error (spec.md §6).
pub const EXIT_CONFIG_ERROR: i32 = 64;
/// Exit code for an unreachable upstream dependency (store or lock backend).
pub const EXIT_UPSTREAM_UNAVAILABLE: i32 = 69;
/// Exit code for an internal error not attributable to configuration or an
/// upstream dependency.
pub const EXIT_INTERNAL_ERROR: i32 = 70;

/// Errors that can surface out of the daemon's top-level command dispatch.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Configuration could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The backing store rejected or failed an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A scheduling tick failed.
    #[error(transparent)]
    Tick(#[from] TickError),

    /// Termination fan-out failed (only reachable via the library entry
    /// points `fleetsched_daemon` re-exports for an external caller driving
    /// `request_terminate`, not via the CLI).
    #[error(transparent)]
    Termination(#[from] TerminationError),
}

impl SchedulerError {
    /// Map this error to the process exit code spec.md §6 assigns it.
    pub fn exit_code(&self) -> i32 {
        match self {
            SchedulerError::Config(_) => EXIT_CONFIG_ERROR,
            SchedulerError::Store(_) => EXIT_UPSTREAM_UNAVAILABLE,
            SchedulerError::Tick(TickError::Lock(_) | TickError::Store(_)) => EXIT_UPSTREAM_UNAVAILABLE,
            SchedulerError::Termination(_) => EXIT_INTERNAL_ERROR,
        }
    }
}
