//! Errors raised by distributed lock backends.

/// Failure modes for `DistributedLock::acquire`/`release` (spec.md §4.6, §5).
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock is currently held by another owner; the caller should skip
    /// this scaling group for the current cycle (spec.md §5 "lock
    /// acquisition non-blocking (busy -> skip group this cycle)").
    #[error("lock {0} is busy")]
    Busy(String),
    /// The underlying backend is unreachable.
    #[error("lock backend unavailable: {0}")]
    Unavailable(String),
    /// `release` was called with a handle that no longer matches the
    /// current holder (already expired and reclaimed by someone else).
    #[error("lock {0} handle is stale")]
    StaleHandle(String),
}
