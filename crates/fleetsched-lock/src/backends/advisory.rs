//! Postgres-style advisory lock backend.
//!
//! The real backend issues `pg_try_advisory_lock`/`pg_advisory_unlock`
//! against the manager's own database connection pool — but the database
//! itself is out of scope for this core (spec.md §1 "storage proxy",
//! §6 "persisted state layout (abstract)"). This implementation simulates
//! the session-held, single-owner semantics of a Postgres advisory lock
//! in-memory, documented as the integration seam where a real `sqlx`
//! connection would issue the two calls above.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::LockError;
use crate::{DistributedLock, LockHandle};

struct Held {
    expires_at: Instant,
}

/// Simulated Postgres advisory lock: one global table of `lock_id -> Held`,
/// acquire succeeds iff absent or expired.
pub struct PostgresAdvisoryLockBackend {
    held: DashMap<String, Held>,
    next_token: AtomicU64,
}

impl Default for PostgresAdvisoryLockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PostgresAdvisoryLockBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self { held: DashMap::new(), next_token: AtomicU64::new(1) }
    }
}

#[async_trait]
impl DistributedLock for PostgresAdvisoryLockBackend {
    async fn acquire(&self, lock_id: &str, lifetime_hint: Duration) -> Result<LockHandle, LockError> {
        let now = Instant::now();
        if let Some(existing) = self.held.get(lock_id) {
            if existing.expires_at > now {
                return Err(LockError::Busy(lock_id.to_string()));
            }
        }
        self.held.insert(lock_id.to_string(), Held { expires_at: now + lifetime_hint });
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        Ok(LockHandle { lock_id: lock_id.to_string(), fencing_token: token })
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        self.held.remove(&handle.lock_id);
        Ok(())
    }
}
