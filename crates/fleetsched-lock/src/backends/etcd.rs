//! Etcd-style lease-based lock backend.
//!
//! Real etcd access (gRPC, lease keep-alives) is out of scope for this core
//! per spec.md §1; this backend simulates etcd's lease model — a lock key
//! tied to a lease that must be renewed before `lifetime_hint` elapses, or
//! the key is reclaimed — behind the same `DistributedLock` trait so the
//! scheduler daemon can select it purely by configuration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::LockError;
use crate::{DistributedLock, LockHandle};

struct Lease {
    token: u64,
    expires_at: Instant,
}

/// Simulated etcd lock: one key space, acquisition creates a leased key,
/// release revokes the lease early.
pub struct EtcdLockBackend {
    leases: DashMap<String, Lease>,
    next_token: AtomicU64,
}

impl Default for EtcdLockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl EtcdLockBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self { leases: DashMap::new(), next_token: AtomicU64::new(1) }
    }

    /// Renew an existing lease, extending its expiry — the analogue of an
    /// etcd lease keep-alive. Fails if the handle's token no longer matches
    /// the current lease holder.
    pub fn renew(&self, handle: &LockHandle, lifetime_hint: Duration) -> Result<(), LockError> {
        match self.leases.get_mut(&handle.lock_id) {
            Some(mut lease) if lease.token == handle.fencing_token => {
                lease.expires_at = Instant::now() + lifetime_hint;
                Ok(())
            }
            _ => Err(LockError::StaleHandle(handle.lock_id.clone())),
        }
    }
}

#[async_trait]
impl DistributedLock for EtcdLockBackend {
    async fn acquire(&self, lock_id: &str, lifetime_hint: Duration) -> Result<LockHandle, LockError> {
        let now = Instant::now();
        if let Some(existing) = self.leases.get(lock_id) {
            if existing.expires_at > now {
                return Err(LockError::Busy(lock_id.to_string()));
            }
        }
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        self.leases.insert(
            lock_id.to_string(),
            Lease { token, expires_at: now + lifetime_hint },
        );
        Ok(LockHandle { lock_id: lock_id.to_string(), fencing_token: token })
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        if let Some(lease) = self.leases.get(&handle.lock_id) {
            if lease.token != handle.fencing_token {
                return Err(LockError::StaleHandle(handle.lock_id));
            }
        }
        self.leases.remove(&handle.lock_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn renew_extends_lease() {
        let backend = EtcdLockBackend::new();
        let handle = backend.acquire("g", Duration::from_millis(20)).await.unwrap();
        backend.renew(&handle, Duration::from_secs(30)).unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(backend.acquire("g", Duration::from_secs(10)).await.is_err());
    }

    #[tokio::test]
    async fn stale_release_is_rejected() {
        let backend = EtcdLockBackend::new();
        let handle = backend.acquire("g", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let _reacquired = backend.acquire("g", Duration::from_secs(10)).await.unwrap();
        assert!(backend.release(handle).await.is_err());
    }
}
