//! Single-node, development-only lock backend using advisory lock files on
//! local disk. Not safe across machines; intended for `schedule-once`/local
//! dev per spec.md §4.10 ("filelock (single-node dev)").

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;

use crate::error::LockError;
use crate::{DistributedLock, LockHandle};

/// A lock expressed as a `<dir>/<lock_id>.lock` file containing an expiry
/// timestamp. Acquisition is a create-if-absent-or-expired check; there is
/// no cross-process fencing beyond the file's mtime/contents, which is
/// adequate for the single-node development use this backend targets.
pub struct FileLockBackend {
    dir: PathBuf,
    next_token: AtomicU64,
}

impl FileLockBackend {
    /// Create a backend rooted at `dir`, which must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), next_token: AtomicU64::new(1) }
    }

    fn lock_path(&self, lock_id: &str) -> PathBuf {
        self.dir.join(format!("{lock_id}.lock"))
    }

    fn now_unix() -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
    }
}

#[async_trait]
impl DistributedLock for FileLockBackend {
    async fn acquire(&self, lock_id: &str, lifetime_hint: Duration) -> Result<LockHandle, LockError> {
        let path = self.lock_path(lock_id);
        if let Ok(contents) = fs::read_to_string(&path).await {
            if let Ok(expiry) = contents.trim().parse::<u64>() {
                if expiry > Self::now_unix() {
                    return Err(LockError::Busy(lock_id.to_string()));
                }
            }
        }
        let expiry = Self::now_unix() + lifetime_hint.as_secs().max(1);
        fs::write(&path, expiry.to_string())
            .await
            .map_err(|e| LockError::Unavailable(e.to_string()))?;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        Ok(LockHandle { lock_id: lock_id.to_string(), fencing_token: token })
    }

    async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let path = self.lock_path(&handle.lock_id);
        let _ = fs::remove_file(&path).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_then_busy_then_release() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileLockBackend::new(dir.path());
        let handle = backend.acquire("group-a", Duration::from_secs(30)).await.unwrap();
        assert!(backend.acquire("group-a", Duration::from_secs(30)).await.is_err());
        backend.release(handle).await.unwrap();
        assert!(backend.acquire("group-a", Duration::from_secs(30)).await.is_ok());
    }

    #[tokio::test]
    async fn expired_lock_is_reacquirable() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileLockBackend::new(dir.path());
        let _handle = backend.acquire("group-b", Duration::from_secs(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(backend.acquire("group-b", Duration::from_secs(30)).await.is_ok());
    }
}
