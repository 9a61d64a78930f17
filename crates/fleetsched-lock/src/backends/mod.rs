//! Concrete `DistributedLock` backends (spec.md §4.10).

pub mod advisory;
pub mod etcd;
pub mod filelock;
pub mod redlock;

pub use advisory::PostgresAdvisoryLockBackend;
pub use etcd::EtcdLockBackend;
pub use filelock::FileLockBackend;
pub use redlock::RedlockBackend;
