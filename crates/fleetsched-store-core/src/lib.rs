#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Storage abstractions for the fleet scheduler core.
//!
//! This crate defines the repository traits the scheduling components (C1,
//! C5, C7, C8) use to read and persist state, without committing to a
//! concrete backend. A real deployment backs these traits with a database;
//! `fleetsched-store-memory` backs them with an in-process map for tests and
//! single-node `schedule-once` runs.
//!
//! Four concerns are split into four traits rather than one god-trait,
//! mirroring how the scheduling core itself separates read-only snapshotting
//! (C1) from the write paths (C5, C7) that mutate persisted state:
//! [`SnapshotRepository`] for the read-mostly view the prioritizer/selector
//! operate over, [`AgentRepository`]/[`SessionRepository`] for per-entity
//! CRUD, and [`StatusHistoryStore`] for the append-only kernel audit log.

use async_trait::async_trait;
use fleetsched_types::{
    Agent, AgentId, Kernel, KernelId, ScalingGroupName, Session, SessionId, SessionWorkload,
    StatusHistoryEntry, SystemSnapshot,
};

/// Errors common to every storage backend implementing these traits.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No record exists for the given key.
    #[error("not found: {0}")]
    NotFound(String),

    /// An optimistic-concurrency write lost a race: the persisted version no
    /// longer matches what the caller last read.
    #[error("version conflict on {entity}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Entity identifier the conflict occurred on.
        entity: String,
        /// Version the caller expected to overwrite.
        expected: u64,
        /// Version actually persisted.
        actual: u64,
    },

    /// A status history append would violate the strictly-increasing
    /// timestamp invariant (spec.md §4.8).
    #[error("non-monotone status history for kernel {0}")]
    NonMonotoneHistory(KernelId),

    /// Backend-specific failure (I/O, serialization, connection loss, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Read-only view over the scheduling snapshot for one scaling group: the
/// agents, pending sessions, and quota usage C1 assembles before a tick.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Assemble the current [`SystemSnapshot`] for `scaling_group`.
    async fn snapshot(&self, scaling_group: &ScalingGroupName) -> Result<SystemSnapshot, StoreError>;
}

/// CRUD over agent records, plus the optimistic-concurrency compare-and-swap
/// the allocator uses to commit occupancy changes (spec.md §4.5).
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Fetch a single agent by id.
    async fn get_agent(&self, id: &AgentId) -> Result<Agent, StoreError>;

    /// List every agent belonging to `scaling_group`, live or not.
    async fn list_agents(&self, scaling_group: &ScalingGroupName) -> Result<Vec<Agent>, StoreError>;

    /// Unconditionally upsert an agent record (used for liveness/heartbeat
    /// updates, which do not participate in the allocator's CAS protocol).
    async fn put_agent(&self, agent: Agent) -> Result<(), StoreError>;

    /// Persist `agent` only if the currently-stored version equals
    /// `expected_version`, then atomically bump the stored version.
    /// Returns [`StoreError::VersionConflict`] if a concurrent writer won
    /// the race, telling the allocator to re-read and retry the tick.
    async fn compare_and_swap_agent(
        &self,
        agent: Agent,
        expected_version: u64,
    ) -> Result<(), StoreError>;
}

/// CRUD over materialized session records, once a workload has at least one
/// kernel binding.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Fetch a single session by id.
    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError>;

    /// Upsert a session record.
    async fn put_session(&self, session: Session) -> Result<(), StoreError>;
}

/// The not-yet-scheduled workload queue C2 prioritizes and C3 admits.
#[async_trait]
pub trait PendingWorkloadQueue: Send + Sync {
    /// List workloads still awaiting scheduling for `scaling_group`, in no
    /// particular order — ordering is C2's job, not the store's.
    async fn pending_workloads(
        &self,
        scaling_group: &ScalingGroupName,
    ) -> Result<Vec<SessionWorkload>, StoreError>;

    /// Enqueue a new workload.
    async fn enqueue_workload(&self, workload: SessionWorkload) -> Result<(), StoreError>;

    /// Remove a workload from the pending queue once it has been admitted
    /// (accepted) or rejected.
    async fn remove_workload(&self, session_id: &SessionId) -> Result<(), StoreError>;
}

/// CRUD over individual kernel records.
#[async_trait]
pub trait KernelRepository: Send + Sync {
    /// Fetch a single kernel by id.
    async fn get_kernel(&self, id: &KernelId) -> Result<Kernel, StoreError>;

    /// List every kernel belonging to `session_id`.
    async fn list_kernels(&self, session_id: &SessionId) -> Result<Vec<Kernel>, StoreError>;

    /// Upsert a kernel record.
    async fn put_kernel(&self, kernel: Kernel) -> Result<(), StoreError>;
}

/// Append-only audit log of kernel status transitions (spec.md §4.8).
#[async_trait]
pub trait StatusHistoryStore: Send + Sync {
    /// Append `entry` to `kernel_id`'s history. Implementations must reject
    /// an entry whose timestamp does not strictly exceed the last recorded
    /// entry's timestamp with [`StoreError::NonMonotoneHistory`].
    async fn append_status_history(
        &self,
        kernel_id: &KernelId,
        entry: StatusHistoryEntry,
    ) -> Result<(), StoreError>;

    /// Full history for `kernel_id`, oldest first.
    async fn status_history(&self, kernel_id: &KernelId) -> Result<Vec<StatusHistoryEntry>, StoreError>;
}
