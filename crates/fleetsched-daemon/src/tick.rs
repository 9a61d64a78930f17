//! One scheduling pass over a single scaling group (spec.md §4, §5).
//!
//! Drives C1 (snapshot) -> C2 (prioritize) -> C3 (validate) -> C5 (allocate)
//! for every pending workload of one scaling group, under the scaling
//! group's distributed lock. Different scaling groups tick independently;
//! ticks of the same group are strictly serialized (spec.md §5).

use std::time::Duration;

use chrono::Utc;
use fleetsched_allocator::{allocate_session, AllocatorStore};
use fleetsched_bus::{EventBus, LifecycleEvent};
use fleetsched_core::{prioritize, validate, RoundRobinCursor};
use fleetsched_lock::{DistributedLock, LockError, LockGuard};
use fleetsched_store_core::{PendingWorkloadQueue, SnapshotRepository, StatusHistoryStore, StoreError};
use fleetsched_types::{KernelState, SchedulingConfig, StatusHistoryEntry, StatusReason};
use tracing::{info, instrument, warn};

/// How long a tick lock acquisition is granted before it is assumed stale.
const TICK_LOCK_LIFETIME: Duration = Duration::from_secs(30);

/// Tallies what happened to the pending queue of one scaling group during
/// one tick, for logging and `schedule-once` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Scaling group this summary covers.
    pub scaling_group: String,
    /// Workloads successfully scheduled this tick.
    pub scheduled: u32,
    /// Workloads rejected by admission validation this tick.
    pub rejected: u32,
    /// Workloads whose `starts_at` has not yet arrived, left pending.
    pub deferred: u32,
    /// Workloads that passed validation but could not be placed this tick
    /// (no eligible agent, or lost the commit race); left pending for the
    /// next tick.
    pub unplaced: u32,
}

fn tick_lock_id(scaling_group: &fleetsched_types::ScalingGroupName) -> String {
    format!("fleetsched.tick.{scaling_group}")
}

/// Run one tick for `scaling_group`, serialized by `lock`. Returns
/// `Ok(None)` without doing any scheduling work if the lock is currently
/// busy — the caller should simply try again next cycle.
#[instrument(skip(store, bus, lock, config, cursor), fields(scaling_group = %scaling_group))]
pub async fn run_tick<S, B>(
    store: &S,
    bus: &B,
    lock: &dyn DistributedLock,
    scaling_group: &fleetsched_types::ScalingGroupName,
    config: &SchedulingConfig,
    cursor: &mut RoundRobinCursor,
) -> Result<Option<TickSummary>, TickError>
where
    S: AllocatorStore + SnapshotRepository,
    B: EventBus,
{
    let lock_id = tick_lock_id(scaling_group);
    let handle = match lock.acquire(&lock_id, TICK_LOCK_LIFETIME).await {
        Ok(h) => h,
        Err(LockError::Busy(_)) => {
            info!("tick lock busy, skipping this cycle");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let guard = LockGuard::new(lock, handle);

    let result = run_tick_locked(store, bus, scaling_group, config, cursor).await;
    if let Err(e) = guard.release().await {
        warn!(error = %e, "failed to release tick lock, relying on lifetime expiry");
    }
    result.map(Some)
}

async fn run_tick_locked<S, B>(
    store: &S,
    bus: &B,
    scaling_group: &fleetsched_types::ScalingGroupName,
    config: &SchedulingConfig,
    cursor: &mut RoundRobinCursor,
) -> Result<TickSummary, TickError>
where
    S: AllocatorStore + SnapshotRepository,
    B: EventBus,
{
    let now = Utc::now();
    let mut snapshot = store.snapshot(scaling_group).await?;
    let pending = store.pending_workloads(scaling_group).await?;
    let known_agent_ids: Vec<_> = snapshot.agents.iter().map(|a| a.id.clone()).collect();
    let cluster_capacity = snapshot
        .agents
        .iter()
        .map(|a| a.available_slots.clone())
        .sum();

    let ordered = prioritize(&pending, config.scheduler_name, &cluster_capacity);

    let mut summary = TickSummary { scaling_group: scaling_group.to_string(), ..Default::default() };
    for workload in &ordered {
        if workload.is_deferred(now) {
            summary.deferred += 1;
            continue;
        }

        if let Err(reason) = validate(workload, config, &snapshot.quota, &known_agent_ids) {
            for kernel in &workload.kernels {
                let entry = StatusHistoryEntry {
                    state: KernelState::Pending,
                    timestamp: now,
                    reason: StatusReason::Other(format!("admission.rejected: {reason}")),
                    detail: None,
                };
                if let Err(e) = store.append_status_history(&kernel.kernel_id, entry).await {
                    warn!(error = %e, "failed to record admission rejection in status history");
                }
            }
            if let Err(e) = bus.publish(LifecycleEvent::SessionRejected {
                session_id: workload.session_id,
                reason: reason.to_string(),
            }) {
                warn!(error = %e, "failed to publish SessionRejected, continuing");
            }
            summary.rejected += 1;
            continue;
        }

        match allocate_session(store, bus, &mut snapshot, workload, config, cursor, now).await {
            Ok(_) => summary.scheduled += 1,
            Err(e) => {
                warn!(session_id = %workload.session_id, error = %e, "could not place workload this tick, left pending");
                summary.unplaced += 1;
            }
        }
    }

    info!(
        scheduled = summary.scheduled,
        rejected = summary.rejected,
        deferred = summary.deferred,
        unplaced = summary.unplaced,
        "tick complete"
    );
    Ok(summary)
}

/// Failure modes of a single tick.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// The tick lock backend failed outright (not merely busy).
    #[error(transparent)]
    Lock(#[from] LockError),
    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsched_bus::InMemoryBus;
    use fleetsched_lock::backends::FileLockBackend;
    use fleetsched_store_core::AgentRepository;
    use fleetsched_store_memory::InMemoryStore;
    use fleetsched_types::{
        Agent, AgentLiveness, AgentId, ClusterMode, ClusterRole, DomainId, GroupId, KernelSpec,
        KeypairId, Owner, PrioritizerKind, ResourceSlot, ScalingGroupName, SelectorStrategy,
        SessionId, SessionType, SessionWorkload, UserId,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn config() -> SchedulingConfig {
        SchedulingConfig {
            scaling_group: ScalingGroupName::new("default"),
            scheduler_name: PrioritizerKind::Fifo,
            strategy: SelectorStrategy::Legacy,
            max_container_count: None,
            enforce_spreading_endpoint_replica: false,
            agent_selection_resource_priority: vec![],
            permitted_session_types: vec![SessionType::Interactive],
        }
    }

    fn workload() -> SessionWorkload {
        SessionWorkload {
            session_id: SessionId::new(),
            owner: Owner {
                keypair: KeypairId("kp".into()),
                user: UserId(Uuid::new_v4()),
                group: GroupId(Uuid::new_v4()),
                domain: DomainId("default".into()),
            },
            session_type: SessionType::Interactive,
            cluster_mode: ClusterMode::SingleNode,
            cluster_size: 1,
            kernels: vec![KernelSpec {
                kernel_id: fleetsched_types::KernelId::new(),
                architecture: "x86_64".into(),
                requested_slots: ResourceSlot::from_pairs([("cpu", dec!(2))]),
                image: "img".into(),
                designated_agent: None,
                cluster_role: ClusterRole::Main,
            }],
            priority: 0,
            enqueue_timestamp: Utc::now(),
            starts_at: None,
            scaling_group: ScalingGroupName::new("default"),
            inference_endpoint_id: None,
        }
    }

    #[tokio::test]
    async fn schedules_a_pending_workload_under_the_tick_lock() {
        let store = InMemoryStore::new();
        store
            .put_agent(Agent {
                id: AgentId::new("a1"),
                addr: "a1:6001".into(),
                architecture: "x86_64".into(),
                scaling_group: ScalingGroupName::new("default"),
                available_slots: ResourceSlot::from_pairs([("cpu", dec!(8))]),
                occupied_slots: ResourceSlot::empty(),
                container_count: 0,
                liveness: AgentLiveness::Alive,
                last_check: Utc::now(),
                consecutive_missed_heartbeats: 0,
                version: 0,
            })
            .await
            .unwrap();
        store.enqueue_workload(workload()).await.unwrap();

        let bus = InMemoryBus::default();
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLockBackend::new(dir.path());
        let mut cursor = RoundRobinCursor::new();

        let summary = run_tick(&store, &bus, &lock, &ScalingGroupName::new("default"), &config(), &mut cursor)
            .await
            .unwrap()
            .expect("lock was free");

        assert_eq!(summary.scheduled, 1);
        assert_eq!(summary.rejected, 0);
    }

    #[tokio::test]
    async fn rejected_workload_stays_queued_and_records_status_history() {
        let store = InMemoryStore::new();
        let mut cfg = config();
        cfg.permitted_session_types = vec![SessionType::Batch];
        let w = workload();
        store.enqueue_workload(w.clone()).await.unwrap();

        let bus = InMemoryBus::default();
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLockBackend::new(dir.path());
        let mut cursor = RoundRobinCursor::new();

        let summary = run_tick(&store, &bus, &lock, &ScalingGroupName::new("default"), &cfg, &mut cursor)
            .await
            .unwrap()
            .expect("lock was free");

        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.scheduled, 0);

        let still_pending = store.pending_workloads(&ScalingGroupName::new("default")).await.unwrap();
        assert_eq!(still_pending.len(), 1, "a rejected workload must remain in the queue for retry");

        let history = store.status_history(&w.kernels[0].kernel_id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(matches!(&history[0].reason, StatusReason::Other(s) if s.contains("admission.rejected")));
    }

    #[tokio::test]
    async fn busy_lock_skips_the_cycle_without_error() {
        let store = InMemoryStore::new();
        let bus = InMemoryBus::default();
        let dir = tempfile::tempdir().unwrap();
        let lock = FileLockBackend::new(dir.path());
        let group = ScalingGroupName::new("default");
        let held = lock.acquire(&tick_lock_id(&group), TICK_LOCK_LIFETIME).await.unwrap();

        let mut cursor = RoundRobinCursor::new();
        let summary = run_tick(&store, &bus, &lock, &group, &config(), &mut cursor).await.unwrap();
        assert!(summary.is_none());

        lock.release(held).await.unwrap();
    }
}
