#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! C5: transactional allocator commit (spec.md §4.5).
//!
//! Turns the pure agent-selection decisions from `fleetsched-core` into
//! persisted state: binds every kernel in a session to its chosen agent
//! under optimistic concurrency, re-verifying `occupied <= available` at
//! commit time (the snapshot the selection ran against may already be
//! stale), appends the resulting status-history entries, and publishes
//! `SessionScheduled` once the whole session has committed. A session's
//! kernels commit all-or-nothing: if any kernel cannot be placed or its
//! commit keeps losing the optimistic-concurrency race, the whole session
//! is left pending rather than partially scheduled.

use chrono::{DateTime, Utc};
use fleetsched_bus::{EventBus, LifecycleEvent};
use fleetsched_core::{select_agent, NoEligibleAgent, RoundRobinCursor};
use fleetsched_store_core::{AgentRepository, KernelRepository, PendingWorkloadQueue, SessionRepository, StatusHistoryStore, StoreError};
use fleetsched_types::{
    Kernel, KernelSpec, KernelState, SchedulingConfig, Session, SessionWorkload, StatusReason,
    SystemSnapshot,
};
use tracing::{info, instrument, warn};

/// Maximum number of optimistic-concurrency retries per kernel before the
/// allocator gives up on the whole session for this tick.
const MAX_COMMIT_RETRIES: u32 = 3;

/// Everything the allocator needs persisted; implemented for any store that
/// carries all five underlying repository traits (e.g. `InMemoryStore`).
pub trait AllocatorStore:
    AgentRepository + SessionRepository + KernelRepository + StatusHistoryStore + PendingWorkloadQueue
{
}

impl<T> AllocatorStore for T where
    T: AgentRepository + SessionRepository + KernelRepository + StatusHistoryStore + PendingWorkloadQueue
{
}

/// Failure modes of a session-level allocation attempt.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    /// No agent in the snapshot satisfies one of the session's kernels.
    #[error(transparent)]
    NoEligibleAgent(#[from] NoEligibleAgent),

    /// The chosen agent no longer has capacity by the time of commit.
    #[error("agent {agent_id} no longer has capacity for kernel {kernel_id}")]
    CapacityExceeded {
        /// Agent that lost capacity between selection and commit.
        agent_id: fleetsched_types::AgentId,
        /// Kernel that could not be placed.
        kernel_id: fleetsched_types::KernelId,
    },

    /// The agent's version kept changing underneath the commit attempt.
    #[error("exhausted retries committing kernel {kernel_id} to agent {agent_id}")]
    ConcurrentConflict {
        /// Agent the kernel was being committed to.
        agent_id: fleetsched_types::AgentId,
        /// Kernel that could not be committed.
        kernel_id: fleetsched_types::KernelId,
    },

    /// A transition the allocator attempted was illegal per the kernel state
    /// machine — should not happen for a freshly-PENDING kernel, but guards
    /// against a caller re-allocating an already-scheduled kernel.
    #[error(transparent)]
    IllegalTransition(#[from] fleetsched_types::IllegalTransition),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Attempt to place and commit every kernel of `workload`, returning the
/// materialized [`Session`] on success. On any failure, no partial state is
/// left committed for kernels not yet reached by the attempt, but kernels
/// already committed earlier in this same call are not rolled back — a
/// multi-node session that fails placement for its third kernel is reported
/// to the caller as a failure so it can fall back to de-scheduling the
/// already-bound ones, per spec.md §4.5's note that cross-kernel rollback is
/// the caller's responsibility, not the allocator's.
///
/// `snapshot` is mutated in place after each successful placement — both the
/// chosen agent's `occupied_slots`/`container_count` and, for an inference
/// replica's main kernel, `endpoint_main_kernel_agents` — so that later
/// kernels in this same session, and later workloads in the same tick, see
/// the updated occupancy rather than the snapshot's original read.
#[instrument(skip(store, bus, snapshot, workload, config, cursor), fields(session_id = %workload.session_id))]
pub async fn allocate_session<S: AllocatorStore, B: EventBus>(
    store: &S,
    bus: &B,
    snapshot: &mut SystemSnapshot,
    workload: &SessionWorkload,
    config: &SchedulingConfig,
    cursor: &mut RoundRobinCursor,
    now: DateTime<Utc>,
) -> Result<Session, AllocationError> {
    let mut kernels = Vec::with_capacity(workload.kernels.len());
    for spec in &workload.kernels {
        let agent_id = select_agent(snapshot, workload, spec, config, cursor)?;
        let kernel = commit_one_kernel(store, spec, &agent_id, workload.session_id, now).await?;
        apply_in_tick_placement(snapshot, workload, spec, &agent_id);
        kernels.push(kernel);
    }

    let session = Session {
        session_id: workload.session_id,
        owner: workload.owner.clone(),
        session_type: workload.session_type,
        cluster_mode: workload.cluster_mode,
        scaling_group: workload.scaling_group.clone(),
        priority: workload.priority,
        kernels,
        inference_endpoint_id: workload.inference_endpoint_id.clone(),
    };
    store.put_session(session.clone()).await?;
    store.remove_workload(&workload.session_id).await?;

    if let Err(e) = bus.publish(LifecycleEvent::SessionScheduled {
        session_id: workload.session_id,
        scaling_group: workload.scaling_group.clone(),
    }) {
        warn!(error = %e, "failed to publish SessionScheduled, continuing — commit already happened");
    }
    info!(kernels = session.kernels.len(), "session scheduled");

    Ok(session)
}

/// Reflect a just-committed placement in the in-tick snapshot so subsequent
/// selections see it (spec.md §4.4: "subsequent blocks ... see the updated
/// state").
fn apply_in_tick_placement(
    snapshot: &mut SystemSnapshot,
    workload: &SessionWorkload,
    spec: &KernelSpec,
    agent_id: &fleetsched_types::AgentId,
) {
    if let Some(agent) = snapshot.agents.iter_mut().find(|a| &a.id == agent_id) {
        agent.occupied_slots = &agent.occupied_slots + &spec.requested_slots;
        agent.container_count += 1;
    }
    if matches!(spec.cluster_role, fleetsched_types::ClusterRole::Main) && workload.is_inference_replica() {
        if let Some(endpoint_id) = &workload.inference_endpoint_id {
            snapshot
                .endpoint_main_kernel_agents
                .entry(endpoint_id.clone())
                .or_default()
                .push(agent_id.clone());
        }
    }
}

async fn commit_one_kernel<S: AllocatorStore>(
    store: &S,
    spec: &KernelSpec,
    agent_id: &fleetsched_types::AgentId,
    session_id: fleetsched_types::SessionId,
    now: DateTime<Utc>,
) -> Result<Kernel, AllocationError> {
    for _ in 0..MAX_COMMIT_RETRIES {
        let agent = store.get_agent(agent_id).await?;
        if !spec.requested_slots.le(&agent.remaining_slots()) {
            return Err(AllocationError::CapacityExceeded {
                agent_id: agent_id.clone(),
                kernel_id: spec.kernel_id,
            });
        }

        let mut updated = agent.clone();
        updated.occupied_slots = &updated.occupied_slots + &spec.requested_slots;
        updated.container_count += 1;

        match store.compare_and_swap_agent(updated, agent.version).await {
            Ok(()) => {
                let mut kernel = Kernel::new_pending(session_id, spec, now);
                kernel.try_transition(KernelState::Scheduled, now, StatusReason::SchedulerAssigned, None)?;
                kernel.agent_id = Some(agent_id.clone());
                kernel.agent_addr = Some(agent.addr.clone());
                kernel.occupied_slots = spec.requested_slots.clone();

                let entry = kernel.status_history.last().cloned().expect("try_transition appended an entry");
                store.append_status_history(&kernel.kernel_id, entry).await?;
                store.put_kernel(kernel.clone()).await?;
                return Ok(kernel);
            }
            Err(StoreError::VersionConflict { .. }) => continue,
            Err(e) => return Err(AllocationError::Store(e)),
        }
    }
    Err(AllocationError::ConcurrentConflict { agent_id: agent_id.clone(), kernel_id: spec.kernel_id })
}
