#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! In-memory backend for the fleet scheduler's storage traits.
//!
//! All data lives in process memory and is lost on restart; this backend
//! exists for tests and the single-node `schedule-once` CLI path, where a
//! full database is unwarranted. It is organized the same way a real backend
//! would be: one map per entity kind, guarded independently, with the
//! agent map additionally tracking a version counter for the allocator's
//! optimistic-concurrency commit.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use fleetsched_store_core::{
    AgentRepository, KernelRepository, PendingWorkloadQueue, SessionRepository,
    SnapshotRepository, StatusHistoryStore, StoreError,
};
use fleetsched_types::{
    Agent, AgentId, AgentLiveness, ClusterRole, Kernel, KernelId, Occupancy, QuotaState,
    ResourceSlot, ResourceTypeName, ScalingGroupName, Session, SessionId, SessionWorkload,
    StatusHistoryEntry, SystemSnapshot,
};

/// An in-memory, non-persistent store implementing every repository trait
/// the scheduling core depends on. Optimistic concurrency for agents rides
/// on `Agent::version` directly rather than a side table, since the
/// scheduling core already carries that field on the domain type.
#[derive(Default)]
pub struct InMemoryStore {
    agents: DashMap<AgentId, Agent>,
    sessions: DashMap<SessionId, Session>,
    kernels: DashMap<KernelId, Kernel>,
    pending: DashMap<SessionId, SessionWorkload>,
    status_history: DashMap<KernelId, Vec<StatusHistoryEntry>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in an `Arc` for sharing across the daemon's scheduling tasks.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait::async_trait]
impl SnapshotRepository for InMemoryStore {
    async fn snapshot(&self, scaling_group: &ScalingGroupName) -> Result<SystemSnapshot, StoreError> {
        let agents: Vec<Agent> = self
            .agents
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| &a.scaling_group == scaling_group && matches!(a.liveness, AgentLiveness::Alive))
            .collect();

        let mut known_resource_types: Vec<ResourceTypeName> = agents
            .iter()
            .flat_map(|a| a.available_slots.keys().cloned())
            .collect();
        known_resource_types.sort();
        known_resource_types.dedup();

        let mut quota = QuotaState::default();
        for session in self.sessions.iter() {
            let session = session.value();
            if &session.scaling_group != scaling_group {
                continue;
            }
            let occupied: ResourceSlot = session
                .kernels
                .iter()
                .filter(|k| !k.state.is_terminal())
                .map(|k| k.occupied_slots.clone())
                .sum();
            accumulate(&mut quota.keypair_occupancy, session.owner.keypair.clone(), &occupied);
            accumulate(&mut quota.user_occupancy, session.owner.user.clone(), &occupied);
            accumulate(&mut quota.group_occupancy, session.owner.group.clone(), &occupied);
            accumulate(&mut quota.domain_occupancy, session.owner.domain.clone(), &occupied);
        }
        for workload in self.pending.iter() {
            let workload = workload.value();
            if workload.scaling_group != *scaling_group {
                continue;
            }
            let slots = workload.total_requested_slots();
            accumulate_pending(&mut quota.keypair_occupancy, workload.owner.keypair.clone(), &slots);
            accumulate_pending(&mut quota.user_occupancy, workload.owner.user.clone(), &slots);
            accumulate_pending(&mut quota.group_occupancy, workload.owner.group.clone(), &slots);
            accumulate_pending(&mut quota.domain_occupancy, workload.owner.domain.clone(), &slots);
        }

        let mut endpoint_main_kernel_agents: HashMap<String, Vec<AgentId>> = HashMap::new();
        for session in self.sessions.iter() {
            let session = session.value();
            let Some(endpoint_id) = &session.inference_endpoint_id else { continue };
            for kernel in &session.kernels {
                if matches!(kernel.cluster_role, ClusterRole::Main) {
                    if let Some(agent_id) = &kernel.agent_id {
                        endpoint_main_kernel_agents
                            .entry(endpoint_id.clone())
                            .or_default()
                            .push(agent_id.clone());
                    }
                }
            }
        }

        Ok(SystemSnapshot {
            scaling_group: scaling_group.clone(),
            agents,
            quota,
            known_resource_types,
            taken_at: chrono::Utc::now(),
            endpoint_main_kernel_agents,
        })
    }
}

fn accumulate<K: std::hash::Hash + Eq>(map: &mut HashMap<K, Occupancy>, key: K, slots: &ResourceSlot) {
    let entry = map.entry(key).or_default();
    entry.resource_occupancy = &entry.resource_occupancy + slots;
    entry.concurrent_sessions += 1;
}

fn accumulate_pending<K: std::hash::Hash + Eq>(
    map: &mut HashMap<K, Occupancy>,
    key: K,
    slots: &ResourceSlot,
) {
    let entry = map.entry(key).or_default();
    entry.pending_resource_slots = &entry.pending_resource_slots + slots;
    entry.pending_sessions += 1;
}

#[async_trait::async_trait]
impl AgentRepository for InMemoryStore {
    async fn get_agent(&self, id: &AgentId) -> Result<Agent, StoreError> {
        self.agents.get(id).map(|e| e.clone()).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_agents(&self, scaling_group: &ScalingGroupName) -> Result<Vec<Agent>, StoreError> {
        Ok(self
            .agents
            .iter()
            .map(|e| e.value().clone())
            .filter(|a| &a.scaling_group == scaling_group)
            .collect())
    }

    async fn put_agent(&self, mut agent: Agent) -> Result<(), StoreError> {
        agent.version = self.agents.get(&agent.id).map(|e| e.version + 1).unwrap_or(0);
        self.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn compare_and_swap_agent(
        &self,
        mut agent: Agent,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .agents
            .get_mut(&agent.id)
            .ok_or_else(|| StoreError::NotFound(agent.id.to_string()))?;
        if entry.version != expected_version {
            return Err(StoreError::VersionConflict {
                entity: agent.id.to_string(),
                expected: expected_version,
                actual: entry.version,
            });
        }
        agent.version = entry.version + 1;
        *entry = agent;
        Ok(())
    }
}

#[async_trait::async_trait]
impl SessionRepository for InMemoryStore {
    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.sessions.get(id).map(|e| e.clone()).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn put_session(&self, session: Session) -> Result<(), StoreError> {
        self.sessions.insert(session.session_id, session);
        Ok(())
    }
}

#[async_trait::async_trait]
impl PendingWorkloadQueue for InMemoryStore {
    async fn pending_workloads(
        &self,
        scaling_group: &ScalingGroupName,
    ) -> Result<Vec<SessionWorkload>, StoreError> {
        Ok(self
            .pending
            .iter()
            .map(|e| e.value().clone())
            .filter(|w| &w.scaling_group == scaling_group)
            .collect())
    }

    async fn enqueue_workload(&self, workload: SessionWorkload) -> Result<(), StoreError> {
        self.pending.insert(workload.session_id, workload);
        Ok(())
    }

    async fn remove_workload(&self, session_id: &SessionId) -> Result<(), StoreError> {
        self.pending.remove(session_id);
        Ok(())
    }
}

#[async_trait::async_trait]
impl KernelRepository for InMemoryStore {
    async fn get_kernel(&self, id: &KernelId) -> Result<Kernel, StoreError> {
        self.kernels.get(id).map(|e| e.clone()).ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list_kernels(&self, session_id: &SessionId) -> Result<Vec<Kernel>, StoreError> {
        Ok(self
            .kernels
            .iter()
            .map(|e| e.value().clone())
            .filter(|k| &k.session_id == session_id)
            .collect())
    }

    async fn put_kernel(&self, kernel: Kernel) -> Result<(), StoreError> {
        self.kernels.insert(kernel.kernel_id, kernel);
        Ok(())
    }
}

#[async_trait::async_trait]
impl StatusHistoryStore for InMemoryStore {
    async fn append_status_history(
        &self,
        kernel_id: &KernelId,
        entry: StatusHistoryEntry,
    ) -> Result<(), StoreError> {
        let mut history = self.status_history.entry(*kernel_id).or_default();
        if let Some(last) = history.last() {
            if entry.timestamp <= last.timestamp {
                return Err(StoreError::NonMonotoneHistory(*kernel_id));
            }
        }
        history.push(entry);
        Ok(())
    }

    async fn status_history(&self, kernel_id: &KernelId) -> Result<Vec<StatusHistoryEntry>, StoreError> {
        Ok(self.status_history.get(kernel_id).map(|h| h.clone()).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetsched_types::StatusReason;
    use rust_decimal_macros::dec;

    fn agent(scaling_group: &str) -> Agent {
        Agent {
            id: AgentId::new("a1"),
            addr: "10.0.0.1:6001".into(),
            architecture: "x86_64".into(),
            scaling_group: ScalingGroupName::new(scaling_group),
            available_slots: ResourceSlot::from_pairs([("cpu", dec!(8))]),
            occupied_slots: ResourceSlot::empty(),
            container_count: 0,
            liveness: AgentLiveness::Alive,
            last_check: Utc::now(),
            consecutive_missed_heartbeats: 0,
            version: 0,
        }
    }

    #[tokio::test]
    async fn snapshot_includes_only_alive_agents_in_group() {
        let store = InMemoryStore::new();
        let mut lost = agent("default");
        lost.id = AgentId::new("a2");
        lost.liveness = AgentLiveness::Lost;
        store.put_agent(agent("default")).await.unwrap();
        store.put_agent(lost).await.unwrap();
        store.put_agent(agent("other")).await.unwrap();

        let snap = store.snapshot(&ScalingGroupName::new("default")).await.unwrap();
        assert_eq!(snap.agents.len(), 1);
        assert_eq!(snap.agents[0].id, AgentId::new("a1"));
    }

    #[tokio::test]
    async fn compare_and_swap_rejects_stale_version() {
        let store = InMemoryStore::new();
        store.put_agent(agent("default")).await.unwrap();
        let current = store.get_agent(&AgentId::new("a1")).await.unwrap();

        store.compare_and_swap_agent(current.clone(), 0).await.unwrap();
        let stale_result = store.compare_and_swap_agent(current, 0).await;
        assert!(matches!(stale_result, Err(StoreError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn status_history_rejects_non_monotone_timestamp() {
        let store = InMemoryStore::new();
        let kernel_id = KernelId::new();
        let t0 = Utc::now();
        store
            .append_status_history(
                &kernel_id,
                StatusHistoryEntry {
                    state: fleetsched_types::KernelState::Pending,
                    timestamp: t0,
                    reason: StatusReason::Other("enqueued".into()),
                    detail: None,
                },
            )
            .await
            .unwrap();

        let result = store
            .append_status_history(
                &kernel_id,
                StatusHistoryEntry {
                    state: fleetsched_types::KernelState::Scheduled,
                    timestamp: t0,
                    reason: StatusReason::SchedulerAssigned,
                    detail: None,
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::NonMonotoneHistory(_))));
    }

    #[tokio::test]
    async fn pending_queue_round_trips() {
        use fleetsched_types::{ClusterMode, Owner, SessionType};

        let store = InMemoryStore::new();
        let workload = SessionWorkload {
            session_id: SessionId::new(),
            owner: Owner {
                keypair: fleetsched_types::KeypairId("kp".into()),
                user: fleetsched_types::UserId(uuid::Uuid::new_v4()),
                group: fleetsched_types::GroupId(uuid::Uuid::new_v4()),
                domain: fleetsched_types::DomainId("default".into()),
            },
            session_type: SessionType::Interactive,
            cluster_mode: ClusterMode::SingleNode,
            cluster_size: 1,
            kernels: vec![],
            priority: 0,
            enqueue_timestamp: Utc::now(),
            starts_at: None,
            scaling_group: ScalingGroupName::new("default"),
            inference_endpoint_id: None,
        };
        let session_id = workload.session_id;
        store.enqueue_workload(workload).await.unwrap();
        assert_eq!(
            store.pending_workloads(&ScalingGroupName::new("default")).await.unwrap().len(),
            1
        );
        store.remove_workload(&session_id).await.unwrap();
        assert!(store.pending_workloads(&ScalingGroupName::new("default")).await.unwrap().is_empty());
    }
}
