//! C4: agent selector (spec.md §4.4).
//!
//! Filters the snapshot's agent list down to those eligible for one kernel,
//! then picks among them according to the scaling group's configured
//! [`SelectorStrategy`]. Pure and synchronous over an already-taken
//! snapshot; the allocator (C5) is responsible for turning the chosen agent
//! id into a committed allocation.

use fleetsched_types::{
    Agent, AgentId, KernelSpec, ResourceTypeName, SchedulingConfig, SelectorStrategy,
    SessionWorkload, SystemSnapshot,
};

/// No agent in the snapshot satisfies every filter for the requested kernel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no eligible agent for kernel {kernel_id}")]
pub struct NoEligibleAgent {
    /// The kernel that could not be placed.
    pub kernel_id: fleetsched_types::KernelId,
}

/// Cursor state for [`SelectorStrategy::RoundRobin`]. Deliberately not part
/// of any persisted type: the cursor lives for one scheduling process and
/// resets on restart, per the round-robin fairness window this strategy
/// promises (spec.md open question — process/tick-local cursor, not a
/// globally persisted one).
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    next_index: usize,
}

impl RoundRobinCursor {
    /// Fresh cursor starting at index 0.
    pub fn new() -> Self {
        Self::default()
    }
}

fn eligible_agents<'a>(
    snapshot: &'a SystemSnapshot,
    kernel: &KernelSpec,
    workload: &SessionWorkload,
    config: &SchedulingConfig,
) -> Vec<&'a Agent> {
    snapshot
        .agents
        .iter()
        .filter(|agent| agent.is_schedulable())
        .filter(|agent| agent.architecture == kernel.architecture)
        .filter(|agent| kernel.requested_slots.le(&agent.remaining_slots()))
        .filter(|agent| match &kernel.designated_agent {
            Some(designated) => &agent.id == designated,
            None => true,
        })
        .filter(|agent| match config.max_container_count {
            Some(max) => agent.container_count < max,
            None => true,
        })
        .filter(|agent| spreading_ok(snapshot, agent, kernel, workload, config))
        .collect()
}

fn spreading_ok(
    snapshot: &SystemSnapshot,
    agent: &Agent,
    kernel: &KernelSpec,
    workload: &SessionWorkload,
    config: &SchedulingConfig,
) -> bool {
    if !config.enforce_spreading_endpoint_replica {
        return true;
    }
    if !matches!(kernel.cluster_role, fleetsched_types::ClusterRole::Main) || !workload.is_inference_replica() {
        return true;
    }
    let Some(endpoint_id) = &workload.inference_endpoint_id else { return true };
    match snapshot.endpoint_main_kernel_agents.get(endpoint_id) {
        Some(agents) => !agents.contains(&agent.id),
        None => true,
    }
}

/// Pick the agent already hosting the most kernels, breaking ties by least
/// remaining capacity that still fits the request — bin-packing to
/// concentrate load on already-occupied agents first, then minimize
/// fragmentation across the fleet.
fn pick_concentrated<'a>(candidates: &[&'a Agent], config: &SchedulingConfig) -> &'a Agent {
    candidates
        .iter()
        .copied()
        .min_by(|a, b| {
            let by_occupancy = b.container_count.cmp(&a.container_count);
            if by_occupancy != std::cmp::Ordering::Equal {
                return by_occupancy;
            }
            compare_by_priority(&a.remaining_slots(), &b.remaining_slots(), &config.agent_selection_resource_priority)
        })
        .expect("candidates non-empty")
}

/// Pick the agent with the most remaining capacity — spreads load evenly.
fn pick_dispersed<'a>(candidates: &[&'a Agent], config: &SchedulingConfig) -> &'a Agent {
    pick_by_resource_priority_reversed(candidates, config, |agent| agent.remaining_slots())
}

fn pick_by_resource_priority_reversed<'a>(
    candidates: &[&'a Agent],
    config: &SchedulingConfig,
    key: impl Fn(&Agent) -> fleetsched_types::ResourceSlot,
) -> &'a Agent {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| compare_by_priority(&key(a), &key(b), &config.agent_selection_resource_priority))
        .expect("candidates non-empty")
}

fn compare_by_priority(
    a: &fleetsched_types::ResourceSlot,
    b: &fleetsched_types::ResourceSlot,
    priority: &[ResourceTypeName],
) -> std::cmp::Ordering {
    for resource in priority {
        let ord = a.get(resource).cmp(&b.get(resource));
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    // Fewer left-over resource types unused is preferred once the priority
    // list is exhausted, as a final deterministic tie-break.
    a.count_extras_over(b).cmp(&b.count_extras_over(a))
}

/// Select an agent for `kernel` out of `snapshot`, according to
/// `config.strategy`.
pub fn select_agent(
    snapshot: &SystemSnapshot,
    workload: &SessionWorkload,
    kernel: &KernelSpec,
    config: &SchedulingConfig,
    round_robin_cursor: &mut RoundRobinCursor,
) -> Result<AgentId, NoEligibleAgent> {
    let candidates = eligible_agents(snapshot, kernel, workload, config);
    if candidates.is_empty() {
        return Err(NoEligibleAgent { kernel_id: kernel.kernel_id });
    }

    let chosen = match config.strategy {
        SelectorStrategy::Concentrated => pick_concentrated(&candidates, config),
        SelectorStrategy::Dispersed => pick_dispersed(&candidates, config),
        SelectorStrategy::Legacy => candidates[0],
        SelectorStrategy::RoundRobin => {
            let mut sorted = candidates.clone();
            sorted.sort_by(|a, b| a.id.cmp(&b.id));
            let index = round_robin_cursor.next_index % sorted.len();
            round_robin_cursor.next_index = index + 1;
            sorted[index]
        }
    };
    Ok(chosen.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetsched_types::{
        AgentLiveness, ClusterMode, ClusterRole, DomainId, GroupId, KernelId, KeypairId, Owner,
        PrioritizerKind, ResourceSlot, ScalingGroupName, SessionId, SessionType, UserId,
    };
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn agent(id: &str, remaining_cpu: rust_decimal::Decimal) -> Agent {
        Agent {
            id: AgentId::new(id),
            addr: format!("{id}:6001"),
            architecture: "x86_64".into(),
            scaling_group: ScalingGroupName::new("default"),
            available_slots: ResourceSlot::from_pairs([("cpu", remaining_cpu)]),
            occupied_slots: ResourceSlot::empty(),
            container_count: 0,
            liveness: AgentLiveness::Alive,
            last_check: Utc::now(),
            consecutive_missed_heartbeats: 0,
            version: 0,
        }
    }

    fn snapshot(agents: Vec<Agent>) -> SystemSnapshot {
        SystemSnapshot {
            scaling_group: ScalingGroupName::new("default"),
            agents,
            quota: fleetsched_types::QuotaState::default(),
            known_resource_types: vec![ResourceTypeName::new("cpu")],
            taken_at: Utc::now(),
            endpoint_main_kernel_agents: HashMap::new(),
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
            kernels: vec![],
            priority: 0,
            enqueue_timestamp: Utc::now(),
            starts_at: None,
            scaling_group: ScalingGroupName::new("default"),
            inference_endpoint_id: None,
        }
    }

    fn kernel_spec() -> KernelSpec {
        KernelSpec {
            kernel_id: KernelId::new(),
            architecture: "x86_64".into(),
            requested_slots: ResourceSlot::from_pairs([("cpu", dec!(2))]),
            image: "img".into(),
            designated_agent: None,
            cluster_role: ClusterRole::Main,
        }
    }

    fn config(strategy: SelectorStrategy) -> SchedulingConfig {
        SchedulingConfig {
            scaling_group: ScalingGroupName::new("default"),
            scheduler_name: PrioritizerKind::Fifo,
            strategy,
            max_container_count: None,
            enforce_spreading_endpoint_replica: false,
            agent_selection_resource_priority: vec![ResourceTypeName::new("cpu")],
            permitted_session_types: vec![SessionType::Interactive],
        }
    }

    #[test]
    fn concentrated_picks_tightest_fit() {
        let snap = snapshot(vec![agent("loose", dec!(16)), agent("tight", dec!(2))]);
        let mut cursor = RoundRobinCursor::new();
        let chosen = select_agent(&snap, &workload(), &kernel_spec(), &config(SelectorStrategy::Concentrated), &mut cursor).unwrap();
        assert_eq!(chosen, AgentId::new("tight"));
    }

    #[test]
    fn concentrated_prefers_already_occupied_agent_over_equal_capacity() {
        let mut occupied = agent("occupied", dec!(8));
        occupied.container_count = 3;
        let empty = agent("empty", dec!(8));
        let snap = snapshot(vec![empty, occupied]);
        let mut cursor = RoundRobinCursor::new();
        let chosen = select_agent(&snap, &workload(), &kernel_spec(), &config(SelectorStrategy::Concentrated), &mut cursor).unwrap();
        assert_eq!(chosen, AgentId::new("occupied"));
    }

    #[test]
    fn dispersed_picks_roomiest() {
        let snap = snapshot(vec![agent("loose", dec!(16)), agent("tight", dec!(2))]);
        let mut cursor = RoundRobinCursor::new();
        let chosen = select_agent(&snap, &workload(), &kernel_spec(), &config(SelectorStrategy::Dispersed), &mut cursor).unwrap();
        assert_eq!(chosen, AgentId::new("loose"));
    }

    #[test]
    fn round_robin_cycles_between_calls() {
        let snap = snapshot(vec![agent("a", dec!(8)), agent("b", dec!(8))]);
        let mut cursor = RoundRobinCursor::new();
        let cfg = config(SelectorStrategy::RoundRobin);
        let first = select_agent(&snap, &workload(), &kernel_spec(), &cfg, &mut cursor).unwrap();
        let second = select_agent(&snap, &workload(), &kernel_spec(), &cfg, &mut cursor).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn no_eligible_agent_when_resources_insufficient() {
        let snap = snapshot(vec![agent("a", dec!(1))]);
        let mut cursor = RoundRobinCursor::new();
        let err = select_agent(&snap, &workload(), &kernel_spec(), &config(SelectorStrategy::Legacy), &mut cursor);
        assert!(err.is_err());
    }

    #[test]
    fn designated_agent_overrides_strategy() {
        let snap = snapshot(vec![agent("loose", dec!(16)), agent("tight", dec!(2))]);
        let mut spec = kernel_spec();
        spec.designated_agent = Some(AgentId::new("loose"));
        let mut cursor = RoundRobinCursor::new();
        let chosen = select_agent(&snap, &workload(), &spec, &config(SelectorStrategy::Concentrated), &mut cursor).unwrap();
        assert_eq!(chosen, AgentId::new("loose"));
    }
}
