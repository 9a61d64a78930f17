//! The result of one scheduling tick: per-session, per-agent allocation
//! decisions (spec.md §3, consumed by component C5).

use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, KernelId, SessionId};
use crate::kernel::ClusterRole;
use crate::resource_slot::ResourceSlot;

/// Where one kernel landed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelAllocation {
    /// Kernel being allocated.
    pub kernel_id: KernelId,
    /// Agent it was assigned to.
    pub agent_id: AgentId,
    /// Agent network address, cached for RPC dispatch.
    pub agent_addr: String,
    /// Resources committed to this kernel.
    pub occupied_slots: ResourceSlot,
    /// Cluster role.
    pub cluster_role: ClusterRole,
}

/// All kernel placements for one session produced by one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAllocation {
    /// Session being scheduled.
    pub session_id: SessionId,
    /// Per-kernel placements.
    pub kernels: Vec<KernelAllocation>,
}

/// The aggregate slot delta to apply to one agent as a result of a tick's
/// allocations, so the allocator can commit one atomic update per agent
/// rather than one per kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAllocation {
    /// Agent receiving new load.
    pub agent_id: AgentId,
    /// Sum of newly-committed slots across every kernel placed on this agent
    /// in this tick.
    pub slot_delta: ResourceSlot,
    /// Number of new containers placed on this agent in this tick.
    pub container_delta: u32,
}

/// The complete output of assigning every admitted workload in one tick —
/// input to `allocate()` (spec.md §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickAllocationBatch {
    /// Per-session kernel placements.
    pub sessions: Vec<SessionAllocation>,
    /// Per-agent aggregate deltas.
    pub agents: Vec<AgentAllocation>,
}
