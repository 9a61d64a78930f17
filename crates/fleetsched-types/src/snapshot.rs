//! `SystemSnapshot`: the immutable, per-tick read of fleet + quota state
//! (spec.md §3, component C1).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agent::Agent;
use crate::ids::{AgentId, DomainId, GroupId, KeypairId, ScalingGroupName, UserId};
use crate::policy::QuotaLimits;
use crate::resource_slot::{ResourceSlot, ResourceTypeName};

/// Current committed usage for one principal at one quota level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Occupancy {
    /// Resources currently occupied by this principal's running/scheduled
    /// sessions.
    pub resource_occupancy: ResourceSlot,
    /// Number of concurrently running/scheduled sessions.
    pub concurrent_sessions: u32,
    /// Number of sessions currently pending.
    pub pending_sessions: u32,
    /// Aggregate resource slots reserved by pending sessions.
    pub pending_resource_slots: ResourceSlot,
}

/// Quota occupancy + limits for every level, keyed by principal id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaState {
    /// Per-keypair occupancy.
    pub keypair_occupancy: HashMap<KeypairId, Occupancy>,
    /// Per-keypair limits.
    pub keypair_limits: HashMap<KeypairId, QuotaLimits>,
    /// Per-user occupancy.
    pub user_occupancy: HashMap<UserId, Occupancy>,
    /// Per-user limits.
    pub user_limits: HashMap<UserId, QuotaLimits>,
    /// Per-group occupancy.
    pub group_occupancy: HashMap<GroupId, Occupancy>,
    /// Per-group limits.
    pub group_limits: HashMap<GroupId, QuotaLimits>,
    /// Per-domain occupancy.
    pub domain_occupancy: HashMap<DomainId, Occupancy>,
    /// Per-domain limits.
    pub domain_limits: HashMap<DomainId, QuotaLimits>,
}

/// An immutable, consistent read of one scaling group's state, frozen for
/// the duration of one scheduler tick (spec.md §4.1).
///
/// `SystemSnapshot` is a pure value object: it carries no I/O capability and
/// is entirely owned by the tick that created it, discarded at tick end
/// (spec.md §3 "Ownership in design terms").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Scaling group this snapshot describes.
    pub scaling_group: ScalingGroupName,
    /// ALIVE agents in the group at snapshot time.
    pub agents: Vec<Agent>,
    /// Per-principal occupancies and limits.
    pub quota: QuotaState,
    /// Resource-slot type names known to the system at snapshot time.
    pub known_resource_types: Vec<ResourceTypeName>,
    /// Wall-clock instant the snapshot was taken.
    pub taken_at: chrono::DateTime<chrono::Utc>,
    /// Endpoint id -> set of agent ids already hosting a `main` kernel of one
    /// of that endpoint's replicas, used for spreading precheck (spec.md §4.4).
    pub endpoint_main_kernel_agents: HashMap<String, Vec<AgentId>>,
}

impl SystemSnapshot {
    /// Find an agent by id within this snapshot.
    pub fn agent(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.iter().find(|a| &a.id == id)
    }

    /// Whether the snapshot is stale relative to `now` and a max tick age —
    /// spec.md §4.1 "stale snapshots ... are discarded, never reused."
    pub fn is_stale(&self, now: chrono::DateTime<chrono::Utc>, max_age: chrono::Duration) -> bool {
        now.signed_duration_since(self.taken_at) > max_age
    }
}
