//! Scaling-group scheduling configuration and quota policy (spec.md §3, §6).

use serde::{Deserialize, Serialize};

use crate::ids::ScalingGroupName;
use crate::resource_slot::{ResourceSlot, ResourceTypeName};
use crate::session::SessionType;

/// Which prioritizer variant a scaling group uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrioritizerKind {
    /// First-in, first-out.
    Fifo,
    /// Last-in, first-out.
    Lifo,
    /// Dominant Resource Fairness.
    Drf,
}

/// Which agent-selection strategy a scaling group uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorStrategy {
    /// Pack onto already-busy agents.
    Concentrated,
    /// Spread across agents.
    Dispersed,
    /// Deterministic cycling.
    RoundRobin,
    /// Legacy tie-break compatible with older deployments.
    Legacy,
}

/// Per-scaling-group scheduling configuration (spec.md §3 `SchedulingConfig`,
/// §6 "Scaling-group configuration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    /// Name of this scaling group.
    pub scaling_group: ScalingGroupName,
    /// Prioritizer variant.
    pub scheduler_name: PrioritizerKind,
    /// Agent-selection strategy.
    pub strategy: SelectorStrategy,
    /// Maximum containers per agent; `None` means unbounded.
    pub max_container_count: Option<u32>,
    /// Whether inference endpoint replicas must spread across agents.
    pub enforce_spreading_endpoint_replica: bool,
    /// Ordered resource types used to break agent-selection ties; unlisted
    /// types compare as least significant.
    pub agent_selection_resource_priority: Vec<ResourceTypeName>,
    /// Session types permitted in this scaling group (validator check 1).
    pub permitted_session_types: Vec<SessionType>,
}

/// Per-principal (keypair/user/group/domain) quota limits (spec.md §4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Maximum resource occupancy.
    pub resource_limit: ResourceSlot,
    /// Maximum number of concurrently running/scheduled sessions.
    pub max_concurrent_sessions: Option<u32>,
    /// Maximum number of sessions that may sit pending simultaneously.
    pub max_pending_sessions: Option<u32>,
    /// Maximum aggregate resource slots reserved by pending sessions.
    pub max_pending_resource_slots: Option<ResourceSlot>,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            resource_limit: ResourceSlot::empty(),
            max_concurrent_sessions: None,
            max_pending_sessions: None,
            max_pending_resource_slots: None,
        }
    }
}
