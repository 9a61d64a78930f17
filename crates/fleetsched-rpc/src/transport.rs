//! The `AgentTransport` contract: what C5 (allocator) and C7 (termination)
//! need from an agent over the wire (spec.md §4.9). The wire protocol itself
//! (framing, auth, TLS) is out of scope per spec.md §1 — this trait is the
//! integration seam a real transport plugs into.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fleetsched_types::{ClusterRole, KernelId, ResourceSlot};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Default timeout for a `create_kernel` call.
pub const DEFAULT_CREATE_TIMEOUT: Duration = Duration::from_secs(30);
/// Default timeout for a `destroy_kernel` call.
pub const DEFAULT_DESTROY_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for a `get_telemetry` call.
pub const DEFAULT_TELEMETRY_TIMEOUT: Duration = Duration::from_secs(5);

/// What the allocator sends an agent to start one container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelCreateRequest {
    /// Kernel being created.
    pub kernel_id: KernelId,
    /// Container image reference.
    pub image: String,
    /// Resources committed to this kernel.
    pub requested_slots: ResourceSlot,
    /// Cluster role, so the agent can configure cluster env vars.
    pub cluster_role: ClusterRole,
}

/// What the agent returns once the container has been created (not
/// necessarily running yet — that transition arrives later via the event
/// channel or the next telemetry poll).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelCreateResponse {
    /// Container id assigned by the agent's runtime.
    pub container_id: String,
}

/// A point-in-time read of one agent's reported state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTelemetry {
    /// Resources currently occupied, as reported by the agent itself —
    /// used to reconcile against the scheduler's own bookkeeping.
    pub occupied_slots: ResourceSlot,
    /// Number of containers the agent reports running.
    pub container_count: u32,
    /// Timestamp the agent attached to this reading.
    pub reported_at: DateTime<Utc>,
}

/// RPC surface the scheduling core needs from an agent node.
#[async_trait]
pub trait AgentTransport: Send + Sync {
    /// Ask the agent at `agent_addr` to create a container for `request`.
    async fn create_kernel(
        &self,
        agent_addr: &str,
        request: KernelCreateRequest,
    ) -> Result<KernelCreateResponse, TransportError>;

    /// Ask the agent at `agent_addr` to destroy `container_id`.
    async fn destroy_kernel(
        &self,
        agent_addr: &str,
        kernel_id: KernelId,
        container_id: &str,
    ) -> Result<(), TransportError>;

    /// Poll the agent at `agent_addr` for its current telemetry snapshot.
    async fn get_telemetry(&self, agent_addr: &str) -> Result<AgentTelemetry, TransportError>;
}
