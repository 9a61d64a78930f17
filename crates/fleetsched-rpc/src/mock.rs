//! In-memory transport used by tests and the `schedule-once` CLI dry-run
//! path — lets the allocator/termination controller be exercised without a
//! real agent fleet.

use chrono::Utc;
use dashmap::DashMap;
use fleetsched_types::{KernelId, ResourceSlot};

use async_trait::async_trait;

use crate::error::TransportError;
use crate::transport::{AgentTelemetry, AgentTransport, KernelCreateRequest, KernelCreateResponse};

/// Scripted behavior for one agent address.
#[derive(Clone, Debug, Default)]
pub struct MockAgentBehavior {
    /// If set, every call against this address fails with this rejection.
    pub reject_with: Option<String>,
    /// If set, every call against this address fails as unreachable.
    pub unreachable: bool,
}

/// A fully in-process stand-in for [`AgentTransport`], with per-agent
/// scriptable failure modes and a call log for assertions.
#[derive(Default)]
pub struct MockTransport {
    behaviors: DashMap<String, MockAgentBehavior>,
    created: DashMap<String, u32>,
    destroyed: DashMap<String, u32>,
}

impl MockTransport {
    /// Construct a transport where every agent behaves successfully by
    /// default.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `agent_addr` to fail every subsequent call in the given way.
    pub fn set_behavior(&self, agent_addr: impl Into<String>, behavior: MockAgentBehavior) {
        self.behaviors.insert(agent_addr.into(), behavior);
    }

    /// Number of `create_kernel` calls observed for `agent_addr`.
    pub fn created_count(&self, agent_addr: &str) -> u32 {
        self.created.get(agent_addr).map(|v| *v).unwrap_or(0)
    }

    /// Number of `destroy_kernel` calls observed for `agent_addr`.
    pub fn destroyed_count(&self, agent_addr: &str) -> u32 {
        self.destroyed.get(agent_addr).map(|v| *v).unwrap_or(0)
    }

    fn check_behavior(&self, agent_addr: &str) -> Result<(), TransportError> {
        if let Some(behavior) = self.behaviors.get(agent_addr) {
            if behavior.unreachable {
                return Err(TransportError::Unreachable {
                    agent_addr: agent_addr.to_string(),
                    reason: "scripted unreachable".to_string(),
                });
            }
            if let Some(reason) = &behavior.reject_with {
                return Err(TransportError::Rejected {
                    agent_addr: agent_addr.to_string(),
                    reason: reason.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AgentTransport for MockTransport {
    async fn create_kernel(
        &self,
        agent_addr: &str,
        request: KernelCreateRequest,
    ) -> Result<KernelCreateResponse, TransportError> {
        self.check_behavior(agent_addr)?;
        *self.created.entry(agent_addr.to_string()).or_insert(0) += 1;
        Ok(KernelCreateResponse { container_id: format!("mock-{}", request.kernel_id) })
    }

    async fn destroy_kernel(
        &self,
        agent_addr: &str,
        _kernel_id: KernelId,
        _container_id: &str,
    ) -> Result<(), TransportError> {
        self.check_behavior(agent_addr)?;
        *self.destroyed.entry(agent_addr.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn get_telemetry(&self, agent_addr: &str) -> Result<AgentTelemetry, TransportError> {
        self.check_behavior(agent_addr)?;
        Ok(AgentTelemetry {
            occupied_slots: ResourceSlot::empty(),
            container_count: self.created_count(agent_addr),
            reported_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsched_types::ClusterRole;

    #[tokio::test]
    async fn rejected_behavior_is_not_retryable() {
        let transport = MockTransport::new();
        transport.set_behavior("a1", MockAgentBehavior { reject_with: Some("no image".into()), unreachable: false });
        let err = transport
            .create_kernel(
                "a1",
                KernelCreateRequest {
                    kernel_id: KernelId::new(),
                    image: "x".into(),
                    requested_slots: ResourceSlot::empty(),
                    cluster_role: ClusterRole::Main,
                },
            )
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn successful_create_increments_count() {
        let transport = MockTransport::new();
        transport
            .create_kernel(
                "a1",
                KernelCreateRequest {
                    kernel_id: KernelId::new(),
                    image: "x".into(),
                    requested_slots: ResourceSlot::empty(),
                    cluster_role: ClusterRole::Main,
                },
            )
            .await
            .unwrap();
        assert_eq!(transport.created_count("a1"), 1);
    }
}
