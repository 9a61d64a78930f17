//! Per-agent backoff gate and timeout enforcement around an
//! [`AgentTransport`]. The allocator and termination controller call through
//! this pool rather than the raw transport so a flapping agent doesn't get
//! hammered with retries on every tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use fleetsched_types::KernelId;
use tracing::warn;

use crate::error::TransportError;
use crate::transport::{
    AgentTelemetry, AgentTransport, KernelCreateRequest, KernelCreateResponse,
    DEFAULT_CREATE_TIMEOUT, DEFAULT_DESTROY_TIMEOUT, DEFAULT_TELEMETRY_TIMEOUT,
};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

struct BackoffState {
    blocked_until: Instant,
    current_backoff: Duration,
}

/// Wraps any [`AgentTransport`] with a per-agent-address timeout and
/// exponential backoff gate.
pub struct AgentConnectionPool<T: AgentTransport> {
    transport: Arc<T>,
    backoff: DashMap<String, BackoffState>,
}

impl<T: AgentTransport> AgentConnectionPool<T> {
    /// Build a pool around `transport`.
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport, backoff: DashMap::new() }
    }

    fn gate(&self, agent_addr: &str) -> Result<(), TransportError> {
        if let Some(state) = self.backoff.get(agent_addr) {
            if Instant::now() < state.blocked_until {
                return Err(TransportError::Unreachable {
                    agent_addr: agent_addr.to_string(),
                    reason: "agent in backoff after recent failure".to_string(),
                });
            }
        }
        Ok(())
    }

    fn record_success(&self, agent_addr: &str) {
        self.backoff.remove(agent_addr);
    }

    fn record_failure(&self, agent_addr: &str) {
        let mut state = self.backoff.entry(agent_addr.to_string()).or_insert_with(|| BackoffState {
            blocked_until: Instant::now(),
            current_backoff: INITIAL_BACKOFF,
        });
        let next_backoff = (state.current_backoff * 2).min(MAX_BACKOFF);
        state.current_backoff = next_backoff;
        state.blocked_until = Instant::now() + next_backoff;
    }

    async fn run_with_timeout<F, R>(
        &self,
        agent_addr: &str,
        timeout: Duration,
        call: F,
    ) -> Result<R, TransportError>
    where
        F: std::future::Future<Output = Result<R, TransportError>>,
    {
        self.gate(agent_addr)?;
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, call).await;
        let result = match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout {
                agent_addr: agent_addr.to_string(),
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        };
        match &result {
            Ok(_) => self.record_success(agent_addr),
            Err(e) if e.is_retryable() => {
                warn!(agent_addr, error = %e, "rpc call failed, backing off");
                self.record_failure(agent_addr);
            }
            Err(_) => {}
        }
        result
    }

    /// Create a kernel on `agent_addr`, subject to the default timeout and
    /// this pool's backoff gate.
    pub async fn create_kernel(
        &self,
        agent_addr: &str,
        request: KernelCreateRequest,
    ) -> Result<KernelCreateResponse, TransportError> {
        self.run_with_timeout(agent_addr, DEFAULT_CREATE_TIMEOUT, self.transport.create_kernel(agent_addr, request))
            .await
    }

    /// Destroy a kernel on `agent_addr`, subject to the default timeout and
    /// this pool's backoff gate.
    pub async fn destroy_kernel(
        &self,
        agent_addr: &str,
        kernel_id: KernelId,
        container_id: &str,
    ) -> Result<(), TransportError> {
        self.run_with_timeout(
            agent_addr,
            DEFAULT_DESTROY_TIMEOUT,
            self.transport.destroy_kernel(agent_addr, kernel_id, container_id),
        )
        .await
    }

    /// Poll telemetry from `agent_addr`, subject to the default timeout and
    /// this pool's backoff gate.
    pub async fn get_telemetry(&self, agent_addr: &str) -> Result<AgentTelemetry, TransportError> {
        self.run_with_timeout(agent_addr, DEFAULT_TELEMETRY_TIMEOUT, self.transport.get_telemetry(agent_addr))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockAgentBehavior, MockTransport};
    use fleetsched_types::ClusterRole;
    use fleetsched_types::ResourceSlot;

    #[tokio::test]
    async fn failed_call_triggers_backoff_for_subsequent_calls() {
        let transport = Arc::new(MockTransport::new());
        transport.set_behavior("a1", MockAgentBehavior { reject_with: None, unreachable: true });
        let pool = AgentConnectionPool::new(transport);

        let req = || KernelCreateRequest {
            kernel_id: KernelId::new(),
            image: "x".into(),
            requested_slots: ResourceSlot::empty(),
            cluster_role: ClusterRole::Main,
        };

        assert!(pool.create_kernel("a1", req()).await.is_err());
        // Second call should be gated locally, without reaching the transport.
        let err = pool.create_kernel("a1", req()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unreachable { .. }));
    }

    #[tokio::test]
    async fn success_clears_backoff() {
        let transport = Arc::new(MockTransport::new());
        let pool = AgentConnectionPool::new(transport);
        let req = KernelCreateRequest {
            kernel_id: KernelId::new(),
            image: "x".into(),
            requested_slots: ResourceSlot::empty(),
            cluster_role: ClusterRole::Main,
        };
        pool.create_kernel("a1", req).await.unwrap();
        assert!(pool.backoff.get("a1").is_none());
    }
}
