//! Real wire transport placeholder.
//!
//! A production deployment speaks a framed binary protocol over a persistent
//! TCP connection per agent; implementing that wire format is out of scope
//! for this core (spec.md §1). This stub exists so the crate graph and the
//! daemon's configuration surface (`transport = "tcp"` vs `"mock"`) are
//! already shaped for the real implementation to drop in.

use async_trait::async_trait;
use fleetsched_types::KernelId;

use crate::error::TransportError;
use crate::transport::{AgentTelemetry, AgentTransport, KernelCreateRequest, KernelCreateResponse};

/// Unimplemented TCP transport. Every call fails with `Unreachable` carrying
/// a descriptive reason, so misconfiguration surfaces immediately rather
/// than hanging on a connect that will never succeed.
#[derive(Debug, Default)]
pub struct TcpFramedTransport;

impl TcpFramedTransport {
    /// Construct the placeholder transport.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentTransport for TcpFramedTransport {
    async fn create_kernel(
        &self,
        agent_addr: &str,
        _request: KernelCreateRequest,
    ) -> Result<KernelCreateResponse, TransportError> {
        Err(TransportError::Unreachable {
            agent_addr: agent_addr.to_string(),
            reason: "tcp transport not implemented in this core".to_string(),
        })
    }

    async fn destroy_kernel(
        &self,
        agent_addr: &str,
        _kernel_id: KernelId,
        _container_id: &str,
    ) -> Result<(), TransportError> {
        Err(TransportError::Unreachable {
            agent_addr: agent_addr.to_string(),
            reason: "tcp transport not implemented in this core".to_string(),
        })
    }

    async fn get_telemetry(&self, agent_addr: &str) -> Result<AgentTelemetry, TransportError> {
        Err(TransportError::Unreachable {
            agent_addr: agent_addr.to_string(),
            reason: "tcp transport not implemented in this core".to_string(),
        })
    }
}
