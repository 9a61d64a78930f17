#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Agent RPC transport for the fleet scheduler core (spec.md §4.9).
//!
//! [`AgentTransport`] is the trait the allocator and termination controller
//! call through; [`AgentConnectionPool`] wraps any implementation with
//! per-agent timeout and backoff so a flapping agent doesn't get hammered.
//! [`MockTransport`] backs tests and the `schedule-once` dry-run path;
//! [`TcpFramedTransport`] is the placeholder seam for a real wire protocol.

pub mod error;
pub mod mock;
pub mod pool;
pub mod tcp;
pub mod transport;

pub use error::TransportError;
pub use mock::{MockAgentBehavior, MockTransport};
pub use pool::AgentConnectionPool;
pub use tcp::TcpFramedTransport;
pub use transport::{
    AgentTelemetry, AgentTransport, KernelCreateRequest, KernelCreateResponse,
    DEFAULT_CREATE_TIMEOUT, DEFAULT_DESTROY_TIMEOUT, DEFAULT_TELEMETRY_TIMEOUT,
};
