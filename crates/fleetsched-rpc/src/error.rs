//! Transport-level errors (spec.md §4.9).

/// Failure modes an [`crate::AgentTransport`] call can surface. The
/// allocator and termination controller distinguish `Timeout`/`Unreachable`
/// (retryable, agent presumed alive-but-slow-or-unreachable) from `Rejected`
/// (the agent itself refused the call; retrying won't help).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The call did not complete within its configured timeout.
    #[error("rpc to {agent_addr} timed out after {elapsed_ms}ms")]
    Timeout {
        /// Address of the agent the call targeted.
        agent_addr: String,
        /// How long the call ran before timing out.
        elapsed_ms: u64,
    },

    /// No connection could be established or an established connection was
    /// lost mid-call.
    #[error("agent {agent_addr} unreachable: {reason}")]
    Unreachable {
        /// Address of the agent the call targeted.
        agent_addr: String,
        /// Transport-level detail (connection refused, reset, ...).
        reason: String,
    },

    /// The agent responded with an application-level rejection.
    #[error("agent {agent_addr} rejected call: {reason}")]
    Rejected {
        /// Address of the agent the call targeted.
        agent_addr: String,
        /// Reason reported by the agent.
        reason: String,
    },
}

impl TransportError {
    /// Whether retrying the same call against the same agent is worth
    /// attempting. `Rejected` is not: the agent has spoken.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected { .. })
    }
}
