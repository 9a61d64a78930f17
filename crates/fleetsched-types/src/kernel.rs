//! Kernel state machine types (spec.md §3, §4.8 — component C8).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, KernelId, SessionId};
use crate::resource_slot::ResourceSlot;

/// Lifecycle state of a single kernel (one container within a session).
///
/// Legal transitions are exactly those drawn in spec.md §4.8:
/// `PENDING -> SCHEDULED -> PREPARING -> RUNNING -> TERMINATING -> TERMINATED`,
/// with a transition to `ERROR` legal from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KernelState {
    /// Queued, not yet bound to an agent.
    Pending,
    /// Bound to an agent by the allocator; container not yet created.
    Scheduled,
    /// Container create/start in flight on the agent.
    Preparing,
    /// Container running.
    Running,
    /// Marked for destruction; destroy RPC in flight or pending retry.
    Terminating,
    /// Destroyed successfully.
    Terminated,
    /// Irrecoverable failure.
    Error,
}

impl KernelState {
    /// Whether `self -> next` is a legal transition per spec.md §4.8.
    pub fn can_transition_to(self, next: KernelState) -> bool {
        use KernelState::*;
        if next == Error {
            // Any non-terminal state may transition to Error.
            return !matches!(self, Terminated | Error);
        }
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Scheduled, Preparing)
                | (Preparing, Running)
                | (Pending, Terminating)
                | (Scheduled, Terminating)
                | (Preparing, Terminating)
                | (Running, Terminating)
                | (Terminating, Terminated)
        )
    }

    /// True once the kernel has an agent binding (state >= Scheduled), per
    /// invariant 3 in spec.md §3.
    pub fn has_agent_binding(self) -> bool {
        !matches!(self, KernelState::Pending)
    }

    /// True if this is one of the two terminal states.
    pub fn is_terminal(self) -> bool {
        matches!(self, KernelState::Terminated | KernelState::Error)
    }
}

/// Reason recorded alongside a status_history transition.
///
/// A closed set of the reasons the scheduling core itself produces, plus an
/// escape hatch for reasons originating outside this core (agent-reported
/// events, operator actions) — mirrors the `#[non_exhaustive]` event pattern
/// used for lifecycle events elsewhere in this workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StatusReason {
    /// Set by the allocator after a successful commit (spec.md §4.5 step 2).
    SchedulerAssigned,
    /// Set by the external container-create actor.
    ContainerPreparing,
    /// Set on the agent's "kernel-started" event.
    AgentKernelStarted,
    /// Set by user action, idle-timeout, or session-lifetime policy.
    TerminationRequested,
    /// Set by the termination controller after a successful destroy.
    TerminationCompleted,
    /// Set when a destroy RPC attempt failed; the kernel stays TERMINATING.
    TerminationAttemptFailed,
    /// Set on an irrecoverable failure.
    ErrorOccurred,
    /// Anything else (admission rejection messages, operator notes, ...).
    Other(String),
}

impl std::fmt::Display for StatusReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatusReason::SchedulerAssigned => write!(f, "scheduler.assigned"),
            StatusReason::ContainerPreparing => write!(f, "container.preparing"),
            StatusReason::AgentKernelStarted => write!(f, "agent.kernel_started"),
            StatusReason::TerminationRequested => write!(f, "termination.requested"),
            StatusReason::TerminationCompleted => write!(f, "termination.completed"),
            StatusReason::TerminationAttemptFailed => write!(f, "termination.attempt_failed"),
            StatusReason::ErrorOccurred => write!(f, "error"),
            StatusReason::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One append-only entry in a kernel's or session's status history.
///
/// Invariant 4 (spec.md §3): the sequence this belongs to is strictly
/// monotone in `timestamp` and entries are never deleted or rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    /// The state entered at `timestamp`.
    pub state: KernelState,
    /// Wall-clock UTC timestamp of the transition.
    pub timestamp: DateTime<Utc>,
    /// Structured reason for the transition.
    pub reason: StatusReason,
    /// Optional human-readable detail (e.g. a transport error message).
    pub detail: Option<String>,
}

/// The cluster role a kernel plays within a multi-node session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterRole {
    /// The primary container of the session.
    Main,
    /// A secondary container; `N` is its 1-based index among sub roles.
    Sub(u32),
}

impl std::fmt::Display for ClusterRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterRole::Main => write!(f, "main"),
            ClusterRole::Sub(n) => write!(f, "sub-{n}"),
        }
    }
}

/// A single container specification inside a `SessionWorkload`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelSpec {
    /// Unique id of this kernel.
    pub kernel_id: KernelId,
    /// Required CPU architecture, e.g. `x86_64`.
    pub architecture: String,
    /// Resources requested for this kernel.
    pub requested_slots: ResourceSlot,
    /// Container image reference.
    pub image: String,
    /// Operator-forced placement, if any (spec.md §4.3 check 5).
    pub designated_agent: Option<AgentId>,
    /// Cluster role this kernel plays.
    pub cluster_role: ClusterRole,
}

/// A live kernel: the mutable, stateful counterpart of a `KernelSpec` once it
/// has entered the scheduling pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kernel {
    /// Unique id of this kernel.
    pub kernel_id: KernelId,
    /// Owning session.
    pub session_id: SessionId,
    /// Required CPU architecture.
    pub architecture: String,
    /// Current lifecycle state.
    pub state: KernelState,
    /// Resources committed to this kernel once scheduled (empty before).
    pub occupied_slots: ResourceSlot,
    /// Agent hosting this kernel, set iff `state.has_agent_binding()`.
    pub agent_id: Option<AgentId>,
    /// Agent network address, mirrored alongside `agent_id` for RPC dispatch.
    pub agent_addr: Option<String>,
    /// Container id on the agent, `None` until the container actually starts.
    pub container_id: Option<String>,
    /// Cluster role.
    pub cluster_role: ClusterRole,
    /// Append-only transition history.
    pub status_history: Vec<StatusHistoryEntry>,
}

impl Kernel {
    /// Construct a brand-new PENDING kernel from a spec.
    pub fn new_pending(session_id: SessionId, spec: &KernelSpec, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            kernel_id: spec.kernel_id,
            session_id,
            architecture: spec.architecture.clone(),
            state: KernelState::Pending,
            occupied_slots: ResourceSlot::empty(),
            agent_id: None,
            agent_addr: None,
            container_id: None,
            cluster_role: spec.cluster_role.clone(),
            status_history: vec![StatusHistoryEntry {
                state: KernelState::Pending,
                timestamp: enqueued_at,
                reason: StatusReason::Other("enqueued".to_string()),
                detail: None,
            }],
        }
    }

    /// Append a transition if and only if it is legal; otherwise return the
    /// attempted-but-illegal pair so the caller can decide how to react
    /// (log, raise `InvariantViolation`, ...).
    pub fn try_transition(
        &mut self,
        next: KernelState,
        timestamp: DateTime<Utc>,
        reason: StatusReason,
        detail: Option<String>,
    ) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        if let Some(last) = self.status_history.last() {
            if timestamp < last.timestamp {
                return Err(IllegalTransition {
                    from: self.state,
                    to: next,
                });
            }
        }
        self.state = next;
        self.status_history.push(StatusHistoryEntry {
            state: next,
            timestamp,
            reason,
            detail,
        });
        Ok(())
    }
}

/// Raised when a caller attempts an illegal state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal kernel transition {from:?} -> {to:?}")]
pub struct IllegalTransition {
    /// State the kernel was in.
    pub from: KernelState,
    /// State the caller attempted to move it to.
    pub to: KernelState,
}
