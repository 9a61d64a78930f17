//! Session and workload types (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{Owner, ScalingGroupName, SessionId};
use crate::kernel::{Kernel, KernelSpec, KernelState};

/// The purpose of a session, affecting admission and scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionType {
    /// Interactive (notebook/shell) session.
    Interactive,
    /// One-shot batch job.
    Batch,
    /// Long-running inference deployment replica.
    Inference,
    /// Internal/system session (not user-billable).
    System,
}

/// Whether a session spans one agent or many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMode {
    /// All kernels must land on a single agent.
    SingleNode,
    /// Kernels may be spread across multiple agents.
    MultiNode,
}

/// A pending workload as seen by the prioritizer/validator/selector — the
/// read-only, to-be-scheduled counterpart of a `Session` (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionWorkload {
    /// Unique session id.
    pub session_id: SessionId,
    /// Owner chain for quota checks.
    pub owner: Owner,
    /// Session type.
    pub session_type: SessionType,
    /// Cluster mode.
    pub cluster_mode: ClusterMode,
    /// Number of kernels requested (cluster size), >= 1.
    pub cluster_size: u32,
    /// One entry per container.
    pub kernels: Vec<KernelSpec>,
    /// Scheduling priority; higher schedules first under FIFO/LIFO.
    pub priority: i64,
    /// When the workload was enqueued.
    pub enqueue_timestamp: DateTime<Utc>,
    /// Optional deferral: the workload is not eligible before this instant.
    pub starts_at: Option<DateTime<Utc>>,
    /// Scaling group this workload targets.
    pub scaling_group: ScalingGroupName,
    /// Endpoint id this workload is a replica of, if it is an inference
    /// replica subject to spreading (spec.md §4.4).
    pub inference_endpoint_id: Option<String>,
}

impl SessionWorkload {
    /// Sum of requested slots across every kernel in the workload.
    pub fn total_requested_slots(&self) -> crate::resource_slot::ResourceSlot {
        self.kernels
            .iter()
            .map(|k| k.requested_slots.clone())
            .sum()
    }

    /// Whether the workload is still deferred at `now`.
    pub fn is_deferred(&self, now: DateTime<Utc>) -> bool {
        matches!(self.starts_at, Some(t) if t > now)
    }

    /// Whether this workload is a spreading-subject inference replica.
    pub fn is_inference_replica(&self) -> bool {
        matches!(self.session_type, SessionType::Inference) && self.inference_endpoint_id.is_some()
    }
}

/// A materialized session: the aggregate-of-kernels view used once a
/// workload has entered the scheduling pipeline and may already have
/// allocated kernels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session id.
    pub session_id: SessionId,
    /// Owner chain.
    pub owner: Owner,
    /// Session type.
    pub session_type: SessionType,
    /// Cluster mode.
    pub cluster_mode: ClusterMode,
    /// Scaling group binding.
    pub scaling_group: ScalingGroupName,
    /// Scheduling priority.
    pub priority: i64,
    /// Kernels belonging to this session.
    pub kernels: Vec<Kernel>,
    /// Inference endpoint this is a replica of, if any.
    pub inference_endpoint_id: Option<String>,
}

/// Derived, session-level status as a function of its kernels (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    /// No kernel has been scheduled yet.
    Pending,
    /// The allocator has committed kernel bindings.
    Scheduled,
    /// Containers are being created.
    Preparing,
    /// Every kernel is running.
    Running,
    /// At least one kernel is terminating.
    Terminating,
    /// Every kernel is terminated.
    Terminated,
    /// At least one kernel errored and none are running.
    Error,
}

impl Session {
    /// Reduce kernel states into one session-level status, per the ordered
    /// rules of spec.md §4.8:
    /// all RUNNING -> RUNNING; any ERROR and none RUNNING -> ERROR;
    /// any TERMINATING -> TERMINATING; all TERMINATED -> TERMINATED;
    /// otherwise derived from the least-advanced kernel.
    pub fn derive_status(&self) -> SessionStatus {
        if self.kernels.is_empty() {
            return SessionStatus::Pending;
        }
        let all = |p: &dyn Fn(&Kernel) -> bool| self.kernels.iter().all(|k| p(k));
        let any = |p: &dyn Fn(&Kernel) -> bool| self.kernels.iter().any(|k| p(k));

        if all(&|k| k.state == KernelState::Running) {
            return SessionStatus::Running;
        }
        if any(&|k| k.state == KernelState::Error) && !any(&|k| k.state == KernelState::Running) {
            return SessionStatus::Error;
        }
        if any(&|k| k.state == KernelState::Terminating) {
            return SessionStatus::Terminating;
        }
        if all(&|k| k.state == KernelState::Terminated) {
            return SessionStatus::Terminated;
        }
        // Least-advanced kernel, by pipeline order.
        let rank = |s: KernelState| match s {
            KernelState::Pending => 0,
            KernelState::Scheduled => 1,
            KernelState::Preparing => 2,
            KernelState::Running => 3,
            KernelState::Terminating => 4,
            KernelState::Terminated => 5,
            KernelState::Error => 6,
        };
        let least = self
            .kernels
            .iter()
            .min_by_key(|k| rank(k.state))
            .expect("kernels non-empty")
            .state;
        match least {
            KernelState::Pending => SessionStatus::Pending,
            KernelState::Scheduled => SessionStatus::Scheduled,
            KernelState::Preparing => SessionStatus::Preparing,
            KernelState::Running => SessionStatus::Running,
            KernelState::Terminating => SessionStatus::Terminating,
            KernelState::Terminated => SessionStatus::Terminated,
            KernelState::Error => SessionStatus::Error,
        }
    }
}
