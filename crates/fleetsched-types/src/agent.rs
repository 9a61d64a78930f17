//! Agent fleet types (spec.md §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AgentId, ScalingGroupName};
use crate::resource_slot::ResourceSlot;

/// Liveness status of an agent, as tracked by the heartbeat protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentLiveness {
    /// Heartbeating normally.
    Alive,
    /// Missed enough consecutive heartbeats to be presumed down.
    Lost,
    /// Explicitly unregistered/decommissioned.
    Terminated,
}

/// An agent node: a member of exactly one scaling group, exposing a fixed
/// capacity of typed resource slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Unique id.
    pub id: AgentId,
    /// Network address for RPC dispatch (spec.md §4.9).
    pub addr: String,
    /// CPU architecture tag, e.g. `x86_64`, `aarch64`.
    pub architecture: String,
    /// Scaling group this agent belongs to.
    pub scaling_group: ScalingGroupName,
    /// Total advertised capacity.
    pub available_slots: ResourceSlot,
    /// Currently committed usage. Invariant 1 (spec.md §3):
    /// `occupied_slots <= available_slots` componentwise at every commit point.
    pub occupied_slots: ResourceSlot,
    /// Number of containers currently placed on this agent.
    pub container_count: u32,
    /// Liveness status.
    pub liveness: AgentLiveness,
    /// Timestamp of the last accepted heartbeat.
    pub last_check: DateTime<Utc>,
    /// Consecutive heartbeats missed since the last successful one; resets to
    /// zero on every accepted heartbeat. Drives the ALIVE -> LOST transition.
    pub consecutive_missed_heartbeats: u32,
    /// Optimistic-concurrency version, bumped on every persisted occupancy
    /// change. The allocator's commit step uses this to detect a concurrent
    /// writer and abort rather than overwrite.
    pub version: u64,
}

impl Agent {
    /// Resources still free for new allocations.
    pub fn remaining_slots(&self) -> ResourceSlot {
        &self.available_slots - &self.occupied_slots
    }

    /// Whether this agent can currently accept new work at all.
    pub fn is_schedulable(&self) -> bool {
        matches!(self.liveness, AgentLiveness::Alive)
    }

    /// Record a missed heartbeat, flipping to LOST past `max_missed`.
    pub fn record_missed_heartbeat(&mut self, max_missed: u32) {
        self.consecutive_missed_heartbeats += 1;
        if self.consecutive_missed_heartbeats >= max_missed {
            self.liveness = AgentLiveness::Lost;
        }
    }

    /// Record a successful heartbeat at `at`, resetting the miss counter and
    /// restoring ALIVE status if the agent had not been explicitly
    /// unregistered.
    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_check = at;
        self.consecutive_missed_heartbeats = 0;
        if matches!(self.liveness, AgentLiveness::Lost) {
            self.liveness = AgentLiveness::Alive;
        }
    }
}
