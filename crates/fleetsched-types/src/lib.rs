#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **fleetsched-types** – Shared primitive data structures for the fleet
//! scheduler core.
//!
//! This crate is dependency-light and sits at the bottom of the crate graph
//! so every other crate can depend on it without causing cycles. It makes no
//! assumptions about I/O, persistence, or RPC transport — those concerns live
//! in `fleetsched-store-core`, `fleetsched-rpc`, and friends.

pub mod agent;
pub mod allocation;
pub mod ids;
pub mod kernel;
pub mod policy;
pub mod resource_slot;
pub mod session;
pub mod snapshot;

pub use agent::{Agent, AgentLiveness};
pub use allocation::{AgentAllocation, KernelAllocation, SessionAllocation, TickAllocationBatch};
pub use ids::{
    AgentId, DomainId, GroupId, KeypairId, KernelId, Owner, ScalingGroupName, SessionId, UserId,
};
pub use kernel::{
    ClusterRole, IllegalTransition, Kernel, KernelSpec, KernelState, StatusHistoryEntry,
    StatusReason,
};
pub use policy::{PrioritizerKind, QuotaLimits, SchedulingConfig, SelectorStrategy};
pub use resource_slot::{MismatchedResourceKeys, ResourceSlot, ResourceTypeName};
pub use session::{ClusterMode, Session, SessionStatus, SessionType, SessionWorkload};
pub use snapshot::{Occupancy, QuotaState, SystemSnapshot};
