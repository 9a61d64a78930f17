#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **fleetsched-bus** – Lifecycle event bus and message-queue adapter for
//! the fleet scheduler core.
//!
//! This crate sits at the deterministic-adjacent layer: the `EventBus`
//! abstraction itself is lightweight, in-memory, and synchronous-to-publish;
//! the `MessageQueue` adds the at-least-once, consumer-group, auto-claim
//! semantics spec.md §4.10 requires of the external message broker contract.
//! Neither is load-bearing for scheduling correctness (spec.md §4.10) — they
//! exist for wakeups and downstream notification only.

pub mod events;
pub mod mq;

pub use events::{EventBus, InMemoryBus, LifecycleEvent};
pub use mq::{MessageId, MessageQueue, WakeupReason};
