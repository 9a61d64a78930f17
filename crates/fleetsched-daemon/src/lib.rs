#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Scheduler daemon: wires the prioritizer, validator, agent selector,
//! allocator, and termination controller into a running process (spec.md
//! §1, §6).
//!
//! The binary target (`src/main.rs`) is a thin CLI shell; the scheduling
//! behaviour itself — configuration, tick execution, and the exit-code
//! mapping — lives here so it can be exercised from integration tests
//! without spawning a process.

pub mod config;
pub mod error;
pub mod tick;

pub use config::{LockBackendKind, SchedulerConfig};
pub use error::SchedulerError;
pub use tick::{run_tick, TickError, TickSummary};

pub use fleetsched_termination::{request_and_terminate, request_termination, terminate_session, TerminationReport};
