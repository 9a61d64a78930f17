#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Pure scheduling core for the fleet scheduler (spec.md §4, components
//! C1-C4 and C8's shared helpers).
//!
//! Every public function here is synchronous and takes an already-taken
//! [`fleetsched_types::SystemSnapshot`] by reference: no I/O, no `.await`,
//! no yielding mid-tick (spec.md §5). The daemon (`fleetsched-daemon`)
//! drives these functions from within its own async tick loop; the
//! allocator (`fleetsched-allocator`) and termination controller
//! (`fleetsched-termination`) own turning their results into committed
//! state.

pub mod prioritizer;
pub mod selector;
pub mod state_machine;
pub mod validator;

pub use prioritizer::prioritize;
pub use selector::{select_agent, NoEligibleAgent, RoundRobinCursor};
pub use state_machine::{has_no_destroyable_kernels, is_destroyable, session_fully_terminal, status_changed};
pub use validator::{validate, QuotaLevel, RejectReason};
