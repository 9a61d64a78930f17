//! C8: state-machine helpers shared by the allocator (C5) and termination
//! controller (C7). The legal-transition graph itself lives on
//! [`fleetsched_types::Kernel`] as `try_transition`; this module holds the
//! higher-level predicates built on top of it.

use fleetsched_types::{Kernel, KernelState, Session, SessionStatus};

/// A kernel can only be destroyed once the agent has actually created a
/// container for it. A kernel that reached TERMINATING without ever
/// obtaining a `container_id` (e.g. it was still PENDING when the session
/// was cancelled) has nothing to destroy on the wire.
pub fn is_destroyable(kernel: &Kernel) -> bool {
    kernel.state == KernelState::Terminating && kernel.container_id.is_some()
}

/// Whether every kernel in `session` has reached a terminal state.
pub fn session_fully_terminal(session: &Session) -> bool {
    session.kernels.iter().all(|k| k.state.is_terminal())
}

/// Whether `session` has at least one kernel requesting termination but none
/// of them are destroyable — the degenerate case Open Question 3 resolves:
/// the session stays TERMINATING rather than being force-marked TERMINATED,
/// since nothing was actually running to confirm destroyed.
pub fn has_no_destroyable_kernels(session: &Session) -> bool {
    let terminating: Vec<&Kernel> = session
        .kernels
        .iter()
        .filter(|k| k.state == KernelState::Terminating)
        .collect();
    !terminating.is_empty() && terminating.iter().all(|k| !is_destroyable(k))
}

/// Derive the session-level status and, if it differs from `previous`,
/// return the new value. Thin wrapper over [`Session::derive_status`] so
/// callers get an `Option` they can use to decide whether a status-history
/// write is needed at the session level.
pub fn status_changed(session: &Session, previous: SessionStatus) -> Option<SessionStatus> {
    let current = session.derive_status();
    if current == previous {
        None
    } else {
        Some(current)
    }
}
