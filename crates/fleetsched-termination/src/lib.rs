#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! C7: termination controller (spec.md §4.7).
//!
//! Two phases, deliberately kept separate: [`request_termination`] flips a
//! session's non-terminal kernels to TERMINATING (a pure, fast persisted
//! write any caller — user action, idle-timeout sweep, lifetime policy —
//! can trigger); [`terminate_session`] then does the actual destroy fan-out
//! against already-TERMINATING kernels, one RPC per kernel, all concurrent,
//! with per-kernel failure isolated from the rest of the session.

use chrono::{DateTime, Utc};
use fleetsched_bus::{EventBus, LifecycleEvent};
use fleetsched_core::{has_no_destroyable_kernels, is_destroyable, session_fully_terminal};
use fleetsched_rpc::{AgentConnectionPool, AgentTransport};
use fleetsched_store_core::{KernelRepository, SessionRepository, StatusHistoryStore, StoreError};
use fleetsched_types::{Kernel, KernelState, Session, SessionId, StatusReason};
use tracing::{info, instrument, warn};

/// Everything the termination controller needs persisted.
pub trait TerminationStore: SessionRepository + KernelRepository + StatusHistoryStore {}

impl<T> TerminationStore for T where T: SessionRepository + KernelRepository + StatusHistoryStore {}

/// Failure modes of a termination attempt.
#[derive(Debug, thiserror::Error)]
pub enum TerminationError {
    /// A transition the controller attempted was illegal — guards against
    /// calling `terminate_session` on a session no kernel of which is
    /// TERMINATING yet.
    #[error(transparent)]
    IllegalTransition(#[from] fleetsched_types::IllegalTransition),

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one destroy fan-out pass over a session's TERMINATING kernels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Session this report describes.
    pub session_id: Option<SessionId>,
    /// Kernels successfully destroyed this pass.
    pub destroyed: u32,
    /// Kernels whose destroy RPC failed this pass; they remain TERMINATING
    /// for a future pass to retry.
    pub failed: u32,
    /// Kernels left TERMINATING with nothing to destroy on the wire
    /// (Open Question 3 — never force-completed, only resolved once the
    /// owning session is otherwise fully terminal).
    pub stuck_without_container: u32,
    /// Whether every kernel in the session reached a terminal state by the
    /// end of this pass, triggering `SessionTerminated`.
    pub session_fully_terminal: bool,
}

/// Flip every non-terminal kernel of `session_id` to TERMINATING, recording
/// `reason` in each kernel's status history. Idempotent: kernels already
/// terminal or already TERMINATING are left untouched.
#[instrument(skip(store), fields(session_id = %session_id))]
pub async fn request_termination<S: TerminationStore>(
    store: &S,
    session_id: SessionId,
    now: DateTime<Utc>,
    reason: StatusReason,
) -> Result<Session, TerminationError> {
    let mut session = store.get_session(&session_id).await?;
    for kernel in &mut session.kernels {
        if kernel.state.is_terminal() || kernel.state == KernelState::Terminating {
            continue;
        }
        kernel.try_transition(KernelState::Terminating, now, reason.clone(), None)?;
        let entry = kernel.status_history.last().cloned().expect("try_transition appended an entry");
        store.append_status_history(&kernel.kernel_id, entry).await?;
        store.put_kernel(kernel.clone()).await?;
    }
    store.put_session(session.clone()).await?;
    Ok(session)
}

/// Run one destroy fan-out pass: every TERMINATING kernel with a
/// `container_id` gets a concurrent `destroy_kernel` RPC. A kernel whose
/// call succeeds moves to TERMINATED; one whose call fails stays
/// TERMINATING, recorded with `TerminationAttemptFailed`, for the next pass
/// to retry. Once every kernel in the session is terminal, the session is
/// persisted and `SessionTerminated` is published.
#[instrument(skip(store, pool, bus), fields(session_id = %session_id))]
pub async fn terminate_session<S: TerminationStore, T: AgentTransport, B: EventBus>(
    store: &S,
    pool: &AgentConnectionPool<T>,
    bus: &B,
    session_id: SessionId,
    now: DateTime<Utc>,
) -> Result<TerminationReport, TerminationError> {
    let mut session = store.get_session(&session_id).await?;

    let destroy_targets: Vec<Kernel> = session
        .kernels
        .iter()
        .filter(|k| is_destroyable(k))
        .cloned()
        .collect();

    let results = futures::future::join_all(destroy_targets.iter().map(|kernel| async {
        let agent_addr = kernel.agent_addr.as_deref().expect("destroyable kernel has an agent binding");
        let container_id = kernel.container_id.as_deref().expect("destroyable kernel has a container id");
        let outcome = pool.destroy_kernel(agent_addr, kernel.kernel_id, container_id).await;
        (kernel.kernel_id, outcome)
    }))
    .await;

    let mut report = TerminationReport { session_id: Some(session_id), ..Default::default() };

    for (kernel_id, outcome) in results {
        let kernel = session
            .kernels
            .iter_mut()
            .find(|k| k.kernel_id == kernel_id)
            .expect("destroy target came from this session's kernel list");
        match outcome {
            Ok(()) => {
                kernel.try_transition(KernelState::Terminated, now, StatusReason::TerminationCompleted, None)?;
                report.destroyed += 1;
            }
            Err(e) => {
                warn!(kernel_id = %kernel_id, error = %e, "destroy_kernel failed, will retry next pass");
                kernel.status_history.push(fleetsched_types::StatusHistoryEntry {
                    state: kernel.state,
                    timestamp: now,
                    reason: StatusReason::TerminationAttemptFailed,
                    detail: Some(e.to_string()),
                });
                report.failed += 1;
            }
        }
        let entry = kernel.status_history.last().cloned().expect("a history entry was just pushed");
        store.append_status_history(&kernel.kernel_id, entry).await?;
        store.put_kernel(kernel.clone()).await?;
    }

    report.stuck_without_container = session
        .kernels
        .iter()
        .filter(|k| k.state == KernelState::Terminating && !is_destroyable(k))
        .count() as u32;

    if has_no_destroyable_kernels(&session) {
        info!("session has no destroyable kernels remaining, leaving TERMINATING");
    }

    report.session_fully_terminal = session_fully_terminal(&session);
    store.put_session(session.clone()).await?;

    if report.session_fully_terminal {
        if let Err(e) = bus.publish(LifecycleEvent::SessionTerminated { session_id }) {
            warn!(error = %e, "failed to publish SessionTerminated, continuing — commit already happened");
        }
        info!("session fully terminated");
    }

    Ok(report)
}

/// Convenience wrapper combining [`request_termination`] and
/// [`terminate_session`] for callers (the daemon's termination sweep) that
/// always want both phases run back to back for a freshly-requested session.
pub async fn request_and_terminate<S: TerminationStore, T: AgentTransport, B: EventBus>(
    store: &S,
    pool: &AgentConnectionPool<T>,
    bus: &B,
    session_id: SessionId,
    now: DateTime<Utc>,
    reason: StatusReason,
) -> Result<TerminationReport, TerminationError> {
    request_termination(store, session_id, now, reason).await?;
    terminate_session(store, pool, bus, session_id, now).await
}

/// Run [`terminate_session`] over a batch of sessions concurrently, isolating
/// one session's store/transport error from the rest of the batch.
pub async fn terminate_sessions<S: TerminationStore, T: AgentTransport, B: EventBus>(
    store: &S,
    pool: &AgentConnectionPool<T>,
    bus: &B,
    session_ids: &[SessionId],
    now: DateTime<Utc>,
) -> Vec<Result<TerminationReport, TerminationError>> {
    futures::future::join_all(
        session_ids.iter().map(|id| terminate_session(store, pool, bus, *id, now)),
    )
    .await
}
