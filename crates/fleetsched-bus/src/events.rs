//! Lifecycle events published by the scheduling core (spec.md §4.5 step 5,
//! §4.7 step 5, §7).

use serde::{Deserialize, Serialize};

use fleetsched_types::{AgentId, ScalingGroupName, SessionId};

/// Canonical lifecycle event enumeration emitted after a successful state
/// transition. Event delivery is at-least-once; handlers must be idempotent
/// keyed by `session_id` (spec.md §4.5 step 5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum LifecycleEvent {
    /// Published once per session after the allocator commits its kernel
    /// bindings. Topic: `session.scheduled`.
    SessionScheduled {
        /// The session that was scheduled.
        session_id: SessionId,
        /// Scaling group it was scheduled into.
        scaling_group: ScalingGroupName,
    },
    /// Published once a session's kernels have all been destroyed
    /// successfully. Topic: `session.terminated`.
    SessionTerminated {
        /// The session that finished terminating.
        session_id: SessionId,
    },
    /// Published when a workload fails admission (spec.md §7
    /// `AdmissionRejected`). Topic: `session.rejected`.
    SessionRejected {
        /// The rejected session.
        session_id: SessionId,
        /// Human-readable reason.
        reason: String,
    },
    /// Published when an agent's liveness flips to LOST. Topic:
    /// `agent.lost`.
    AgentLost {
        /// The agent that stopped heartbeating.
        agent_id: AgentId,
    },
}

impl LifecycleEvent {
    /// The topic this event is published to; used by `MessageQueue::publish`.
    pub fn topic(&self) -> &'static str {
        match self {
            LifecycleEvent::SessionScheduled { .. } => "session.scheduled",
            LifecycleEvent::SessionTerminated { .. } => "session.terminated",
            LifecycleEvent::SessionRejected { .. } => "session.rejected",
            LifecycleEvent::AgentLost { .. } => "agent.lost",
        }
    }

    /// The idempotency key a handler should dedupe on.
    pub fn idempotency_key(&self) -> String {
        match self {
            LifecycleEvent::SessionScheduled { session_id, .. }
            | LifecycleEvent::SessionTerminated { session_id }
            | LifecycleEvent::SessionRejected { session_id, .. } => session_id.to_string(),
            LifecycleEvent::AgentLost { agent_id } => agent_id.to_string(),
        }
    }
}

/// Core event bus abstraction for publishing and subscribing to lifecycle
/// events in-process. The scheduler relies on this only for wakeups and
/// downstream notifications, never for correctness of scheduling decisions
/// (spec.md §4.10).
pub trait EventBus: Send + Sync {
    /// Publish an event to all subscribers. Must complete quickly and not
    /// block the caller.
    fn publish(&self, event: LifecycleEvent) -> anyhow::Result<()>;

    /// Subscribe to the live event stream.
    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent>;
}

/// Simple in-memory, broadcast-only event bus.
#[derive(Debug, Clone)]
pub struct InMemoryBus {
    tx: std::sync::Arc<tokio::sync::broadcast::Sender<LifecycleEvent>>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl InMemoryBus {
    /// Create a bus with the given broadcast buffer size.
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(buffer);
        Self { tx: std::sync::Arc::new(tx) }
    }
}

impl EventBus for InMemoryBus {
    fn publish(&self, event: LifecycleEvent) -> anyhow::Result<()> {
        // A send error here only means there are currently no subscribers,
        // which is not a failure for an at-least-once, fire-and-forget bus.
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = InMemoryBus::default();
        let mut rx = bus.subscribe();
        let event = LifecycleEvent::SessionScheduled {
            session_id: SessionId::new(),
            scaling_group: ScalingGroupName::new("default"),
        };
        bus.publish(event.clone()).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[test]
    fn topics_are_stable() {
        let e = LifecycleEvent::SessionTerminated { session_id: SessionId::new() };
        assert_eq!(e.topic(), "session.terminated");
    }
}
