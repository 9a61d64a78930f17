//! C3: admission validator (spec.md §4.3).
//!
//! Checks a pending workload against the scaling group's configuration and
//! the quota hierarchy (keypair -> user -> group -> domain), in that order,
//! returning the first violation found. Pure and synchronous: the caller
//! supplies the already-taken [`SystemSnapshot`] and gets back a verdict,
//! no I/O.

use fleetsched_types::{Occupancy, QuotaLimits, QuotaState, ResourceSlot, SchedulingConfig, SessionWorkload};

/// Which level of the quota hierarchy a check failed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLevel {
    /// Finest-grained: the submitting keypair.
    Keypair,
    /// The user owning the keypair.
    User,
    /// The group (project) the user belongs to.
    Group,
    /// The coarsest-grained: the domain.
    Domain,
}

impl std::fmt::Display for QuotaLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuotaLevel::Keypair => write!(f, "keypair"),
            QuotaLevel::User => write!(f, "user"),
            QuotaLevel::Group => write!(f, "group"),
            QuotaLevel::Domain => write!(f, "domain"),
        }
    }
}

/// Why an admission validation rejected a workload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RejectReason {
    /// The workload's `cluster_size` does not match the number of kernel
    /// specs supplied.
    #[error("cluster_size {declared} does not match {actual} kernel specs")]
    ClusterSizeMismatch {
        /// Declared cluster size.
        declared: u32,
        /// Actual number of kernel specs.
        actual: u32,
    },

    /// The scaling group does not permit this session type.
    #[error("session type not permitted in this scaling group")]
    SessionTypeNotPermitted,

    /// Admitting this workload would push the principal's resource
    /// occupancy over its limit.
    #[error("resource limit exceeded at {level} level")]
    ResourceLimitExceeded {
        /// Quota level the check failed at.
        level: QuotaLevel,
    },

    /// The principal already has the maximum permitted concurrent sessions.
    #[error("concurrent session limit exceeded at {level} level")]
    ConcurrentSessionLimitExceeded {
        /// Quota level the check failed at.
        level: QuotaLevel,
    },

    /// The principal already has the maximum permitted pending sessions.
    #[error("pending session limit exceeded at {level} level")]
    PendingSessionLimitExceeded {
        /// Quota level the check failed at.
        level: QuotaLevel,
    },

    /// Admitting this workload would push the principal's pending-resource
    /// reservation over its limit.
    #[error("pending resource limit exceeded at {level} level")]
    PendingResourceLimitExceeded {
        /// Quota level the check failed at.
        level: QuotaLevel,
    },

    /// The workload designates a specific agent that does not exist in this
    /// scaling group's snapshot.
    #[error("designated agent not found in scaling group")]
    DesignatedAgentNotFound,
}

/// Validate `workload` against `config` and `quota`. Returns `Ok(())` if
/// admissible, else the first [`RejectReason`] encountered, checked in
/// hierarchy order (keypair, then user, then group, then domain).
pub fn validate(
    workload: &SessionWorkload,
    config: &SchedulingConfig,
    quota: &QuotaState,
    known_agent_ids: &[fleetsched_types::AgentId],
) -> Result<(), RejectReason> {
    if workload.cluster_size as usize != workload.kernels.len() {
        return Err(RejectReason::ClusterSizeMismatch {
            declared: workload.cluster_size,
            actual: workload.kernels.len() as u32,
        });
    }

    if !config.permitted_session_types.contains(&workload.session_type) {
        return Err(RejectReason::SessionTypeNotPermitted);
    }

    for kernel in &workload.kernels {
        if let Some(agent_id) = &kernel.designated_agent {
            if !known_agent_ids.contains(agent_id) {
                return Err(RejectReason::DesignatedAgentNotFound);
            }
        }
    }

    let requested = workload.total_requested_slots();

    check_level(
        QuotaLevel::Keypair,
        quota.keypair_occupancy.get(&workload.owner.keypair),
        quota.keypair_limits.get(&workload.owner.keypair),
        &requested,
    )?;
    check_level(
        QuotaLevel::User,
        quota.user_occupancy.get(&workload.owner.user),
        quota.user_limits.get(&workload.owner.user),
        &requested,
    )?;
    check_level(
        QuotaLevel::Group,
        quota.group_occupancy.get(&workload.owner.group),
        quota.group_limits.get(&workload.owner.group),
        &requested,
    )?;
    check_level(
        QuotaLevel::Domain,
        quota.domain_occupancy.get(&workload.owner.domain),
        quota.domain_limits.get(&workload.owner.domain),
        &requested,
    )?;

    Ok(())
}

fn check_level(
    level: QuotaLevel,
    occupancy: Option<&Occupancy>,
    limits: Option<&QuotaLimits>,
    requested: &ResourceSlot,
) -> Result<(), RejectReason> {
    let Some(limits) = limits else { return Ok(()) };
    let occupancy = occupancy.cloned().unwrap_or_default();

    let would_be_occupied = &occupancy.resource_occupancy + requested;
    if !limits.resource_limit.is_zero() && !would_be_occupied.le(&limits.resource_limit) {
        return Err(RejectReason::ResourceLimitExceeded { level });
    }

    if let Some(max) = limits.max_concurrent_sessions {
        if occupancy.concurrent_sessions + 1 > max {
            return Err(RejectReason::ConcurrentSessionLimitExceeded { level });
        }
    }

    if let Some(max) = limits.max_pending_sessions {
        if occupancy.pending_sessions + 1 > max {
            return Err(RejectReason::PendingSessionLimitExceeded { level });
        }
    }

    if let Some(max_pending_slots) = &limits.max_pending_resource_slots {
        let would_be_pending = &occupancy.pending_resource_slots + requested;
        if !would_be_pending.le(max_pending_slots) {
            return Err(RejectReason::PendingResourceLimitExceeded { level });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsched_types::{
        AgentId, ClusterMode, ClusterRole, DomainId, GroupId, KernelSpec, KeypairId, Owner,
        ScalingGroupName, SelectorStrategy, SessionId, SessionType, UserId,
    };
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn workload() -> SessionWorkload {
        SessionWorkload {
            session_id: SessionId::new(),
            owner: Owner {
                keypair: KeypairId("kp1".into()),
                user: UserId(Uuid::new_v4()),
                group: GroupId(Uuid::new_v4()),
                domain: DomainId("default".into()),
            },
            session_type: SessionType::Interactive,
            cluster_mode: ClusterMode::SingleNode,
            cluster_size: 1,
            kernels: vec![KernelSpec {
                kernel_id: fleetsched_types::KernelId::new(),
                architecture: "x86_64".into(),
                requested_slots: ResourceSlot::from_pairs([("cpu", dec!(2))]),
                image: "img".into(),
                designated_agent: None,
                cluster_role: ClusterRole::Main,
            }],
            priority: 0,
            enqueue_timestamp: chrono::Utc::now(),
            starts_at: None,
            scaling_group: ScalingGroupName::new("default"),
            inference_endpoint_id: None,
        }
    }

    fn config() -> SchedulingConfig {
        SchedulingConfig {
            scaling_group: ScalingGroupName::new("default"),
            scheduler_name: fleetsched_types::PrioritizerKind::Fifo,
            strategy: SelectorStrategy::Concentrated,
            max_container_count: None,
            enforce_spreading_endpoint_replica: false,
            agent_selection_resource_priority: vec![],
            permitted_session_types: vec![SessionType::Interactive],
        }
    }

    #[test]
    fn rejects_disallowed_session_type() {
        let mut w = workload();
        w.session_type = SessionType::Batch;
        let err = validate(&w, &config(), &QuotaState::default(), &[]).unwrap_err();
        assert_eq!(err, RejectReason::SessionTypeNotPermitted);
    }

    #[test]
    fn rejects_cluster_size_mismatch() {
        let mut w = workload();
        w.cluster_size = 2;
        let err = validate(&w, &config(), &QuotaState::default(), &[]).unwrap_err();
        assert!(matches!(err, RejectReason::ClusterSizeMismatch { .. }));
    }

    #[test]
    fn rejects_over_resource_limit_at_keypair_level() {
        let w = workload();
        let mut quota = QuotaState::default();
        quota.keypair_limits.insert(
            w.owner.keypair.clone(),
            QuotaLimits {
                resource_limit: ResourceSlot::from_pairs([("cpu", dec!(1))]),
                ..Default::default()
            },
        );
        let err = validate(&w, &config(), &quota, &[]).unwrap_err();
        assert_eq!(err, RejectReason::ResourceLimitExceeded { level: QuotaLevel::Keypair });
    }

    #[test]
    fn accepts_within_limits() {
        let w = workload();
        let mut quota = QuotaState::default();
        quota.keypair_limits.insert(
            w.owner.keypair.clone(),
            QuotaLimits { resource_limit: ResourceSlot::from_pairs([("cpu", dec!(8))]), ..Default::default() },
        );
        assert!(validate(&w, &config(), &quota, &[]).is_ok());
    }

    #[test]
    fn rejects_unknown_designated_agent() {
        let mut w = workload();
        w.kernels[0].designated_agent = Some(AgentId::new("ghost"));
        let err = validate(&w, &config(), &QuotaState::default(), &[]).unwrap_err();
        assert_eq!(err, RejectReason::DesignatedAgentNotFound);
    }
}
