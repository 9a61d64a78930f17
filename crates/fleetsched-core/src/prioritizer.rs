//! C2: pending-workload prioritizer (spec.md §4.2).
//!
//! Pure and synchronous: given the pending-workload list from a
//! [`fleetsched_types::SystemSnapshot`]-adjacent read, produce the order in
//! which C3/C4 should attempt to admit and place them. Must not yield or
//! perform I/O (spec.md §5) — callers own fetching the input and consuming
//! the output.

use std::collections::HashMap;

use fleetsched_types::{PrioritizerKind, ResourceSlot, SessionWorkload, UserId};
use rust_decimal::Decimal;

/// Order `workloads` for admission according to `kind`. Ties within a
/// priority/fairness bucket fall back to FIFO enqueue order so the result is
/// deterministic for a fixed input.
///
/// `cluster_capacity` is only consulted by [`PrioritizerKind::Drf`], where it
/// normalizes each owning user's requested resources into a dominant share.
pub fn prioritize(
    workloads: &[SessionWorkload],
    kind: PrioritizerKind,
    cluster_capacity: &ResourceSlot,
) -> Vec<SessionWorkload> {
    let mut sorted: Vec<SessionWorkload> = workloads.to_vec();
    match kind {
        PrioritizerKind::Fifo => sorted.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.enqueue_timestamp.cmp(&b.enqueue_timestamp))
        }),
        PrioritizerKind::Lifo => sorted.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.enqueue_timestamp.cmp(&a.enqueue_timestamp))
        }),
        PrioritizerKind::Drf => {
            let shares = dominant_shares(&sorted, cluster_capacity);
            sorted.sort_by(|a, b| {
                b.priority
                    .cmp(&a.priority)
                    .then(
                        shares[&a.owner.user]
                            .partial_cmp(&shares[&b.owner.user])
                            .unwrap_or(std::cmp::Ordering::Equal),
                    )
                    .then(a.enqueue_timestamp.cmp(&b.enqueue_timestamp))
            });
        }
    }
    sorted
}

/// Per-user dominant resource share: `max` over resource types of
/// `(sum of that user's requested quantity in this batch) / cluster_capacity`.
/// A user requesting nothing sorts first (share zero); a user whose request
/// saturates any single resource type sorts last for that type.
fn dominant_shares(
    workloads: &[SessionWorkload],
    cluster_capacity: &ResourceSlot,
) -> HashMap<UserId, Decimal> {
    let mut requested_by_user: HashMap<UserId, ResourceSlot> = HashMap::new();
    for workload in workloads {
        let entry = requested_by_user
            .entry(workload.owner.user.clone())
            .or_insert_with(ResourceSlot::empty);
        *entry = &*entry + &workload.total_requested_slots();
    }

    requested_by_user
        .into_iter()
        .map(|(user, requested)| {
            let share = requested
                .iter()
                .map(|(resource, qty)| {
                    let capacity = cluster_capacity.get(resource);
                    if capacity.is_zero() {
                        Decimal::ZERO
                    } else {
                        qty / capacity
                    }
                })
                .fold(Decimal::ZERO, Decimal::max);
            (user, share)
        })
        .collect()
}
