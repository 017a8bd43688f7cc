// src/locality.rs

//! Locality-aware grouping of partition bundles onto workers.
//!
//! Training tasks are spawned only on workers that already hold data, and
//! each holds exactly its own bundles. The grouping runs after a full
//! materialization barrier, so placement is read once, when it is stable,
//! instead of being re-queried per partition.

use std::collections::HashMap;

use crate::error::{CoordinatorError, Result};
use crate::partition::{AlignedPartitionSet, PartitionBundle};
use crate::substrate::{TaskSubstrate, WorkerId};

/// Bundles grouped by owning worker.
///
/// Iteration order is the order in which workers first appeared in the
/// bundle sequence, which keeps ring construction deterministic for a
/// fixed placement.
#[derive(Debug, Default)]
pub struct WorkerGroups {
    order: Vec<WorkerId>,
    groups: HashMap<WorkerId, Vec<PartitionBundle>>,
}

impl WorkerGroups {
    fn push(&mut self, worker: WorkerId, bundle: PartitionBundle) {
        if !self.groups.contains_key(&worker) {
            self.order.push(worker.clone());
        }
        self.groups.entry(worker).or_default().push(bundle);
    }

    /// Participating workers, in first-appearance order.
    pub fn workers(&self) -> &[WorkerId] {
        &self.order
    }

    pub fn num_workers(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn group(&self, worker: &WorkerId) -> Option<&[PartitionBundle]> {
        self.groups.get(worker).map(Vec::as_slice)
    }

    /// Iterate `(worker, bundles)` pairs in first-appearance order.
    pub fn iter(&self) -> impl Iterator<Item = (&WorkerId, &[PartitionBundle])> {
        self.order
            .iter()
            .map(|w| (w, self.groups[w].as_slice()))
    }
}

/// Materialize the dataset and group its bundles by owning worker.
///
/// Runs the barrier first: every partition of every bundle is computed
/// and stored before placement is read, so `who_has` reflects the final
/// layout. Each bundle is then assigned to the first listed owner of its
/// feature partition.
///
/// An empty dataset returns empty groups without touching the substrate.
///
/// # Errors
///
/// Returns the substrate's error when materialization fails (before any
/// placement read), and `PartitionCompute` when a materialized partition
/// has no listed owner.
pub async fn locate(
    substrate: &dyn TaskSubstrate,
    dataset: &AlignedPartitionSet,
) -> Result<WorkerGroups> {
    let mut groups = WorkerGroups::default();
    if dataset.is_empty() {
        return Ok(groups);
    }

    let tickets = substrate.compute_all(dataset.bundles()).await?;
    substrate.wait_all(&tickets).await?;
    let placement = substrate.who_has().await?;

    for (ticket, bundle) in tickets.iter().zip(dataset.bundles()) {
        let owners = placement.get(ticket.key()).filter(|o| !o.is_empty());
        let owners = owners.ok_or_else(|| {
            CoordinatorError::partition_compute(
                ticket.key().to_string(),
                ticket.index(),
                "no worker reports holding this partition",
            )
        })?;

        if owners.len() > 1 {
            tracing::warn!(
                "Partition {} is replicated on {} workers, pinning to {}",
                ticket.key(),
                owners.len(),
                owners[0]
            );
        }
        groups.push(owners[0].clone(), bundle.clone());
    }

    tracing::debug!(
        "Grouped {} bundles onto {} data-holding workers",
        dataset.len(),
        groups.num_workers()
    );

    Ok(groups)
}
