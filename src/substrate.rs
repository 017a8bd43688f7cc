// src/substrate.rs

//! The seam between the coordinator and the distributed task runtime.
//!
//! Everything the coordinator needs from the cluster goes through
//! [`TaskSubstrate`], passed explicitly to the operations that use it.
//! There is no ambient or thread-local client: tests hand in a mock, and
//! production wires a real scheduler client, with no global state in
//! either case.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::model::TrainedModel;
use crate::partition::{PartitionBundle, PartitionData, PartitionHandle, PartitionKey};
use crate::predict::PredictionJob;
use crate::train::TrainingJob;

/// Identity of one worker, as the substrate addresses it.
///
/// For network substrates this is the worker's reachable address
/// (`scheme://host:port`), which is also what topology construction
/// parses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Ticket for one bundle's pending materialization.
///
/// `key` is the bundle's feature partition key, `index` its position in
/// the submitted set; both survive into placement lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartTicket {
    key: PartitionKey,
    index: usize,
}

impl PartTicket {
    pub fn new(key: PartitionKey, index: usize) -> Self {
        Self { key, index }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// Ticket for one submitted training task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrainTicket {
    id: String,
    worker: WorkerId,
}

impl TrainTicket {
    pub fn new(worker: WorkerId) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            worker,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn worker(&self) -> &WorkerId {
        &self.worker
    }
}

/// What one worker's training task produced.
///
/// `Empty` is a regular outcome, not an error: a worker whose local shard
/// had no rows participates in the round but contributes no model.
#[derive(Clone)]
pub enum FitOutcome {
    Fitted(TrainedModel),
    Empty,
}

impl FitOutcome {
    pub fn is_fitted(&self) -> bool {
        matches!(self, FitOutcome::Fitted(_))
    }

    pub fn into_model(self) -> Option<TrainedModel> {
        match self {
            FitOutcome::Fitted(model) => Some(model),
            FitOutcome::Empty => None,
        }
    }
}

impl fmt::Debug for FitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitOutcome::Fitted(_) => f.write_str("Fitted(..)"),
            FitOutcome::Empty => f.write_str("Empty"),
        }
    }
}

/// Client interface to the distributed task runtime.
///
/// Contract, which every implementation must uphold:
///
/// * [`who_has`](Self::who_has) lists the owners of each stored partition
///   in the substrate's preference order; a listed partition has at least
///   one owner.
/// * [`submit`](Self::submit) runs the job on the named worker, feeding it
///   the payloads of its bundles in bundle order.
/// * [`gather`](Self::gather) lets every task settle before surfacing the
///   first failure in submission order, so one worker's error never
///   cancels its peers mid-round.
/// * [`map_partition`](Self::map_partition) runs on whichever worker
///   holds the payload and ships only the result back.
#[async_trait]
pub trait TaskSubstrate: Send + Sync {
    /// Start materializing every partition of the given bundles.
    ///
    /// Returns one ticket per bundle, in bundle order. The call only
    /// schedules work; completion is observed through
    /// [`wait_all`](Self::wait_all).
    async fn compute_all(&self, bundles: &[PartitionBundle]) -> Result<Vec<PartTicket>>;

    /// Block until every ticket's materialization finished.
    ///
    /// A failed materialization surfaces here, before any placement is
    /// read or any training task submitted.
    async fn wait_all(&self, tickets: &[PartTicket]) -> Result<()>;

    /// Current placement: which workers hold each stored partition.
    async fn who_has(&self) -> Result<HashMap<PartitionKey, Vec<WorkerId>>>;

    /// Usable core count per worker, for trainer thread sizing.
    async fn core_count_per_worker(&self) -> Result<HashMap<WorkerId, usize>>;

    /// Submit one training task pinned to `worker`.
    async fn submit(&self, worker: &WorkerId, job: TrainingJob) -> Result<TrainTicket>;

    /// Collect the outcomes of submitted training tasks.
    ///
    /// On success the outcomes are in submission order. On failure the
    /// error is the first failing task's, raised only after all tasks
    /// settled.
    async fn gather(&self, tickets: Vec<TrainTicket>) -> Result<Vec<FitOutcome>>;

    /// Apply an inference job to one stored partition, where it lives.
    async fn map_partition(
        &self,
        partition: &PartitionHandle,
        job: &PredictionJob,
    ) -> Result<PartitionData>;
}
