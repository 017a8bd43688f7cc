// src/train.rs

//! Distributed fit: one collective round across the data-holding workers.
//!
//! The coordinator never moves training data. It groups bundles by owner,
//! builds one ring view per participant, and submits one training task per
//! worker; the tasks train collectively through the trainer's own network
//! layer and every one of them ends by releasing that network.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::locality;
use crate::model::TrainedModel;
use crate::params::{keys, TrainingParams};
use crate::partition::{AlignedPartitionSet, BundleData, PartitionBundle, PartitionData};
use crate::substrate::{FitOutcome, TaskSubstrate, WorkerId};
use crate::topology::NetworkTopology;

/// The trainer running on each worker.
///
/// Implementations wrap a concrete boosting library. `fit` must honor the
/// networking keys in the parameter map and block until the collective
/// round finishes; `release_network` tears down the collective state and
/// must be safe to call whether or not `fit` succeeded.
pub trait LocalTrainer: Send + Sync {
    fn fit(
        &self,
        params: &TrainingParams,
        features: &PartitionData,
        labels: &[f64],
        weights: Option<&[f64]>,
    ) -> Result<TrainedModel>;

    fn release_network(&self);
}

/// Releases the trainer's collective network when dropped.
///
/// Wraps the fit call so the network is freed on success, on error, and
/// on unwind alike; a worker that dies holding ring state would wedge
/// every peer of the next round.
struct NetworkGuard<'a> {
    trainer: &'a dyn LocalTrainer,
}

impl Drop for NetworkGuard<'_> {
    fn drop(&mut self) {
        self.trainer.release_network();
    }
}

/// One worker's training task: its bundles, its ring view, its trainer.
///
/// Built on the coordinator, executed by the substrate on the pinned
/// worker via [`run`](Self::run) with that worker's materialized payloads.
pub struct TrainingJob {
    worker: WorkerId,
    bundles: Vec<PartitionBundle>,
    params: TrainingParams,
    trainer: Arc<dyn LocalTrainer>,
}

impl TrainingJob {
    pub fn new(
        worker: WorkerId,
        bundles: Vec<PartitionBundle>,
        params: TrainingParams,
        trainer: Arc<dyn LocalTrainer>,
    ) -> Self {
        Self {
            worker,
            bundles,
            params,
            trainer,
        }
    }

    /// Bundles this task consumes, in submission order.
    pub fn bundles(&self) -> &[PartitionBundle] {
        &self.bundles
    }

    /// Run the local fit against the materialized bundle payloads.
    ///
    /// Payloads must arrive in bundle order; their rows are merged into
    /// one contiguous shard before the trainer sees them. Any failure is
    /// reported as `WorkerTraining` for this job's worker.
    pub fn run(&self, payloads: Vec<BundleData>) -> Result<FitOutcome> {
        self.execute(payloads)
            .map_err(|e| CoordinatorError::worker_training_with_source(self.worker.as_str(), e))
    }

    fn execute(&self, payloads: Vec<BundleData>) -> Result<FitOutcome> {
        let merged = BundleData::concat(payloads)?;
        if merged.features.num_rows() == 0 {
            tracing::warn!(
                "Worker {} holds only empty partitions, skipping local fit",
                self.worker
            );
            return Ok(FitOutcome::Empty);
        }

        let _guard = NetworkGuard {
            trainer: self.trainer.as_ref(),
        };
        let model = self.trainer.fit(
            &self.params,
            &merged.features,
            &merged.labels,
            merged.weights.as_deref(),
        )?;
        Ok(FitOutcome::Fitted(model))
    }
}

/// Train one model across every worker that holds part of the dataset.
///
/// Materializes and groups the dataset, then submits exactly one task per
/// data-holding worker. Every task receives the same machine list and
/// `tree_learner`, its own listen port, and a thread count sized to its
/// worker. The fitted model is taken from the first task that produced
/// one; the collective round makes all produced models equivalent.
///
/// # Errors
///
/// Fails on materialization or placement errors, on invalid ring settings,
/// on the first worker whose task failed (after all tasks settled), and
/// with `NoModelProduced` when no worker contributed a model.
pub async fn train(
    substrate: &dyn TaskSubstrate,
    dataset: &AlignedPartitionSet,
    params: &TrainingParams,
    trainer: &Arc<dyn LocalTrainer>,
    config: &CoordinatorConfig,
) -> Result<TrainedModel> {
    let groups = locality::locate(substrate, dataset).await?;
    if groups.is_empty() {
        return Err(CoordinatorError::NoModelProduced);
    }

    let cores = substrate.core_count_per_worker().await?;
    let base_port = base_listen_port(params, config)?;
    let timeout = listen_timeout(params, config)?;
    let shared = shared_params(params, config);

    tracing::info!(
        "Training across {} data-holding workers ({} bundles)",
        groups.num_workers(),
        dataset.len()
    );

    let mut tickets = Vec::with_capacity(groups.num_workers());
    for (worker, bundles) in groups.iter() {
        let topology = NetworkTopology::build(groups.workers(), worker, base_port, timeout)?;

        let mut worker_params = shared.clone();
        worker_params.apply_topology(&topology);
        worker_params.set(keys::NUM_THREADS, thread_count(worker, &cores, config));

        tracing::debug!(
            "Submitting training task to {} ({} bundles, listen port {})",
            worker,
            bundles.len(),
            topology.local_listen_port()
        );
        let job = TrainingJob::new(
            worker.clone(),
            bundles.to_vec(),
            worker_params,
            Arc::clone(trainer),
        );
        tickets.push(substrate.submit(worker, job).await?);
    }

    let outcomes = substrate.gather(tickets).await?;
    let fitted = outcomes.iter().filter(|o| o.is_fitted()).count();
    tracing::info!(
        "Collective round finished: {} of {} workers produced a model",
        fitted,
        outcomes.len()
    );

    outcomes
        .into_iter()
        .find_map(FitOutcome::into_model)
        .ok_or(CoordinatorError::NoModelProduced)
}

/// Base listen port: caller parameter if present, config default otherwise.
fn base_listen_port(params: &TrainingParams, config: &CoordinatorConfig) -> Result<u16> {
    match params.get_int(keys::LOCAL_LISTEN_PORT) {
        Some(v) => u16::try_from(v).map_err(|_| {
            CoordinatorError::config(format!(
                "parameter {} value {} is not a valid port",
                keys::LOCAL_LISTEN_PORT,
                v
            ))
        }),
        None => Ok(config.network.base_listen_port),
    }
}

/// Listen timeout: caller parameter if present, config default otherwise.
fn listen_timeout(params: &TrainingParams, config: &CoordinatorConfig) -> Result<u64> {
    match params.get_int(keys::LISTEN_TIME_OUT) {
        Some(v) => u64::try_from(v).map_err(|_| {
            CoordinatorError::config(format!(
                "parameter {} value {} is not a valid timeout",
                keys::LISTEN_TIME_OUT,
                v
            ))
        }),
        None => Ok(config.network.listen_timeout_secs),
    }
}

/// The parameter map shared by all workers before per-ring injection.
///
/// The tree learner is always pinned to the data-parallel mode: every
/// worker trains on its local rows only, and any other mode would need
/// feature placement this coordinator never computes.
fn shared_params(params: &TrainingParams, config: &CoordinatorConfig) -> TrainingParams {
    let mut shared = params.clone();
    if let Some(learner) = shared.get_str(keys::TREE_LEARNER) {
        if learner != config.training.tree_learner {
            tracing::warn!(
                "Ignoring tree learner '{}', distributed fit always uses '{}'",
                learner,
                config.training.tree_learner
            );
        }
    }
    shared.set(keys::TREE_LEARNER, config.training.tree_learner.clone());
    shared
}

fn thread_count(
    worker: &WorkerId,
    cores: &HashMap<WorkerId, usize>,
    config: &CoordinatorConfig,
) -> usize {
    if let Some(n) = config.training.num_threads_override {
        return n;
    }
    match cores.get(worker) {
        Some(&n) => n,
        None => {
            tracing::warn!("No core count reported for {}, assuming 1 thread", worker);
            1
        }
    }
}
