// src/testutil.rs

//! In-memory substrate and trainer doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{CoordinatorError, Result};
use crate::model::{FittedModel, TrainedModel};
use crate::params::{keys, TrainingParams};
use crate::partition::{
    BundleData, DenseMatrix, PartitionBundle, PartitionData, PartitionHandle, PartitionKey,
};
use crate::predict::PredictionJob;
use crate::substrate::{FitOutcome, PartTicket, TaskSubstrate, TrainTicket, WorkerId};
use crate::train::{LocalTrainer, TrainingJob};

/// Single-process [`TaskSubstrate`] over staged payloads and placement.
///
/// Training jobs run inline during `gather`, prediction jobs inline during
/// `map_partition`; call counters expose how much work a scenario touched.
#[derive(Default)]
pub struct MockSubstrate {
    placement: HashMap<PartitionKey, Vec<WorkerId>>,
    cores: HashMap<WorkerId, usize>,
    bundle_payloads: HashMap<PartitionKey, BundleData>,
    partition_payloads: HashMap<PartitionKey, PartitionData>,
    failing_parts: HashSet<PartitionKey>,
    pending_jobs: Mutex<HashMap<String, TrainingJob>>,
    compute_count: AtomicUsize,
    who_has_count: AtomicUsize,
    submit_count: AtomicUsize,
    map_count: AtomicUsize,
}

impl MockSubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the owner list of one partition, keyed by its feature handle.
    pub fn with_placement(mut self, key: &str, workers: &[WorkerId]) -> Self {
        self.placement
            .insert(PartitionKey::new(key), workers.to_vec());
        self
    }

    pub fn with_cores(mut self, worker: WorkerId, cores: usize) -> Self {
        self.cores.insert(worker, cores);
        self
    }

    /// Stage the materialized payload a training job will receive for the
    /// bundle whose feature partition has this key.
    pub fn with_bundle_payload(mut self, key: &str, payload: BundleData) -> Self {
        self.bundle_payloads.insert(PartitionKey::new(key), payload);
        self
    }

    /// Stage the stored payload behind one scoring-input partition.
    pub fn with_partition_payload(mut self, key: &str, payload: PartitionData) -> Self {
        self.partition_payloads
            .insert(PartitionKey::new(key), payload);
        self
    }

    /// Make this partition's materialization fail.
    pub fn with_failing_part(mut self, key: &str) -> Self {
        self.failing_parts.insert(PartitionKey::new(key));
        self
    }

    pub fn compute_calls(&self) -> usize {
        self.compute_count.load(Ordering::SeqCst)
    }

    pub fn who_has_calls(&self) -> usize {
        self.who_has_count.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn map_calls(&self) -> usize {
        self.map_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskSubstrate for MockSubstrate {
    async fn compute_all(&self, bundles: &[PartitionBundle]) -> Result<Vec<PartTicket>> {
        self.compute_count.fetch_add(1, Ordering::SeqCst);
        Ok(bundles
            .iter()
            .enumerate()
            .map(|(i, b)| PartTicket::new(b.features().key().clone(), i))
            .collect())
    }

    async fn wait_all(&self, tickets: &[PartTicket]) -> Result<()> {
        for ticket in tickets {
            if self.failing_parts.contains(ticket.key()) {
                return Err(CoordinatorError::partition_compute(
                    ticket.key().to_string(),
                    ticket.index(),
                    "simulated materialization failure",
                ));
            }
        }
        Ok(())
    }

    async fn who_has(&self) -> Result<HashMap<PartitionKey, Vec<WorkerId>>> {
        self.who_has_count.fetch_add(1, Ordering::SeqCst);
        Ok(self.placement.clone())
    }

    async fn core_count_per_worker(&self) -> Result<HashMap<WorkerId, usize>> {
        Ok(self.cores.clone())
    }

    async fn submit(&self, worker: &WorkerId, job: TrainingJob) -> Result<TrainTicket> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);
        let ticket = TrainTicket::new(worker.clone());
        self.pending_jobs
            .lock()
            .unwrap()
            .insert(ticket.id().to_string(), job);
        Ok(ticket)
    }

    async fn gather(&self, tickets: Vec<TrainTicket>) -> Result<Vec<FitOutcome>> {
        let mut jobs = self.pending_jobs.lock().unwrap();
        let mut results = Vec::with_capacity(tickets.len());
        for ticket in &tickets {
            let job = jobs.remove(ticket.id()).ok_or_else(|| {
                CoordinatorError::substrate(format!("unknown training ticket {}", ticket.id()))
            })?;
            let payloads: Result<Vec<BundleData>> = job
                .bundles()
                .iter()
                .map(|b| {
                    self.bundle_payloads
                        .get(b.features().key())
                        .cloned()
                        .ok_or_else(|| {
                            CoordinatorError::substrate(format!(
                                "no payload staged for {}",
                                b.features().key()
                            ))
                        })
                })
                .collect();
            results.push(payloads.and_then(|p| job.run(p)));
        }

        // every task settles before the first failure surfaces
        let mut outcomes = Vec::with_capacity(results.len());
        let mut first_err = None;
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    async fn map_partition(
        &self,
        partition: &PartitionHandle,
        job: &PredictionJob,
    ) -> Result<PartitionData> {
        self.map_count.fetch_add(1, Ordering::SeqCst);
        let payload = self.partition_payloads.get(partition.key()).ok_or_else(|| {
            CoordinatorError::substrate(format!("no payload staged for {}", partition.key()))
        })?;
        job.apply(partition.key(), payload)
    }
}

/// [`LocalTrainer`] that records every call and fits a [`MeanModel`].
pub struct RecordingTrainer {
    fit_count: AtomicUsize,
    release_count: AtomicUsize,
    seen: Mutex<Vec<TrainingParams>>,
    fail_on_port: Option<u16>,
    num_classes: usize,
}

impl Default for RecordingTrainer {
    fn default() -> Self {
        Self {
            fit_count: AtomicUsize::new(0),
            release_count: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            fail_on_port: None,
            num_classes: 2,
        }
    }
}

impl RecordingTrainer {
    /// Fail the fit whose parameters carry this listen port.
    pub fn with_fail_on_port(mut self, port: u16) -> Self {
        self.fail_on_port = Some(port);
        self
    }

    pub fn fit_calls(&self) -> usize {
        self.fit_count.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }

    /// Parameter maps seen by `fit`, in call order.
    pub fn seen_params(&self) -> Vec<TrainingParams> {
        self.seen.lock().unwrap().clone()
    }
}

impl LocalTrainer for RecordingTrainer {
    fn fit(
        &self,
        params: &TrainingParams,
        features: &PartitionData,
        labels: &[f64],
        _weights: Option<&[f64]>,
    ) -> Result<TrainedModel> {
        self.fit_count.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(params.clone());

        if let Some(port) = self.fail_on_port {
            if params.get_int(keys::LOCAL_LISTEN_PORT) == Some(i64::from(port)) {
                return Err(CoordinatorError::invalid_payload("simulated trainer failure"));
            }
        }

        let mean = if labels.is_empty() {
            0.0
        } else {
            labels.iter().sum::<f64>() / labels.len() as f64
        };
        Ok(Arc::new(MeanModel::new(
            mean,
            features.num_cols(),
            self.num_classes,
        )))
    }

    fn release_network(&self) {
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Deterministic [`FittedModel`] predicting one constant.
pub struct MeanModel {
    mean: f64,
    num_features: usize,
    num_classes: usize,
}

impl MeanModel {
    pub fn new(mean: f64, num_features: usize, num_classes: usize) -> Self {
        Self {
            mean,
            num_features,
            num_classes,
        }
    }
}

impl FittedModel for MeanModel {
    fn predict(&self, features: &PartitionData) -> Result<Vec<f64>> {
        Ok(vec![self.mean; features.num_rows()])
    }

    fn predict_proba(&self, features: &PartitionData) -> Result<DenseMatrix> {
        let rows = features.num_rows();
        let p = 1.0 / self.num_classes as f64;
        DenseMatrix::new(rows, self.num_classes, vec![p; rows * self.num_classes])
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn num_features(&self) -> usize {
        self.num_features
    }
}
