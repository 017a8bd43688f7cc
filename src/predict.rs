// src/predict.rs

//! Lazy, partition-mirroring inference.
//!
//! Prediction never concentrates data: each input partition is scored by
//! its own task on whichever worker holds it, and nothing runs until a
//! partition is forced. The output mirrors the input partition for
//! partition, in order.

use std::sync::Arc;

use futures::future::try_join_all;

use crate::error::{CoordinatorError, Result};
use crate::model::TrainedModel;
use crate::partition::{DenseMatrix, PartitionData, PartitionHandle, PartitionKey, Table};
use crate::substrate::TaskSubstrate;

/// Scores one partition payload with a fitted model.
///
/// The substrate ships this job to the payload's worker and calls
/// [`apply`](Self::apply) there; only the scored result travels back.
pub struct PredictionJob {
    model: TrainedModel,
    probabilities: bool,
}

impl PredictionJob {
    pub fn new(model: TrainedModel, probabilities: bool) -> Self {
        Self {
            model,
            probabilities,
        }
    }

    /// Columns every scored partition will have.
    pub fn declared_columns(&self) -> usize {
        if self.probabilities {
            self.model.num_classes()
        } else {
            1
        }
    }

    /// Score one payload, producing a same-kind container.
    ///
    /// Table input keeps its row index and gets labelled score columns;
    /// anything else comes back as a dense array. Output rows equal input
    /// rows in both modes.
    ///
    /// # Errors
    ///
    /// Returns `Inference` for model failures and for score shapes that
    /// do not match the input row count (or the declared class count in
    /// probability mode).
    pub fn apply(&self, key: &PartitionKey, input: &PartitionData) -> Result<PartitionData> {
        if self.probabilities {
            self.apply_probabilities(key, input)
        } else {
            self.apply_scores(key, input)
        }
    }

    fn apply_scores(&self, key: &PartitionKey, input: &PartitionData) -> Result<PartitionData> {
        let scores = self
            .model
            .predict(input)
            .map_err(|e| CoordinatorError::inference(key.to_string(), e.to_string()))?;
        if scores.len() != input.num_rows() {
            return Err(CoordinatorError::inference(
                key.to_string(),
                format!(
                    "model returned {} scores for {} rows",
                    scores.len(),
                    input.num_rows()
                ),
            ));
        }

        let data = match input {
            PartitionData::Table(table) => PartitionData::Table(
                Table::new(
                    vec!["predictions".to_string()],
                    table.index().to_vec(),
                    scores,
                )
                .map_err(|e| CoordinatorError::inference(key.to_string(), e.to_string()))?,
            ),
            _ => PartitionData::Array(
                DenseMatrix::new(input.num_rows(), 1, scores)
                    .map_err(|e| CoordinatorError::inference(key.to_string(), e.to_string()))?,
            ),
        };
        Ok(data)
    }

    fn apply_probabilities(
        &self,
        key: &PartitionKey,
        input: &PartitionData,
    ) -> Result<PartitionData> {
        let scores = self
            .model
            .predict_proba(input)
            .map_err(|e| CoordinatorError::inference(key.to_string(), e.to_string()))?;
        if scores.rows() != input.num_rows() || scores.cols() != self.model.num_classes() {
            return Err(CoordinatorError::inference(
                key.to_string(),
                format!(
                    "model returned a {}x{} probability block for {} rows and {} classes",
                    scores.rows(),
                    scores.cols(),
                    input.num_rows(),
                    self.model.num_classes()
                ),
            ));
        }

        let data = match input {
            PartitionData::Table(table) => {
                let columns = (0..scores.cols())
                    .map(|i| format!("class_{}", i))
                    .collect();
                PartitionData::Table(
                    Table::new(columns, table.index().to_vec(), scores.into_values())
                        .map_err(|e| CoordinatorError::inference(key.to_string(), e.to_string()))?,
                )
            }
            _ => PartitionData::Array(scores),
        };
        Ok(data)
    }
}

/// Handle to a not-yet-run prediction, one output partition per input.
///
/// Holding the output runs nothing; each partition is scored on first
/// force, independently of its siblings.
pub struct PredictionOutput {
    substrate: Arc<dyn TaskSubstrate>,
    partitions: Vec<PartitionHandle>,
    job: PredictionJob,
}

impl PredictionOutput {
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn partitions(&self) -> &[PartitionHandle] {
        &self.partitions
    }

    /// Columns every materialized partition will have, known without
    /// running anything.
    pub fn declared_columns(&self) -> usize {
        self.job.declared_columns()
    }

    /// Force output partition `index`, scoring it where its input lives.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPartitionIndex` for an out-of-range index,
    /// otherwise whatever the scoring task reports. A failure here leaves
    /// sibling partitions untouched and retryable.
    pub async fn materialize_partition(&self, index: usize) -> Result<PartitionData> {
        let partition = self.partitions.get(index).ok_or_else(|| {
            CoordinatorError::invalid_partition_index(index, self.partitions.len())
        })?;
        self.substrate.map_partition(partition, &self.job).await
    }

    /// Force every output partition, preserving input order.
    pub async fn materialize(&self) -> Result<Vec<PartitionData>> {
        try_join_all(
            (0..self.partitions.len()).map(|i| self.materialize_partition(i)),
        )
        .await
    }
}

/// Set up scoring of `input` with `model`, without running anything.
///
/// The returned output mirrors `input` partition for partition. With
/// `probabilities` set, each partition scores to `num_classes` columns
/// per row; otherwise to a single column.
pub fn predict(
    substrate: Arc<dyn TaskSubstrate>,
    model: TrainedModel,
    input: Vec<PartitionHandle>,
    probabilities: bool,
) -> PredictionOutput {
    PredictionOutput {
        substrate,
        partitions: input,
        job: PredictionJob::new(model, probabilities),
    }
}
