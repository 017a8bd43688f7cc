// src/model.rs

//! Fitted models and the high-level booster facade.

use std::sync::Arc;

use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::params::TrainingParams;
use crate::partition::{AlignedPartitionSet, DenseMatrix, PartitionData, PartitionHandle};
use crate::predict::{self, PredictionOutput};
use crate::substrate::TaskSubstrate;
use crate::train::{self, LocalTrainer};

/// A model produced by one collective training round.
///
/// Implementations wrap whatever the local trainer fitted. Predictions
/// are local and cheap relative to training; the coordinator calls them
/// from scoring tasks running next to the data.
pub trait FittedModel: Send + Sync {
    /// Point predictions, one per input row.
    fn predict(&self, features: &PartitionData) -> Result<Vec<f64>>;

    /// Per-class probabilities as a `num_rows x num_classes` block.
    fn predict_proba(&self, features: &PartitionData) -> Result<DenseMatrix>;

    fn num_classes(&self) -> usize;

    fn num_features(&self) -> usize;
}

impl std::fmt::Debug for dyn FittedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FittedModel")
            .field("num_classes", &self.num_classes())
            .field("num_features", &self.num_features())
            .finish()
    }
}

/// Shared handle to a fitted model.
pub type TrainedModel = Arc<dyn FittedModel>;

/// Scikit-style facade over distributed fit and lazy predict.
///
/// Owns the training parameters, the local trainer, and the coordinator
/// defaults; one instance can be fit and re-fit, keeping only the latest
/// model.
pub struct DistributedBooster {
    params: TrainingParams,
    trainer: Arc<dyn LocalTrainer>,
    config: CoordinatorConfig,
    fitted: Option<TrainedModel>,
}

impl std::fmt::Debug for DistributedBooster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedBooster")
            .field("params", &self.params)
            .field("config", &self.config)
            .field("fitted", &self.fitted)
            .finish_non_exhaustive()
    }
}

impl DistributedBooster {
    pub fn new(params: TrainingParams, trainer: Arc<dyn LocalTrainer>) -> Self {
        Self {
            params,
            trainer,
            config: CoordinatorConfig::default(),
            fitted: None,
        }
    }

    /// Build with explicit coordinator defaults.
    ///
    /// # Errors
    ///
    /// Returns `Config` when the configuration fails validation.
    pub fn with_config(
        params: TrainingParams,
        trainer: Arc<dyn LocalTrainer>,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            params,
            trainer,
            config,
            fitted: None,
        })
    }

    /// Fit one model across the workers holding the given partitions.
    ///
    /// Feature, label, and weight handles are zipped positionally; see
    /// [`AlignedPartitionSet`] for the arity rules. On success the fitted
    /// model replaces any previous one; on failure the previous model is
    /// kept.
    pub async fn fit(
        &mut self,
        substrate: &dyn TaskSubstrate,
        features: Vec<PartitionHandle>,
        labels: Vec<PartitionHandle>,
        weights: Option<Vec<PartitionHandle>>,
    ) -> Result<()> {
        let dataset = AlignedPartitionSet::new(features, labels, weights)?;
        let model = train::train(substrate, &dataset, &self.params, &self.trainer, &self.config)
            .await?;
        self.fitted = Some(model);
        Ok(())
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// The fitted model, for local use outside the cluster.
    pub fn fitted_model(&self) -> Result<TrainedModel> {
        self.fitted.clone().ok_or(CoordinatorError::NotFitted)
    }

    pub fn num_classes(&self) -> Result<usize> {
        Ok(self.fitted_model()?.num_classes())
    }

    pub fn num_features(&self) -> Result<usize> {
        Ok(self.fitted_model()?.num_features())
    }

    /// Lazy point predictions over `input`, one output partition each.
    pub fn predict(
        &self,
        substrate: Arc<dyn TaskSubstrate>,
        input: Vec<PartitionHandle>,
    ) -> Result<PredictionOutput> {
        Ok(predict::predict(substrate, self.fitted_model()?, input, false))
    }

    /// Lazy per-class probabilities over `input`.
    pub fn predict_proba(
        &self,
        substrate: Arc<dyn TaskSubstrate>,
        input: Vec<PartitionHandle>,
    ) -> Result<PredictionOutput> {
        Ok(predict::predict(substrate, self.fitted_model()?, input, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::BundleData;
    use crate::substrate::WorkerId;
    use crate::testutil::{MockSubstrate, RecordingTrainer};

    fn payload(rows: usize) -> BundleData {
        let values = (0..rows * 2).map(|i| i as f64).collect();
        BundleData {
            features: PartitionData::Array(DenseMatrix::new(rows, 2, values).unwrap()),
            labels: vec![1.0; rows],
            weights: None,
        }
    }

    fn scoring_payload(rows: usize) -> PartitionData {
        let values = (0..rows * 2).map(|i| i as f64).collect();
        PartitionData::Array(DenseMatrix::new(rows, 2, values).unwrap())
    }

    fn fixture() -> (Arc<MockSubstrate>, DistributedBooster) {
        let w1 = WorkerId::new("tcp://10.0.0.1:7000");
        let substrate = Arc::new(
            MockSubstrate::new()
                .with_placement("f-0", &[w1.clone()])
                .with_cores(w1, 2)
                .with_bundle_payload("f-0", payload(4))
                .with_partition_payload("p-0", scoring_payload(3)),
        );
        let trainer = Arc::new(RecordingTrainer::default()) as Arc<dyn LocalTrainer>;
        let booster = DistributedBooster::new(
            TrainingParams::new().with("num_leaves", 31i64),
            trainer,
        );
        (substrate, booster)
    }

    #[tokio::test]
    async fn test_fit_then_predict() {
        let (substrate, mut booster) = fixture();
        assert!(!booster.is_fitted());

        booster
            .fit(
                substrate.as_ref(),
                vec![PartitionHandle::new("f-0")],
                vec![PartitionHandle::new("l-0")],
                None,
            )
            .await
            .unwrap();
        assert!(booster.is_fitted());

        let output = booster
            .predict(substrate.clone(), vec![PartitionHandle::new("p-0")])
            .unwrap();
        let parts = output.materialize().await.unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].num_rows(), 3);
        assert_eq!(parts[0].num_cols(), 1);
    }

    #[tokio::test]
    async fn test_predict_proba_declares_classes() {
        let (substrate, mut booster) = fixture();
        booster
            .fit(
                substrate.as_ref(),
                vec![PartitionHandle::new("f-0")],
                vec![PartitionHandle::new("l-0")],
                None,
            )
            .await
            .unwrap();

        let output = booster
            .predict_proba(substrate.clone(), vec![PartitionHandle::new("p-0")])
            .unwrap();
        assert_eq!(output.declared_columns(), 2);

        let parts = output.materialize().await.unwrap();
        assert_eq!(parts[0].num_cols(), 2);
    }

    #[tokio::test]
    async fn test_unfitted_booster_rejects_access() {
        let (substrate, booster) = fixture();

        assert!(matches!(
            booster.fitted_model().unwrap_err(),
            CoordinatorError::NotFitted
        ));
        assert!(booster.num_classes().is_err());
        assert!(booster.num_features().is_err());
        assert!(booster
            .predict(substrate.clone(), vec![PartitionHandle::new("p-0")])
            .is_err());
        assert!(booster
            .predict_proba(substrate, vec![PartitionHandle::new("p-0")])
            .is_err());
    }

    #[tokio::test]
    async fn test_metadata_after_fit() {
        let (substrate, mut booster) = fixture();
        booster
            .fit(
                substrate.as_ref(),
                vec![PartitionHandle::new("f-0")],
                vec![PartitionHandle::new("l-0")],
                None,
            )
            .await
            .unwrap();

        assert_eq!(booster.num_classes().unwrap(), 2);
        assert_eq!(booster.num_features().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_fit_keeps_previous_model() {
        let (substrate, mut booster) = fixture();
        booster
            .fit(
                substrate.as_ref(),
                vec![PartitionHandle::new("f-0")],
                vec![PartitionHandle::new("l-0")],
                None,
            )
            .await
            .unwrap();

        // mismatched arity fails before any training work
        let err = booster
            .fit(
                substrate.as_ref(),
                vec![PartitionHandle::new("f-0")],
                Vec::new(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ArityMismatch { .. }));
        assert!(booster.is_fitted());
    }

    #[test]
    fn test_with_config_validates() {
        let trainer = Arc::new(RecordingTrainer::default()) as Arc<dyn LocalTrainer>;
        let mut config = CoordinatorConfig::default();
        config.training.tree_learner = "serial".to_string();

        let result = DistributedBooster::with_config(TrainingParams::new(), trainer, config);
        assert!(matches!(
            result.unwrap_err(),
            CoordinatorError::Config { .. }
        ));
    }
}
