// src/error.rs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {

    #[error("misaligned partition collections: {features} feature / {labels} label / {weights:?} weight partitions")]
    ArityMismatch {
        features: usize,
        labels: usize,
        weights: Option<usize>,
    },

    #[error("malformed worker address '{address}': {reason}")]
    AddressFormat {
        address: String,
        reason: String,
    },

    #[error("partition '{partition}' (bundle {bundle_index}) failed to materialize: {message}")]
    PartitionCompute {
        partition: String,
        bundle_index: usize,
        message: String,
    },

    #[error("local training failed on worker '{worker}': {message}")]
    WorkerTraining {
        worker: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("no worker produced a model")]
    NoModelProduced,

    #[error("topology error: {message}")]
    Topology {
        message: String,
    },

    #[error("cannot concatenate partitions: {message}")]
    Concat {
        message: String,
    },

    #[error("invalid partition payload: {message}")]
    InvalidPayload {
        message: String,
    },

    #[error("inference failed on partition '{partition}': {message}")]
    Inference {
        partition: String,
        message: String,
    },

    #[error("partition index {index} out of range (total partitions: {total})")]
    InvalidPartitionIndex {
        index: usize,
        total: usize,
    },

    #[error("booster has not been fitted; call fit before predict")]
    NotFitted,

    #[error("task substrate error: {message}")]
    Substrate {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;

// Convenience constructors
impl CoordinatorError {

    pub fn arity_mismatch(features: usize, labels: usize, weights: Option<usize>) -> Self {
        Self::ArityMismatch { features, labels, weights }
    }

    pub fn address_format(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AddressFormat {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn partition_compute(
        partition: impl Into<String>,
        bundle_index: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::PartitionCompute {
            partition: partition.into(),
            bundle_index,
            message: message.into(),
        }
    }

    pub fn worker_training(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::WorkerTraining {
            worker: worker.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn worker_training_with_source(
        worker: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::WorkerTraining {
            worker: worker.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn topology(message: impl Into<String>) -> Self {
        Self::Topology {
            message: message.into(),
        }
    }

    pub fn concat(message: impl Into<String>) -> Self {
        Self::Concat {
            message: message.into(),
        }
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    pub fn inference(partition: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inference {
            partition: partition.into(),
            message: message.into(),
        }
    }

    pub fn invalid_partition_index(index: usize, total: usize) -> Self {
        Self::InvalidPartitionIndex { index, total }
    }

    pub fn substrate(message: impl Into<String>) -> Self {
        Self::Substrate {
            message: message.into(),
            source: None,
        }
    }

    pub fn substrate_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Substrate {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
