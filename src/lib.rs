// src/lib.rs

//! Ringboost - Locality-Aware Training Coordinator
//!
//! This crate coordinates gradient-boosted training over a distributed
//! task substrate: it materializes partitioned datasets where they lie,
//! wires the data-holding workers into a collective ring, and runs one
//! training task per worker instead of moving rows to the computation.

pub mod config;
pub mod error;
pub mod substrate;

// Re-export commonly used types for convenience
pub use config::CoordinatorConfig;
pub use error::{CoordinatorError, Result};
pub use substrate::{FitOutcome, PartTicket, TaskSubstrate, TrainTicket, WorkerId};

pub mod partition;
pub use partition::{
    AlignedPartitionSet, BundleData, ContainerKind, CsrMatrix, DenseMatrix, PartitionBundle,
    PartitionData, PartitionHandle, PartitionKey, Table,
};

pub mod topology;
pub use topology::{NetworkTopology, WorkerAddress};

pub mod params;
pub use params::{ParamValue, TrainingParams};

pub mod locality;
pub use locality::{locate, WorkerGroups};

pub mod train;
pub use train::{train, LocalTrainer, TrainingJob};

pub mod predict;
pub use predict::{predict, PredictionJob, PredictionOutput};

pub mod model;
pub use model::{DistributedBooster, FittedModel, TrainedModel};

#[cfg(test)]
mod testutil;
