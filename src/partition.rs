// src/partition.rs

//! Partition handles, aligned bundles, and partition payloads.
//!
//! The coordinator never owns dataset bytes: it moves opaque
//! [`PartitionHandle`]s around and only sees payloads on the worker side,
//! where they arrive as one of a closed set of container kinds
//! ([`PartitionData`]). Feature/label/weight alignment is enforced once,
//! structurally, by [`AlignedPartitionSet`]; everything downstream consumes
//! zipped [`PartitionBundle`]s and can no longer go out of step.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoordinatorError, Result};

/// Substrate-scoped key for one stored partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Opaque reference to one shard of a column-aligned dataset.
///
/// The physical data stays owned by the task substrate; handles are cheap
/// to clone and only identify the shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionHandle {
    key: PartitionKey,
}

impl PartitionHandle {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: PartitionKey::new(key),
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }
}

/// The zipped (features, labels, weights?) handles for one row range.
///
/// Invariant: all three handles refer to the same rows, in the same order.
/// Bundles are the unit of materialization and placement: the substrate
/// computes a bundle as a whole, so its pieces always land on one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionBundle {
    features: PartitionHandle,
    labels: PartitionHandle,
    weights: Option<PartitionHandle>,
}

impl PartitionBundle {
    pub fn new(
        features: PartitionHandle,
        labels: PartitionHandle,
        weights: Option<PartitionHandle>,
    ) -> Self {
        Self {
            features,
            labels,
            weights,
        }
    }

    pub fn features(&self) -> &PartitionHandle {
        &self.features
    }

    pub fn labels(&self) -> &PartitionHandle {
        &self.labels
    }

    pub fn weights(&self) -> Option<&PartitionHandle> {
        self.weights.as_ref()
    }
}

/// Feature/label/weight partition handles validated for equal arity once.
///
/// Construction is the only place the three-parallel-sequences shape is
/// accepted; past this boundary only zipped bundles circulate, so the
/// co-location invariant cannot silently drift.
#[derive(Debug, Clone)]
pub struct AlignedPartitionSet {
    bundles: Vec<PartitionBundle>,
    has_weights: bool,
}

impl AlignedPartitionSet {
    /// Zip feature, label, and optional weight handles into bundles.
    ///
    /// # Errors
    ///
    /// Returns `ArityMismatch` when the sequences differ in length. No
    /// remote work happens here or afterwards until the set is handed to
    /// the locator.
    pub fn new(
        features: Vec<PartitionHandle>,
        labels: Vec<PartitionHandle>,
        weights: Option<Vec<PartitionHandle>>,
    ) -> Result<Self> {
        let weight_len = weights.as_ref().map(Vec::len);
        if labels.len() != features.len() || weight_len.is_some_and(|w| w != features.len()) {
            return Err(CoordinatorError::arity_mismatch(
                features.len(),
                labels.len(),
                weight_len,
            ));
        }

        let has_weights = weights.is_some();
        let bundles = match weights {
            Some(weights) => features
                .into_iter()
                .zip(labels)
                .zip(weights)
                .map(|((f, l), w)| PartitionBundle::new(f, l, Some(w)))
                .collect(),
            None => features
                .into_iter()
                .zip(labels)
                .map(|(f, l)| PartitionBundle::new(f, l, None))
                .collect(),
        };

        Ok(Self {
            bundles,
            has_weights,
        })
    }

    pub fn bundles(&self) -> &[PartitionBundle] {
        &self.bundles
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn has_weights(&self) -> bool {
        self.has_weights
    }
}

/// Kind discriminator for partition payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    Array,
    Table,
    SparseMatrix,
}

impl ContainerKind {
    pub fn name(self) -> &'static str {
        match self {
            ContainerKind::Array => "array",
            ContainerKind::Table => "table",
            ContainerKind::SparseMatrix => "sparse matrix",
        }
    }
}

/// Row-major dense matrix of `f64` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl DenseMatrix {
    /// # Errors
    ///
    /// Returns `InvalidPayload` when `values.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, values: Vec<f64>) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(CoordinatorError::invalid_payload(format!(
                "dense matrix of {}x{} needs {} values, got {}",
                rows,
                cols,
                rows * cols,
                values.len()
            )));
        }
        Ok(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Row `i` as a slice. Panics if `i` is out of bounds.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.cols..(i + 1) * self.cols]
    }
}

/// Column-labelled table with an explicit row index.
///
/// Values are row-major, `index.len()` rows by `columns.len()` columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    index: Vec<u64>,
    values: Vec<f64>,
}

impl Table {
    /// # Errors
    ///
    /// Returns `InvalidPayload` when the value buffer does not match the
    /// index length times the column count.
    pub fn new(columns: Vec<String>, index: Vec<u64>, values: Vec<f64>) -> Result<Self> {
        if values.len() != index.len() * columns.len() {
            return Err(CoordinatorError::invalid_payload(format!(
                "table with {} rows and {} columns needs {} values, got {}",
                index.len(),
                columns.len(),
                index.len() * columns.len(),
                values.len()
            )));
        }
        Ok(Self {
            columns,
            index,
            values,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn index(&self) -> &[u64] {
        &self.index
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    /// Row `i` as a slice. Panics if `i` is out of bounds.
    pub fn row(&self, i: usize) -> &[f64] {
        &self.values[i * self.columns.len()..(i + 1) * self.columns.len()]
    }
}

/// Compressed sparse row matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsrMatrix {
    rows: usize,
    cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    /// # Errors
    ///
    /// Returns `InvalidPayload` when the CSR structure is inconsistent
    /// (wrong `indptr` length, non-monotone row offsets, or column indices
    /// out of range).
    pub fn new(
        rows: usize,
        cols: usize,
        indptr: Vec<usize>,
        indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if indptr.len() != rows + 1 {
            return Err(CoordinatorError::invalid_payload(format!(
                "csr indptr length {} does not match {} rows",
                indptr.len(),
                rows
            )));
        }
        if indptr.first() != Some(&0) || indptr.last() != Some(&values.len()) {
            return Err(CoordinatorError::invalid_payload(
                "csr indptr must start at 0 and end at the value count",
            ));
        }
        if indptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(CoordinatorError::invalid_payload(
                "csr indptr must be non-decreasing",
            ));
        }
        if indices.len() != values.len() {
            return Err(CoordinatorError::invalid_payload(format!(
                "csr has {} column indices for {} values",
                indices.len(),
                values.len()
            )));
        }
        if indices.iter().any(|&c| c >= cols) {
            return Err(CoordinatorError::invalid_payload(format!(
                "csr column index out of range (cols: {})",
                cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            indptr,
            indices,
            values,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Row `i` densified into a fresh vector. Panics if `i` is out of bounds.
    pub fn dense_row(&self, i: usize) -> Vec<f64> {
        let mut row = vec![0.0; self.cols];
        for k in self.indptr[i]..self.indptr[i + 1] {
            row[self.indices[k]] = self.values[k];
        }
        row
    }
}

/// One partition's payload, in one of the closed set of container kinds.
///
/// The kind is inspected exactly once per operation; there is no open-ended
/// dispatch on payload types anywhere else in the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PartitionData {
    Array(DenseMatrix),
    Table(Table),
    Sparse(CsrMatrix),
}

impl PartitionData {
    pub fn kind(&self) -> ContainerKind {
        match self {
            PartitionData::Array(_) => ContainerKind::Array,
            PartitionData::Table(_) => ContainerKind::Table,
            PartitionData::Sparse(_) => ContainerKind::SparseMatrix,
        }
    }

    pub fn num_rows(&self) -> usize {
        match self {
            PartitionData::Array(m) => m.rows(),
            PartitionData::Table(t) => t.num_rows(),
            PartitionData::Sparse(s) => s.rows(),
        }
    }

    pub fn num_cols(&self) -> usize {
        match self {
            PartitionData::Array(m) => m.cols(),
            PartitionData::Table(t) => t.columns().len(),
            PartitionData::Sparse(s) => s.cols(),
        }
    }

    /// Row `i` as a dense vector, regardless of kind.
    ///
    /// Panics if `i` is out of bounds.
    pub fn dense_row(&self, i: usize) -> Vec<f64> {
        match self {
            PartitionData::Array(m) => m.row(i).to_vec(),
            PartitionData::Table(t) => t.row(i).to_vec(),
            PartitionData::Sparse(s) => s.dense_row(i),
        }
    }

    /// Concatenate same-kind partitions, preserving row order.
    ///
    /// # Errors
    ///
    /// Returns `Concat` when the input is empty, the kinds are mixed, or
    /// the column shapes disagree.
    pub fn concat(parts: Vec<PartitionData>) -> Result<PartitionData> {
        let mut iter = parts.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| CoordinatorError::concat("no partitions to concatenate"))?;

        match first {
            PartitionData::Array(head) => {
                let mut rows = head.rows;
                let mut values = head.values;
                for part in iter {
                    let m = match part {
                        PartitionData::Array(m) => m,
                        other => return Err(mixed_kinds(ContainerKind::Array, other.kind())),
                    };
                    if m.cols != head.cols {
                        return Err(CoordinatorError::concat(format!(
                            "column count mismatch: {} vs {}",
                            head.cols, m.cols
                        )));
                    }
                    rows += m.rows;
                    values.extend(m.values);
                }
                Ok(PartitionData::Array(DenseMatrix {
                    rows,
                    cols: head.cols,
                    values,
                }))
            }
            PartitionData::Table(head) => {
                let mut index = head.index;
                let mut values = head.values;
                for part in iter {
                    let t = match part {
                        PartitionData::Table(t) => t,
                        other => return Err(mixed_kinds(ContainerKind::Table, other.kind())),
                    };
                    if t.columns != head.columns {
                        return Err(CoordinatorError::concat(format!(
                            "table columns differ: {:?} vs {:?}",
                            head.columns, t.columns
                        )));
                    }
                    index.extend(t.index);
                    values.extend(t.values);
                }
                Ok(PartitionData::Table(Table {
                    columns: head.columns,
                    index,
                    values,
                }))
            }
            PartitionData::Sparse(head) => {
                let mut rows = head.rows;
                let mut indptr = head.indptr;
                let mut indices = head.indices;
                let mut values = head.values;
                for part in iter {
                    let s = match part {
                        PartitionData::Sparse(s) => s,
                        other => {
                            return Err(mixed_kinds(ContainerKind::SparseMatrix, other.kind()))
                        }
                    };
                    if s.cols != head.cols {
                        return Err(CoordinatorError::concat(format!(
                            "column count mismatch: {} vs {}",
                            head.cols, s.cols
                        )));
                    }
                    let offset = values.len();
                    // indptr[0] is always 0; skip it when appending
                    indptr.extend(s.indptr.iter().skip(1).map(|p| p + offset));
                    indices.extend(s.indices);
                    values.extend(s.values);
                    rows += s.rows;
                }
                Ok(PartitionData::Sparse(CsrMatrix {
                    rows,
                    cols: head.cols,
                    indptr,
                    indices,
                    values,
                }))
            }
        }
    }
}

fn mixed_kinds(expected: ContainerKind, got: ContainerKind) -> CoordinatorError {
    CoordinatorError::concat(format!(
        "mixed container kinds: {} vs {}",
        expected.name(),
        got.name()
    ))
}

/// Materialized payload of one bundle, as delivered to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleData {
    pub features: PartitionData,
    pub labels: Vec<f64>,
    pub weights: Option<Vec<f64>>,
}

impl BundleData {
    /// Merge per-bundle payloads into one contiguous local shard.
    ///
    /// Row order follows bundle order; labels and weights append in the
    /// same order as the feature blocks they belong to.
    ///
    /// # Errors
    ///
    /// Returns `Concat` when the input is empty, weights are present on
    /// only some bundles, or the merged label count does not match the
    /// merged feature rows.
    pub fn concat(parts: Vec<BundleData>) -> Result<BundleData> {
        if parts.is_empty() {
            return Err(CoordinatorError::concat("no bundle payloads to merge"));
        }

        let weighted = parts[0].weights.is_some();
        if parts.iter().any(|p| p.weights.is_some() != weighted) {
            return Err(CoordinatorError::concat(
                "weight partitions present on only some bundles",
            ));
        }

        let mut features = Vec::with_capacity(parts.len());
        let mut labels = Vec::new();
        let mut weights = if weighted { Some(Vec::new()) } else { None };
        for part in parts {
            features.push(part.features);
            labels.extend(part.labels);
            if let (Some(all), Some(w)) = (weights.as_mut(), part.weights) {
                all.extend(w);
            }
        }

        let features = PartitionData::concat(features)?;
        if labels.len() != features.num_rows() {
            return Err(CoordinatorError::concat(format!(
                "{} labels for {} feature rows",
                labels.len(),
                features.num_rows()
            )));
        }
        if let Some(w) = &weights {
            if w.len() != features.num_rows() {
                return Err(CoordinatorError::concat(format!(
                    "{} weights for {} feature rows",
                    w.len(),
                    features.num_rows()
                )));
            }
        }

        Ok(BundleData {
            features,
            labels,
            weights,
        })
    }
}
