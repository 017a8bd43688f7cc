// src/params.rs

//! Trainer parameter map.
//!
//! Parameters are an open string-keyed map because the local trainer owns
//! their meaning; the coordinator only reads and writes the handful of
//! networking keys listed in [`keys`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::topology::NetworkTopology;

/// Parameter keys the coordinator itself interprets.
pub mod keys {
    /// Comma-joined `host:port` ring entries, identical on every worker.
    pub const MACHINES: &str = "machines";
    /// The port this worker listens on during the collective round.
    pub const LOCAL_LISTEN_PORT: &str = "local_listen_port";
    /// Seconds a worker waits for its peers before giving up.
    pub const LISTEN_TIME_OUT: &str = "listen_time_out";
    /// Number of ring participants.
    pub const NUM_MACHINES: &str = "num_machines";
    /// Distribution mode handed to the trainer.
    pub const TREE_LEARNER: &str = "tree_learner";
    /// Trainer thread count on each worker.
    pub const NUM_THREADS: &str = "num_threads";
}

/// A single parameter value.
///
/// Untagged so that TOML and JSON parameter blocks read naturally:
/// `num_leaves = 31`, `learning_rate = 0.1`, `objective = "binary"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{}", v),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u16> for ParamValue {
    fn from(v: u16) -> Self {
        ParamValue::Int(i64::from(v))
    }
}

impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::Int(v as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

/// Ordered map of trainer parameters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingParams {
    values: BTreeMap<String, ParamValue>,
}

impl TrainingParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<ParamValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.values.get(key)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.values.get(key) {
            Some(ParamValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(ParamValue::Str(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Overwrite the networking keys with one worker's ring view.
    ///
    /// Called on a per-worker clone right before submission; every other
    /// entry in the map is left untouched.
    pub fn apply_topology(&mut self, topology: &NetworkTopology) {
        self.set(keys::MACHINES, topology.machines().to_string());
        self.set(keys::LOCAL_LISTEN_PORT, topology.local_listen_port());
        self.set(keys::LISTEN_TIME_OUT, topology.listen_timeout_secs());
        self.set(keys::NUM_MACHINES, topology.num_machines());
    }
}

impl FromIterator<(String, ParamValue)> for TrainingParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::WorkerId;

    #[test]
    fn test_set_and_get() {
        let mut params = TrainingParams::new();
        params.set("num_leaves", 31i64);
        params.set("learning_rate", 0.1);
        params.set("objective", "binary");
        params.set("verbose", false);

        assert_eq!(params.get_int("num_leaves"), Some(31));
        assert_eq!(params.get_str("objective"), Some("binary"));
        assert_eq!(params.get("learning_rate"), Some(&ParamValue::Float(0.1)));
        assert_eq!(params.get("verbose"), Some(&ParamValue::Bool(false)));
        assert_eq!(params.get("missing"), None);
        assert_eq!(params.get_int("objective"), None);
    }

    #[test]
    fn test_builder_chains() {
        let params = TrainingParams::new()
            .with("num_leaves", 31i64)
            .with("objective", "binary");

        assert_eq!(params.len(), 2);
        assert!(params.contains("num_leaves"));
    }

    #[test]
    fn test_apply_topology_injects_ring_keys() {
        let workers = vec![
            WorkerId::new("tcp://192.168.0.1:34545"),
            WorkerId::new("tcp://192.168.0.2:34346"),
            WorkerId::new("tcp://192.168.0.3:34347"),
        ];
        let topo = NetworkTopology::build(&workers, &workers[1], 12400, 120).unwrap();

        let mut params = TrainingParams::new().with("num_leaves", 31i64);
        params.apply_topology(&topo);

        assert_eq!(
            params.get_str(keys::MACHINES),
            Some("192.168.0.1:12400,192.168.0.2:12401,192.168.0.3:12402")
        );
        assert_eq!(params.get_int(keys::LOCAL_LISTEN_PORT), Some(12401));
        assert_eq!(params.get_int(keys::LISTEN_TIME_OUT), Some(120));
        assert_eq!(params.get_int(keys::NUM_MACHINES), Some(3));
        assert_eq!(params.get_int("num_leaves"), Some(31));
    }

    #[test]
    fn test_apply_topology_overwrites_stale_keys() {
        let workers = vec![WorkerId::new("tcp://10.0.0.1:7000")];
        let topo = NetworkTopology::build(&workers, &workers[0], 15000, 60).unwrap();

        let mut params = TrainingParams::new().with(keys::LOCAL_LISTEN_PORT, 12400u16);
        params.apply_topology(&topo);

        assert_eq!(params.get_int(keys::LOCAL_LISTEN_PORT), Some(15000));
    }

    #[test]
    fn test_toml_parameter_block() {
        let params: TrainingParams = toml::from_str(
            r#"
            num_leaves = 31
            learning_rate = 0.05
            objective = "multiclass"
            is_unbalance = true
            "#,
        )
        .unwrap();

        assert_eq!(params.get_int("num_leaves"), Some(31));
        assert_eq!(params.get("learning_rate"), Some(&ParamValue::Float(0.05)));
        assert_eq!(params.get_str("objective"), Some("multiclass"));
        assert_eq!(params.get("is_unbalance"), Some(&ParamValue::Bool(true)));
    }

    #[test]
    fn test_display() {
        assert_eq!(ParamValue::Int(7).to_string(), "7");
        assert_eq!(ParamValue::Float(0.5).to_string(), "0.5");
        assert_eq!(ParamValue::Str("data".to_string()).to_string(), "data");
        assert_eq!(ParamValue::Bool(true).to_string(), "true");
    }
}
