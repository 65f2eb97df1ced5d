//! Parameter store
//!
//! Every partition owns one `Params` bag: a mapping from parameter name to a
//! numeric vector. It is the unit of data exchange between partitions, since
//! upstream references are written into it before each update rule runs.
//!
//! # Critical Invariants
//!
//! 1. Reads of an undeclared name fail with an error naming the owning
//!    partition and the key. There are no implicit defaults.
//! 2. Mutation is explicit (`set` / `set_index`).

use crate::error::{SimulationError, SimulationResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const UNSET_PARTITION_NAME: &str = "<name not set>";

/// Named numeric-vector parameters for a single partition
///
/// # Example
/// ```
/// use lockstep_engine::Params;
/// use std::collections::BTreeMap;
///
/// let mut params = Params::new(BTreeMap::new());
/// params.set_partition_name("walk");
/// params.set("variances", vec![1.0, 2.0]);
///
/// assert_eq!(params.get("variances").unwrap(), &[1.0, 2.0]);
/// assert!(params.get("drifts").is_err());
/// assert!(params.get_ok("drifts").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params {
    values: BTreeMap<String, Vec<f64>>,

    /// Owning partition, used only for diagnostics
    #[serde(skip)]
    partition_name: String,
}

impl Default for Params {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

impl Params {
    /// Create a parameter store from an existing map
    pub fn new(values: BTreeMap<String, Vec<f64>>) -> Self {
        Self {
            values,
            partition_name: UNSET_PARTITION_NAME.to_string(),
        }
    }

    /// Build a parameter store from `(name, values)` pairs
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Attach the owning partition name for better error messages
    pub fn set_partition_name(&mut self, name: impl Into<String>) {
        self.partition_name = name.into();
    }

    pub fn partition_name(&self) -> &str {
        if self.partition_name.is_empty() {
            UNSET_PARTITION_NAME
        } else {
            &self.partition_name
        }
    }

    fn missing(&self, name: &str) -> SimulationError {
        SimulationError::MissingParam {
            partition: self.partition_name().to_string(),
            name: name.to_string(),
        }
    }

    fn out_of_range(&self, name: &str, index: usize, len: usize) -> SimulationError {
        SimulationError::ParamIndexOutOfRange {
            partition: self.partition_name().to_string(),
            name: name.to_string(),
            index,
            len,
        }
    }

    /// Get parameter values, failing loudly if they were never declared
    pub fn get(&self, name: &str) -> SimulationResult<&[f64]> {
        self.values
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| self.missing(name))
    }

    /// Get parameter values if present
    pub fn get_ok(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Get an owned copy of parameter values
    pub fn get_copy(&self, name: &str) -> SimulationResult<Vec<f64>> {
        self.get(name).map(<[f64]>::to_vec)
    }

    /// Get a single element of a parameter vector
    pub fn get_index(&self, name: &str, index: usize) -> SimulationResult<f64> {
        let values = self.get(name)?;
        values
            .get(index)
            .copied()
            .ok_or_else(|| self.out_of_range(name, index, values.len()))
    }

    /// Get a single element, or `default` when the parameter is not declared
    ///
    /// An out-of-range index on a declared parameter is still an error.
    pub fn get_or_default_index(
        &self,
        name: &str,
        index: usize,
        default: f64,
    ) -> SimulationResult<f64> {
        match self.values.get(name) {
            Some(_) => self.get_index(name, index),
            None => Ok(default),
        }
    }

    /// Create or replace parameter values
    pub fn set(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.values.insert(name.into(), values);
    }

    /// Update a single element of an existing parameter vector
    pub fn set_index(&mut self, name: &str, index: usize, value: f64) -> SimulationResult<()> {
        let len = self.get(name)?.len();
        if index >= len {
            return Err(self.out_of_range(name, index, len));
        }
        if let Some(values) = self.values.get_mut(name) {
            values[index] = value;
        }
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Parameter names in sorted order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
