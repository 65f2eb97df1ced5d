//! Resolved simulation configuration
//!
//! A simulation is described by two halves:
//!
//! - [`Settings`]: pure data (widths, depths, seeds, initial values, params and
//!   index-resolved upstream references). Serializable with serde so it can be
//!   stored and reloaded as JSON.
//! - [`Implementations`]: the behaviour (update rules and the output,
//!   termination and timestep strategies).
//!
//! Both are normally produced by the [`ConfigGenerator`](crate::ConfigGenerator)
//! and consumed by [`PartitionCoordinator::new`](crate::PartitionCoordinator::new).

use crate::error::{SimulationError, SimulationResult};
use crate::models::params::Params;
use crate::strategy::{
    Iteration, NilOutputCondition, NilOutputFunction, OutputCondition, OutputFunction,
    TerminationCondition, TimestepFunction,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::sync::Arc;

// ============================================================================
// Settings
// ============================================================================

/// Index-resolved reference to another partition's current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Index of the upstream partition
    pub upstream: usize,

    /// Elements of the upstream state to select (None = whole state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
}

/// Per-partition settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSettings {
    /// Unique partition name
    pub name: String,

    /// Partition parameters
    #[serde(default)]
    pub params: Params,

    /// Params refreshed every step from other partitions' states
    #[serde(default)]
    pub params_from_upstream: BTreeMap<String, UpstreamConfig>,

    /// State written to row 0 of the history before the first step
    pub init_state_values: Vec<f64>,

    /// Seed for any randomness in the partition's update rule
    #[serde(default)]
    pub seed: u64,

    /// Length of the state vector
    pub state_width: usize,

    /// Number of past states retained (including the current one)
    pub state_history_depth: usize,
}

/// Complete run-ready simulation settings
///
/// # Example
/// ```
/// use lockstep_engine::Settings;
///
/// let settings = Settings::from_json_str(r#"{
///     "iterations": [{
///         "name": "counter",
///         "params": {"increment": [1.0]},
///         "init_state_values": [0.0],
///         "state_width": 1,
///         "state_history_depth": 2
///     }],
///     "timesteps_history_depth": 2
/// }"#).unwrap();
///
/// assert_eq!(settings.iterations[0].params.partition_name(), "counter");
/// assert_eq!(settings.partition_index("counter"), Some(0));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Per-partition settings in index order
    pub iterations: Vec<IterationSettings>,

    /// Cumulative time before the first step
    #[serde(default)]
    pub init_time_value: f64,

    /// Depth of the shared cumulative time history
    pub timesteps_history_depth: usize,

    /// Partition indices scheduled together on one worker, in serial order
    ///
    /// Empty means one group per partition. Groups must cover every
    /// partition exactly once, in index order.
    #[serde(default)]
    pub parallel_groups: Vec<Vec<usize>>,
}

impl Settings {
    /// Load settings from JSON and tag every param store with its partition name
    pub fn from_json_str(json: &str) -> SimulationResult<Self> {
        let mut settings: Settings = serde_json::from_str(json)
            .map_err(|e| SimulationError::InvalidConfig(format!("settings json: {}", e)))?;
        settings.tag_params();
        Ok(settings)
    }

    /// Serialize settings to pretty JSON
    pub fn to_json_string(&self) -> SimulationResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| SimulationError::InvalidConfig(format!("settings json: {}", e)))
    }

    /// Attach each partition's name to its param store
    pub fn tag_params(&mut self) {
        for iteration in &mut self.iterations {
            let name = iteration.name.clone();
            iteration.params.set_partition_name(name);
        }
    }

    pub fn num_partitions(&self) -> usize {
        self.iterations.len()
    }

    /// Look up a partition index by name
    pub fn partition_index(&self, name: &str) -> Option<usize> {
        self.iterations.iter().position(|it| it.name == name)
    }

    /// Settings of the partition at `index`
    pub fn iteration(&self, index: usize) -> SimulationResult<&IterationSettings> {
        self.iterations
            .get(index)
            .ok_or(SimulationError::UnknownPartitionIndex {
                index,
                num_partitions: self.iterations.len(),
            })
    }

    /// Resolve the parallel groups into contiguous index ranges
    pub fn group_ranges(&self) -> SimulationResult<Vec<Range<usize>>> {
        let n = self.iterations.len();
        if self.parallel_groups.is_empty() {
            return Ok((0..n).map(|i| i..i + 1).collect());
        }
        let mut ranges = Vec::with_capacity(self.parallel_groups.len());
        let mut next = 0;
        for group in &self.parallel_groups {
            if group.is_empty() {
                return Err(SimulationError::InvalidConfig(
                    "parallel groups must not be empty".to_string(),
                ));
            }
            let start = next;
            for index in group {
                if *index != next {
                    return Err(SimulationError::InvalidConfig(format!(
                        "parallel groups must list partitions contiguously in index order: \
                         expected {} but found {}",
                        next, index
                    )));
                }
                next += 1;
            }
            ranges.push(start..next);
        }
        if next != n {
            return Err(SimulationError::InvalidConfig(format!(
                "parallel groups cover {} of {} partitions",
                next, n
            )));
        }
        Ok(ranges)
    }

    /// Check shapes and references before a coordinator is built
    pub fn validate(&self) -> SimulationResult<()> {
        if self.timesteps_history_depth == 0 {
            return Err(SimulationError::InvalidConfig(
                "timesteps_history_depth must be > 0".to_string(),
            ));
        }
        let n = self.iterations.len();
        let mut names = HashSet::with_capacity(n);
        for iteration in &self.iterations {
            if !names.insert(iteration.name.as_str()) {
                return Err(SimulationError::DuplicatePartition(iteration.name.clone()));
            }
            if iteration.state_width == 0 {
                return Err(SimulationError::InvalidConfig(format!(
                    "partition: {} has zero state width",
                    iteration.name
                )));
            }
            if iteration.state_history_depth == 0 {
                return Err(SimulationError::InvalidConfig(format!(
                    "partition: {} has zero state history depth",
                    iteration.name
                )));
            }
            if iteration.init_state_values.len() != iteration.state_width {
                return Err(SimulationError::InvalidConfig(format!(
                    "partition: {} has {} initial values but state width {}",
                    iteration.name,
                    iteration.init_state_values.len(),
                    iteration.state_width
                )));
            }
            for (param, upstream) in &iteration.params_from_upstream {
                let target = self.iterations.get(upstream.upstream).ok_or(
                    SimulationError::UnknownPartitionIndex {
                        index: upstream.upstream,
                        num_partitions: n,
                    },
                )?;
                for index in upstream.indices.iter().flatten() {
                    if *index >= target.state_width {
                        return Err(SimulationError::UpstreamIndexOutOfRange {
                            partition: iteration.name.clone(),
                            param: param.clone(),
                            upstream: target.name.clone(),
                            index: *index,
                            width: target.state_width,
                        });
                    }
                }
            }
        }
        let ranges = self.group_ranges()?;
        self.check_upstream_order(&ranges)
    }

    /// Check that every upstream state can be computed before its readers
    ///
    /// Within a step a partition waits for the pending states of its
    /// upstreams, and each group runs its serial list in order. Waits plus
    /// serial order must therefore form an acyclic graph.
    fn check_upstream_order(&self, ranges: &[Range<usize>]) -> SimulationResult<()> {
        let n = self.iterations.len();
        let mut followers: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut waiting_on = vec![0usize; n];
        for (index, iteration) in self.iterations.iter().enumerate() {
            for upstream in iteration.params_from_upstream.values() {
                followers[upstream.upstream].push(index);
                waiting_on[index] += 1;
            }
        }
        for range in ranges {
            for index in range.start + 1..range.end {
                followers[index - 1].push(index);
                waiting_on[index] += 1;
            }
        }

        let mut ready: Vec<usize> = (0..n).filter(|&i| waiting_on[i] == 0).collect();
        let mut resolved = 0;
        while let Some(index) = ready.pop() {
            resolved += 1;
            for &follower in &followers[index] {
                waiting_on[follower] -= 1;
                if waiting_on[follower] == 0 {
                    ready.push(follower);
                }
            }
        }
        if resolved == n {
            return Ok(());
        }
        let stuck = (0..n).find(|&i| waiting_on[i] > 0).unwrap_or(0);
        Err(SimulationError::UpstreamOrderCycle {
            partition: self.iterations[stuck].name.clone(),
        })
    }
}

// ============================================================================
// Implementations
// ============================================================================

/// Behaviour half of a simulation configuration
///
/// `iterations[i]` is the update rule of the partition at index `i` in the
/// paired [`Settings`].
pub struct Implementations {
    pub iterations: Vec<Box<dyn Iteration>>,
    pub output_condition: Arc<dyn OutputCondition>,
    pub output_function: Arc<dyn OutputFunction>,
    pub termination_condition: Box<dyn TerminationCondition>,
    pub timestep_function: Box<dyn TimestepFunction>,
}

impl Implementations {
    /// Implementations that produce no output
    pub fn new(
        iterations: Vec<Box<dyn Iteration>>,
        termination_condition: Box<dyn TerminationCondition>,
        timestep_function: Box<dyn TimestepFunction>,
    ) -> Self {
        Self {
            iterations,
            output_condition: Arc::new(NilOutputCondition),
            output_function: Arc::new(NilOutputFunction),
            termination_condition,
            timestep_function,
        }
    }

    /// Replace the output condition and function
    pub fn with_output(
        mut self,
        output_condition: Arc<dyn OutputCondition>,
        output_function: Arc<dyn OutputFunction>,
    ) -> Self {
        self.output_condition = output_condition;
        self.output_function = output_function;
        self
    }

    /// Run every iteration's one-time configuration hook
    pub fn configure(&mut self, settings: &Settings) -> SimulationResult<()> {
        for (index, iteration) in self.iterations.iter_mut().enumerate() {
            iteration.configure(index, settings)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Implementations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Implementations")
            .field("iterations", &self.iterations.len())
            .finish_non_exhaustive()
    }
}
