//! Name-based simulation builder
//!
//! [`ConfigGenerator`] collects partitions by name and resolves them into the
//! index-addressed [`Settings`] and [`Implementations`] a coordinator runs.
//!
//! # Resolution
//!
//! Resolution is two-pass: every partition is registered first, then
//! [`ConfigGenerator::generate_configs`] assigns indices and rewrites every
//! name reference into an index. A reference to an unregistered name is a
//! configuration error raised here, before any step executes.
//!
//! Partitions keep their registration order, except that members of the same
//! parallel group are pulled together at the position of the group's first
//! member.
//!
//! # Example
//!
//! ```rust
//! use lockstep_engine::config::{ConfigGenerator, PartitionConfig, SimulationConfig};
//! use lockstep_engine::iterations::{ConstantValuesIteration, ParamValuesIteration};
//! use lockstep_engine::strategy::{ConstantTimestepFunction, NumberOfStepsTerminationCondition};
//! use lockstep_engine::PartitionCoordinator;
//!
//! let mut generator = ConfigGenerator::new();
//! generator.set_simulation(SimulationConfig::new(
//!     Box::new(NumberOfStepsTerminationCondition { max_number_of_steps: 2 }),
//!     Box::new(ConstantTimestepFunction { stepsize: 1.0 }),
//! ));
//! generator
//!     .set_partition(PartitionConfig::new("source", Box::new(ConstantValuesIteration), vec![4.0, 5.0]))
//!     .unwrap();
//! generator
//!     .set_partition(
//!         PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0])
//!             .with_upstream("param_values", "source", Some(vec![1])),
//!     )
//!     .unwrap();
//!
//! let (settings, implementations) = generator.generate_configs().unwrap();
//! assert_eq!(settings.iterations[1].params_from_upstream["param_values"].upstream, 0);
//!
//! let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
//! coordinator.run().unwrap();
//! assert_eq!(coordinator.state_histories()[1].latest(), &[5.0]);
//! ```

use super::settings::{Implementations, IterationSettings, Settings, UpstreamConfig};
use crate::error::{SimulationError, SimulationResult};
use crate::models::params::Params;
use crate::strategy::{
    Iteration, NilOutputCondition, NilOutputFunction, OutputCondition, OutputFunction,
    TerminationCondition, TimestepFunction,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// Configuration Types
// ============================================================================

/// Name-based reference to another partition's current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUpstreamConfig {
    pub upstream: String,
    /// Elements of the upstream state to select (None = whole state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indices: Option<Vec<usize>>,
}

/// One partition, as registered with the generator
pub struct PartitionConfig {
    pub name: String,
    pub iteration: Box<dyn Iteration>,
    pub params: Params,
    /// Param name -> partition names, resolved to their indices
    pub params_as_partitions: BTreeMap<String, Vec<String>>,
    /// Param name -> upstream partition refreshed into it every step
    pub params_from_upstream: BTreeMap<String, NamedUpstreamConfig>,
    pub init_state_values: Vec<f64>,
    pub seed: u64,
    pub state_width: usize,
    pub state_history_depth: usize,
    /// Partitions sharing a label run in order on one worker
    pub parallel_group: Option<String>,
}

impl PartitionConfig {
    /// Partition of width `init_state_values.len()` keeping only its current state
    pub fn new(
        name: impl Into<String>,
        iteration: Box<dyn Iteration>,
        init_state_values: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            iteration,
            params: Params::default(),
            params_as_partitions: BTreeMap::new(),
            params_from_upstream: BTreeMap::new(),
            state_width: init_state_values.len(),
            init_state_values,
            seed: 0,
            state_history_depth: 1,
            parallel_group: None,
        }
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params = params;
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.params.set(name, values);
        self
    }

    pub fn with_upstream(
        mut self,
        param: impl Into<String>,
        upstream: impl Into<String>,
        indices: Option<Vec<usize>>,
    ) -> Self {
        self.params_from_upstream.insert(
            param.into(),
            NamedUpstreamConfig {
                upstream: upstream.into(),
                indices,
            },
        );
        self
    }

    pub fn with_params_as_partitions(
        mut self,
        param: impl Into<String>,
        partitions: Vec<String>,
    ) -> Self {
        self.params_as_partitions.insert(param.into(), partitions);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_history_depth(mut self, depth: usize) -> Self {
        self.state_history_depth = depth;
        self
    }

    pub fn in_parallel_group(mut self, group: impl Into<String>) -> Self {
        self.parallel_group = Some(group.into());
        self
    }
}

impl std::fmt::Debug for PartitionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionConfig")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("params_as_partitions", &self.params_as_partitions)
            .field("params_from_upstream", &self.params_from_upstream)
            .field("init_state_values", &self.init_state_values)
            .field("seed", &self.seed)
            .field("state_width", &self.state_width)
            .field("state_history_depth", &self.state_history_depth)
            .field("parallel_group", &self.parallel_group)
            .finish_non_exhaustive()
    }
}

/// Simulation-wide strategies and time settings
pub struct SimulationConfig {
    pub output_condition: Arc<dyn OutputCondition>,
    pub output_function: Arc<dyn OutputFunction>,
    pub termination_condition: Box<dyn TerminationCondition>,
    pub timestep_function: Box<dyn TimestepFunction>,
    pub init_time_value: f64,
    /// Lower bound; raised to the deepest partition history
    pub timesteps_history_depth: usize,
}

impl SimulationConfig {
    /// Configuration starting at time 0 that produces no output
    pub fn new(
        termination_condition: Box<dyn TerminationCondition>,
        timestep_function: Box<dyn TimestepFunction>,
    ) -> Self {
        Self {
            output_condition: Arc::new(NilOutputCondition),
            output_function: Arc::new(NilOutputFunction),
            termination_condition,
            timestep_function,
            init_time_value: 0.0,
            timesteps_history_depth: 1,
        }
    }

    pub fn with_output(
        mut self,
        output_condition: Arc<dyn OutputCondition>,
        output_function: Arc<dyn OutputFunction>,
    ) -> Self {
        self.output_condition = output_condition;
        self.output_function = output_function;
        self
    }

    pub fn with_init_time_value(mut self, init_time_value: f64) -> Self {
        self.init_time_value = init_time_value;
        self
    }

    pub fn with_timesteps_history_depth(mut self, depth: usize) -> Self {
        self.timesteps_history_depth = depth;
        self
    }
}

impl std::fmt::Debug for SimulationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationConfig")
            .field("init_time_value", &self.init_time_value)
            .field("timesteps_history_depth", &self.timesteps_history_depth)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Generator
// ============================================================================

/// Collects partitions by name and resolves them into run-ready configs
#[derive(Debug, Default)]
pub struct ConfigGenerator {
    global_seed: Option<u64>,
    simulation: Option<SimulationConfig>,
    /// Registration order
    names: Vec<String>,
    partitions: HashMap<String, PartitionConfig>,
}

impl ConfigGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_simulation(&mut self, config: SimulationConfig) {
        self.simulation = Some(config);
    }

    pub fn simulation(&self) -> Option<&SimulationConfig> {
        self.simulation.as_ref()
    }

    /// Register a new partition; names must be unique
    pub fn set_partition(&mut self, config: PartitionConfig) -> SimulationResult<()> {
        if self.partitions.contains_key(&config.name) {
            return Err(SimulationError::DuplicatePartition(config.name));
        }
        self.names.push(config.name.clone());
        self.partitions.insert(config.name.clone(), config);
        Ok(())
    }

    /// Replace a registered partition, keeping its registration position
    pub fn reset_partition(&mut self, name: &str, config: PartitionConfig) -> SimulationResult<()> {
        if !self.partitions.contains_key(name) {
            return Err(SimulationError::UnknownPartition {
                referenced_by: "reset_partition".to_string(),
                name: name.to_string(),
            });
        }
        if config.name != name {
            if self.partitions.contains_key(&config.name) {
                return Err(SimulationError::DuplicatePartition(config.name));
            }
            self.partitions.remove(name);
            for registered in &mut self.names {
                if registered == name {
                    *registered = config.name.clone();
                }
            }
        }
        self.partitions.insert(config.name.clone(), config);
        Ok(())
    }

    pub fn partition(&self, name: &str) -> Option<&PartitionConfig> {
        self.partitions.get(name)
    }

    pub fn partition_names(&self) -> &[String] {
        &self.names
    }

    /// Derive every partition's seed from `seed` and the partition's name
    ///
    /// Overrides the per-partition seeds at generation time.
    pub fn set_global_seed(&mut self, seed: u64) {
        self.global_seed = Some(seed);
    }

    pub fn global_seed(&self) -> Option<u64> {
        self.global_seed
    }

    /// Resolve every name reference and build the run-ready configs
    ///
    /// Runs every iteration's `configure` hook against the resolved settings.
    pub fn generate_configs(mut self) -> SimulationResult<(Settings, Implementations)> {
        let simulation = self
            .simulation
            .take()
            .ok_or(SimulationError::MissingSimulationConfig)?;

        let (order, parallel_groups) = self.resolve_order();
        let index_by_name: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(index, name)| (name.as_str(), index))
            .collect();

        let mut settings_list = Vec::with_capacity(order.len());
        for name in &order {
            let config = &self.partitions[name];
            settings_list.push(self.resolve_partition(config, &index_by_name)?);
        }

        let timesteps_history_depth = settings_list
            .iter()
            .map(|it| it.state_history_depth)
            .fold(simulation.timesteps_history_depth, usize::max);

        let mut settings = Settings {
            iterations: settings_list,
            init_time_value: simulation.init_time_value,
            timesteps_history_depth,
            parallel_groups,
        };
        settings.tag_params();
        settings.validate()?;

        let iterations = order
            .iter()
            .filter_map(|name| self.partitions.remove(name))
            .map(|config| config.iteration)
            .collect();
        let mut implementations = Implementations {
            iterations,
            output_condition: simulation.output_condition,
            output_function: simulation.output_function,
            termination_condition: simulation.termination_condition,
            timestep_function: simulation.timestep_function,
        };
        implementations.configure(&settings)?;

        debug!(
            partitions = settings.num_partitions(),
            groups = settings.parallel_groups.len(),
            timesteps_history_depth,
            global_seed = ?self.global_seed,
            "Configs generated"
        );
        Ok((settings, implementations))
    }

    /// Registration order with parallel-group members pulled together
    fn resolve_order(&self) -> (Vec<String>, Vec<Vec<usize>>) {
        let mut groups: Vec<Vec<&String>> = Vec::new();
        let mut group_by_label: HashMap<&str, usize> = HashMap::new();
        for name in &self.names {
            let label = self.partitions[name].parallel_group.as_deref();
            match label.and_then(|l| group_by_label.get(l).copied()) {
                Some(group) => groups[group].push(name),
                None => {
                    if let Some(label) = label {
                        group_by_label.insert(label, groups.len());
                    }
                    groups.push(vec![name]);
                }
            }
        }

        let mut order = Vec::with_capacity(self.names.len());
        let mut parallel_groups = Vec::with_capacity(groups.len());
        for group in groups {
            let start = order.len();
            order.extend(group.into_iter().cloned());
            parallel_groups.push((start..order.len()).collect());
        }
        (order, parallel_groups)
    }

    fn resolve_partition(
        &self,
        config: &PartitionConfig,
        index_by_name: &HashMap<&str, usize>,
    ) -> SimulationResult<IterationSettings> {
        let resolve = |name: &str| {
            index_by_name
                .get(name)
                .copied()
                .ok_or_else(|| SimulationError::UnknownPartition {
                    referenced_by: config.name.clone(),
                    name: name.to_string(),
                })
        };

        let mut params = config.params.clone();
        for (param, names) in &config.params_as_partitions {
            let indices = names
                .iter()
                .map(|name| resolve(name.as_str()).map(|index| index as f64))
                .collect::<SimulationResult<Vec<_>>>()?;
            params.set(param.clone(), indices);
        }

        let mut params_from_upstream = BTreeMap::new();
        for (param, named) in &config.params_from_upstream {
            let upstream = resolve(named.upstream.as_str())?;
            let upstream_width = self.partitions[&named.upstream].state_width;
            for &index in named.indices.iter().flatten() {
                if index >= upstream_width {
                    return Err(SimulationError::UpstreamIndexOutOfRange {
                        partition: config.name.clone(),
                        param: param.clone(),
                        upstream: named.upstream.clone(),
                        index,
                        width: upstream_width,
                    });
                }
            }
            params_from_upstream.insert(
                param.clone(),
                UpstreamConfig {
                    upstream,
                    indices: named.indices.clone(),
                },
            );
        }

        let seed = match self.global_seed {
            Some(global_seed) => derive_seed(global_seed, &config.name),
            None => config.seed,
        };

        Ok(IterationSettings {
            name: config.name.clone(),
            params,
            params_from_upstream,
            init_state_values: config.init_state_values.clone(),
            seed,
            state_width: config.state_width,
            state_history_depth: config.state_history_depth,
        })
    }
}

/// First 8 bytes of SHA-256(global seed ‖ partition name), little-endian
pub fn derive_seed(global_seed: u64, partition_name: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(partition_name.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterations::ConstantValuesIteration;
    use crate::strategy::{ConstantTimestepFunction, NumberOfStepsTerminationCondition};

    fn simulation() -> SimulationConfig {
        SimulationConfig::new(
            Box::new(NumberOfStepsTerminationCondition {
                max_number_of_steps: 1,
            }),
            Box::new(ConstantTimestepFunction { stepsize: 1.0 }),
        )
    }

    fn constant(name: &str) -> PartitionConfig {
        PartitionConfig::new(name, Box::new(ConstantValuesIteration), vec![0.0])
    }

    #[test]
    fn test_parallel_group_members_pulled_together() {
        let mut generator = ConfigGenerator::new();
        generator.set_simulation(simulation());
        generator.set_partition(constant("a").in_parallel_group("g")).unwrap();
        generator.set_partition(constant("b")).unwrap();
        generator.set_partition(constant("c").in_parallel_group("g")).unwrap();

        let (settings, _) = generator.generate_configs().unwrap();
        let names: Vec<&str> = settings.iterations.iter().map(|it| it.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c", "b"]);
        assert_eq!(settings.parallel_groups, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_reset_keeps_registration_position() {
        let mut generator = ConfigGenerator::new();
        generator.set_simulation(simulation());
        generator.set_partition(constant("a")).unwrap();
        generator.set_partition(constant("b")).unwrap();
        generator
            .reset_partition("a", constant("a").with_param("rate", vec![2.0]))
            .unwrap();

        let (settings, _) = generator.generate_configs().unwrap();
        assert_eq!(settings.iterations[0].name, "a");
        assert_eq!(settings.iterations[0].params.get("rate").unwrap(), &[2.0]);
    }

    #[test]
    fn test_reset_unknown_partition_fails() {
        let mut generator = ConfigGenerator::new();
        assert!(matches!(
            generator.reset_partition("ghost", constant("ghost")),
            Err(SimulationError::UnknownPartition { .. })
        ));
    }

    #[test]
    fn test_timesteps_depth_covers_deepest_partition() {
        let mut generator = ConfigGenerator::new();
        generator.set_simulation(simulation().with_timesteps_history_depth(2));
        generator.set_partition(constant("a").with_history_depth(5)).unwrap();

        let (settings, _) = generator.generate_configs().unwrap();
        assert_eq!(settings.timesteps_history_depth, 5);
    }

    #[test]
    fn test_missing_simulation_config() {
        let mut generator = ConfigGenerator::new();
        generator.set_partition(constant("a")).unwrap();
        assert_eq!(
            generator.generate_configs().unwrap_err(),
            SimulationError::MissingSimulationConfig
        );
    }

    #[test]
    fn test_derived_seeds_differ_by_name() {
        assert_ne!(derive_seed(7, "a"), derive_seed(7, "b"));
        assert_eq!(derive_seed(7, "a"), derive_seed(7, "a"));
        assert_ne!(derive_seed(7, "a"), derive_seed(8, "a"));
    }
}
