//! Simulation runs nested inside a single step
//!
//! [`EmbeddedSimulationRunIteration`] runs a complete inner simulation to
//! termination every time the enclosing partition is stepped, and returns the
//! concatenation of the inner partitions' final states.
//!
//! # Parameter Overrides
//!
//! Params of the enclosing partition named `"<k>/<name>"` are forwarded to
//! inner partition `k` before each run:
//!
//! - `"<k>/init_state_values"` replaces the inner initial state
//! - `"<k>/state_memory_partition"` (read once, in `configure`) maps an
//!   enclosing partition index onto inner partition `k` for memory replay
//! - any other `"<k>/<name>"` sets inner param `name`
//!
//! Unprefixed params `burn_in_steps` and `init_time_value` are optional.
//!
//! # Modes
//!
//! Without any state-memory mapping the inner run goes **forward** from the
//! enclosing current time. With a mapping it **replays** the enclosing
//! history window: every mapped enclosing partition must keep the same
//! history depth `d`, the inner timestep function is swapped for a
//! [`FromHistoryTimestepFunction`] over the most recent `d` enclosing times,
//! the inner run starts from the oldest of those times, and each mapped inner
//! [`FromHistoryIteration`](crate::iterations::FromHistoryIteration) replays
//! the mapped enclosing partition's history from its oldest row. States and
//! times of the replay therefore always come from the same window.

use crate::config::settings::{Implementations, Settings};
use crate::coordinator::PartitionCoordinator;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::strategy::{FromHistoryTimestepFunction, Iteration, TimestepFunction};
use std::collections::BTreeMap;
use tracing::debug;

pub const BURN_IN_STEPS: &str = "burn_in_steps";
pub const INIT_TIME_VALUE: &str = "init_time_value";
pub const INIT_STATE_VALUES: &str = "init_state_values";
pub const STATE_MEMORY_PARTITION: &str = "state_memory_partition";

/// Runs an inner simulation to termination on every step
pub struct EmbeddedSimulationRunIteration {
    settings: Settings,
    /// Taken while an inner run is in flight
    implementations: Option<Implementations>,
    /// Enclosing partition index -> inner partition index
    state_memory_partitions: BTreeMap<usize, usize>,
    /// Shared history depth of the mapped enclosing partitions
    replay_depth: usize,
    burn_in_steps: usize,
}

impl EmbeddedSimulationRunIteration {
    pub fn new(settings: Settings, implementations: Implementations) -> Self {
        Self {
            settings,
            implementations: Some(implementations),
            state_memory_partitions: BTreeMap::new(),
            replay_depth: 0,
            burn_in_steps: 0,
        }
    }

    /// Inner settings as configured (before per-run overrides)
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Enclosing partition index -> inner partition index
    pub fn state_memory_partitions(&self) -> &BTreeMap<usize, usize> {
        &self.state_memory_partitions
    }

    fn implementations_mut(&mut self) -> SimulationResult<&mut Implementations> {
        self.implementations.as_mut().ok_or_else(lost_implementations)
    }

    /// Inner settings for one run, with the enclosing params applied
    fn overridden_settings(&self, params: &Params) -> SimulationResult<Settings> {
        let mut settings = self.settings.clone();
        let num_partitions = settings.num_partitions();
        for (name, values) in params.iter() {
            let Some((inner, inner_name)) = split_inner_param(name) else {
                continue;
            };
            let partition = settings.iterations.get_mut(inner).ok_or(
                SimulationError::UnknownPartitionIndex {
                    index: inner,
                    num_partitions,
                },
            )?;
            match inner_name {
                INIT_STATE_VALUES => partition.init_state_values = values.to_vec(),
                STATE_MEMORY_PARTITION => {}
                _ => partition.params.set(inner_name, values.to_vec()),
            }
        }
        Ok(settings)
    }

    fn run_inner(
        &mut self,
        settings: &Settings,
        replay_timesteps: Option<CumulativeTimestepsHistory>,
    ) -> SimulationResult<Vec<f64>> {
        settings.validate()?;
        let mut implementations = self.implementations.take().ok_or_else(lost_implementations)?;

        let original_timestep = replay_timesteps.map(|data| {
            std::mem::replace(
                &mut implementations.timestep_function,
                Box::new(FromHistoryTimestepFunction::new(data)) as Box<dyn TimestepFunction>,
            )
        });

        let mut coordinator = PartitionCoordinator::new(settings, implementations)?;
        let outcome = coordinator.run();
        let final_states: Vec<f64> = coordinator
            .state_histories()
            .iter()
            .flat_map(|history| history.latest().iter().copied())
            .collect();

        let mut implementations = coordinator.into_implementations();
        if let Some(timestep_function) = original_timestep {
            implementations.timestep_function = timestep_function;
        }
        self.implementations = Some(implementations);

        outcome.map(|_| final_states)
    }
}

fn lost_implementations() -> SimulationError {
    SimulationError::InvalidConfig(
        "embedded implementations were lost after a failed inner run".to_string(),
    )
}

/// Split `"<k>/<name>"` into the inner partition index and param name
fn split_inner_param(name: &str) -> Option<(usize, &str)> {
    let (index, inner_name) = name.split_once('/')?;
    let index = index.parse().ok()?;
    if inner_name.is_empty() {
        return None;
    }
    Some((index, inner_name))
}

impl Iteration for EmbeddedSimulationRunIteration {
    fn configure(&mut self, partition_index: usize, settings: &Settings) -> SimulationResult<()> {
        self.settings.tag_params();
        let inner_settings = &self.settings;
        let implementations = self.implementations.as_mut().ok_or_else(lost_implementations)?;
        if implementations.iterations.len() != inner_settings.num_partitions() {
            return Err(SimulationError::InvalidConfig(format!(
                "embedded simulation has {} iterations for {} partitions",
                implementations.iterations.len(),
                inner_settings.num_partitions()
            )));
        }
        implementations.configure(inner_settings)?;

        let params = &settings.iteration(partition_index)?.params;
        let mut mappings = BTreeMap::new();
        for name in params.names() {
            if let Some((inner, STATE_MEMORY_PARTITION)) = split_inner_param(name) {
                let outer = partition_index_param(params, name)?;
                mappings.insert(outer, inner);
                debug!(outer, inner, "State memory partition mapped");
            }
        }

        let num_partitions = implementations.iterations.len();
        for &inner in mappings.values() {
            let iteration = implementations
                .iterations
                .get_mut(inner)
                .ok_or(SimulationError::UnknownPartitionIndex {
                    index: inner,
                    num_partitions,
                })?;
            if iteration.from_history_mut().is_none() {
                return Err(SimulationError::NotMemoryIteration(inner));
            }
        }

        let mut replay_depth = 0;
        for &outer in mappings.keys() {
            let mapped = settings.iteration(outer)?;
            if replay_depth != 0 && mapped.state_history_depth != replay_depth {
                return Err(SimulationError::InvalidConfig(format!(
                    "state memory partitions must share one history depth: {} keeps {} \
                     but another keeps {}",
                    mapped.name, mapped.state_history_depth, replay_depth
                )));
            }
            replay_depth = mapped.state_history_depth;
        }
        if replay_depth > settings.timesteps_history_depth {
            return Err(SimulationError::InvalidConfig(format!(
                "state memory depth {} exceeds timesteps history depth {}",
                replay_depth, settings.timesteps_history_depth
            )));
        }

        self.state_memory_partitions = mappings;
        self.replay_depth = replay_depth;
        self.burn_in_steps = params.get_or_default_index(BURN_IN_STEPS, 0, 0.0)? as usize;
        Ok(())
    }

    fn iterate(
        &mut self,
        params: &Params,
        partition_index: usize,
        state_histories: &[StateHistory],
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        if timesteps_history.current_step_number() < self.burn_in_steps {
            return Ok(state_histories[partition_index].copy_row(0));
        }

        let mut settings = self.overridden_settings(params)?;

        if self.state_memory_partitions.is_empty() {
            settings.init_time_value = params
                .get_or_default_index(INIT_TIME_VALUE, 0, timesteps_history.current_time())?;
            return self.run_inner(&settings, None);
        }

        let depth = self.replay_depth;
        let times = timesteps_history.values().get(..depth).ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "state memory depth {} exceeds timesteps history depth {}",
                depth,
                timesteps_history.depth()
            ))
        })?;
        let window = CumulativeTimestepsHistory::from_values(
            times.to_vec(),
            timesteps_history.next_increment(),
            timesteps_history.current_step_number(),
        )?;
        settings.init_time_value = window.at(depth - 1);

        let mappings = self.state_memory_partitions.clone();
        let implementations = self.implementations_mut()?;
        for (outer, inner) in mappings {
            let data = state_histories[outer].clone();
            settings.iterations[inner].init_state_values = data.copy_row(depth - 1);
            implementations.iterations[inner]
                .from_history_mut()
                .ok_or(SimulationError::NotMemoryIteration(inner))?
                .set_data(data);
        }
        self.run_inner(&settings, Some(window))
    }
}

/// Read a param holding a partition index, rejecting non-integral values
fn partition_index_param(params: &Params, name: &str) -> SimulationResult<usize> {
    let value = params.get_index(name, 0)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(SimulationError::InvalidConfig(format!(
            "partition: {}, param: {} must hold a partition index, found {}",
            params.partition_name(),
            name,
            value
        )));
    }
    Ok(value as usize)
}

impl std::fmt::Debug for EmbeddedSimulationRunIteration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedSimulationRunIteration")
            .field("partitions", &self.settings.num_partitions())
            .field("state_memory_partitions", &self.state_memory_partitions)
            .field("replay_depth", &self.replay_depth)
            .field("burn_in_steps", &self.burn_in_steps)
            .finish_non_exhaustive()
    }
}
