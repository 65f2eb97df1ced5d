//! Runtime checks for update rules
//!
//! [`IterationTestHarness`] wraps an update rule and verifies on every call
//! that it behaves:
//!
//! - its output has the partition's state width and only finite values
//! - its own history has the configured shape
//! - past rows of its history are exactly the states it produced earlier
//!
//! [`run_with_harnesses`] wraps every update rule of a simulation, runs it to
//! termination twice (reconfiguring in between) and compares the outputs of
//! the two runs to catch state that survives `configure`.

use super::engine::PartitionCoordinator;
use crate::config::settings::{Implementations, Settings};
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::iterations::FromHistoryIteration;
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::models::storage::StateTimeStorage;
use crate::strategy::{EveryStepOutputCondition, Iteration, StateTimeStorageOutputFunction};
use std::sync::Arc;
use tracing::debug;

/// Wraps an update rule and checks its behaviour while running
pub struct IterationTestHarness {
    iteration: Box<dyn Iteration>,
    name: String,
    /// Expected history, rebuilt from the wrapped rule's own outputs
    history: Option<StateHistory>,
}

impl IterationTestHarness {
    pub fn new(iteration: Box<dyn Iteration>) -> Self {
        Self {
            iteration,
            name: String::new(),
            history: None,
        }
    }

    /// Unwrap the harnessed update rule
    pub fn into_inner(self) -> Box<dyn Iteration> {
        self.iteration
    }

    fn check(
        &self,
        output: &[f64],
        own: &StateHistory,
        time: f64,
    ) -> SimulationResult<()> {
        let expected = self.history.as_ref().ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "harness for partition: {} iterated before configure",
                self.name
            ))
        })?;

        if output.iter().any(|v| !v.is_finite()) {
            return Err(SimulationError::NonFiniteState {
                partition: self.name.clone(),
                time,
                values: output.to_vec(),
            });
        }
        if output.len() != own.width() {
            return Err(SimulationError::WrongStateWidth {
                partition: self.name.clone(),
                time,
                got: output.len(),
                expected: own.width(),
            });
        }
        if own.width() != expected.width() || own.depth() != expected.depth() {
            return Err(SimulationError::HistoryShape {
                partition: self.name.clone(),
                time,
                detail: format!(
                    "{}x{} should be: {}x{}",
                    own.depth(),
                    own.width(),
                    expected.depth(),
                    expected.width()
                ),
            });
        }
        // row 0 may legitimately differ from the configured initial state
        // when an enclosing simulation overrides it
        for depth in (1..own.depth()).rev() {
            if own.row(depth) != expected.row(depth) {
                return Err(SimulationError::HistoryNotRetained {
                    partition: self.name.clone(),
                    time,
                    depth,
                    found: own.copy_row(depth),
                    expected: expected.copy_row(depth),
                });
            }
        }
        Ok(())
    }
}

impl Iteration for IterationTestHarness {
    fn configure(&mut self, partition_index: usize, settings: &Settings) -> SimulationResult<()> {
        let it = settings.iteration(partition_index)?;
        self.name = it.name.clone();
        self.history = Some(StateHistory::new(
            it.state_width,
            it.state_history_depth,
            &it.init_state_values,
        )?);
        self.iteration.configure(partition_index, settings)
    }

    fn iterate(
        &mut self,
        params: &Params,
        partition_index: usize,
        state_histories: &[StateHistory],
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        let output = self.iteration.iterate(
            params,
            partition_index,
            state_histories,
            timesteps_history,
        )?;
        self.check(
            &output,
            &state_histories[partition_index],
            timesteps_history.next_time(),
        )?;
        if let Some(history) = self.history.as_mut() {
            history.shift_and_insert(&output)?;
        }
        Ok(output)
    }

    fn from_history_mut(&mut self) -> Option<&mut FromHistoryIteration> {
        self.iteration.from_history_mut()
    }
}

/// Run a simulation with every update rule harnessed, twice
///
/// Every committed state of both runs is recorded; the runs must agree
/// exactly, otherwise some update rule keeps state that its `configure`
/// hook does not reset. Any harness violation or step failure is returned.
pub fn run_with_harnesses(
    settings: &Settings,
    implementations: Implementations,
) -> SimulationResult<()> {
    let Implementations {
        iterations,
        termination_condition,
        timestep_function,
        ..
    } = implementations;
    let harnessed: Vec<Box<dyn Iteration>> = iterations
        .into_iter()
        .map(|iteration| Box::new(IterationTestHarness::new(iteration)) as Box<dyn Iteration>)
        .collect();
    let mut implementations =
        Implementations::new(harnessed, termination_condition, timestep_function);

    let mut stores = Vec::with_capacity(2);
    for run in 0..2 {
        let store = Arc::new(StateTimeStorage::new());
        implementations = implementations.with_output(
            Arc::new(EveryStepOutputCondition),
            Arc::new(StateTimeStorageOutputFunction::new(Arc::clone(&store))),
        );
        implementations.configure(settings)?;

        let mut coordinator = PartitionCoordinator::new(settings, implementations)?;
        coordinator.run()?;
        debug!(run, steps = coordinator.timesteps_history().current_step_number(), "Harnessed run finished");
        implementations = coordinator.into_implementations();
        stores.push(store);
    }

    let (first, second) = (&stores[0], &stores[1]);
    for name in first.names() {
        if first.values(&name) != second.values(&name) {
            return Err(SimulationError::StatefulnessResidue { partition: name });
        }
    }
    Ok(())
}
