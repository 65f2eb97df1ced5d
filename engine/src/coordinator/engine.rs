//! Partition Coordinator
//!
//! Runs every partition of a simulation in lockstep.
//!
//! # Architecture
//!
//! Each call to [`PartitionCoordinator::step`] executes:
//!
//! ```text
//! 1. Advance time: count the step, ask the timestep function for the increment
//! 2. Phase 1 (compute): one worker per parallel group receives a read-only
//!    snapshot and runs its serial list of update rules in order; each
//!    pending state is sent straight to the partitions that reference it
//! 3. Join barrier
//! 4. Phase 2 (commit): one worker per parallel group receives its disjoint
//!    slice of histories and shifts the pending states in, in order
//! 5. Join barrier
//! 6. Shift the new cumulative time into the timesteps history
//! ```
//!
//! # Critical Invariants
//!
//! 1. Every update rule in a step sees the same snapshot: histories are only
//!    written in Phase 2, after all of Phase 1 has been joined
//! 2. Upstream references carry the upstream's state for the current step,
//!    so declared upstream order must be acyclic (checked by `Settings::validate`)
//! 3. A failure in step 1 or Phase 1 leaves every history and the step
//!    counter as they were before the step
//! 4. Phase 2 commits every partition before reporting an output failure
//! 5. Termination is only evaluated between steps
//!
//! # Example
//!
//! ```rust
//! use lockstep_engine::iterations::ParamValuesIteration;
//! use lockstep_engine::strategy::{ConstantTimestepFunction, NumberOfStepsTerminationCondition};
//! use lockstep_engine::{Implementations, PartitionCoordinator, Settings};
//!
//! let settings = Settings::from_json_str(r#"{
//!     "iterations": [{
//!         "name": "level",
//!         "params": {"param_values": [2.5]},
//!         "init_state_values": [0.0],
//!         "state_width": 1,
//!         "state_history_depth": 2
//!     }],
//!     "timesteps_history_depth": 2
//! }"#).unwrap();
//!
//! let implementations = Implementations::new(
//!     vec![Box::new(ParamValuesIteration)],
//!     Box::new(NumberOfStepsTerminationCondition { max_number_of_steps: 3 }),
//!     Box::new(ConstantTimestepFunction { stepsize: 0.5 }),
//! );
//!
//! let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
//! coordinator.run().unwrap();
//!
//! assert_eq!(coordinator.timesteps_history().current_step_number(), 3);
//! assert_eq!(coordinator.timesteps_history().current_time(), 1.5);
//! assert_eq!(coordinator.state_histories()[0].latest(), &[2.5]);
//! ```

use super::iterator::{
    CommitMessage, IteratorInputMessage, NamedPartitionIndex, StateIterator, StateValueChannels,
};
use super::snapshot::{CoordinatorSnapshot, PartitionSnapshot};
use crate::config::settings::{Implementations, Settings};
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::models::history::StateHistory;
use crate::strategy::{OutputCondition, OutputFunction, TerminationCondition, TimestepFunction};
use crossbeam_channel::bounded;
use std::ops::Range;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, info_span};
use uuid::Uuid;

/// Outcome of a single completed step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub step_number: usize,
    /// Cumulative time after the step
    pub time: f64,
}

/// Drives all partitions of one simulation through lockstep steps
pub struct PartitionCoordinator {
    /// Identifies this coordinator in logs
    run_id: Uuid,
    partition_names: Vec<String>,
    iterators: Vec<StateIterator>,
    /// Contiguous index ranges, one per parallel group
    groups: Vec<Range<usize>>,
    state_histories: Vec<StateHistory>,
    timesteps_history: CumulativeTimestepsHistory,
    timestep_function: Box<dyn TimestepFunction>,
    termination_condition: Box<dyn TerminationCondition>,
    output_condition: Arc<dyn OutputCondition>,
    output_function: Arc<dyn OutputFunction>,
}

impl PartitionCoordinator {
    /// Wire histories and iterators from validated settings
    ///
    /// Emits each partition's initial state if the output condition holds at
    /// step 0. Iterations are not configured here; the config generator (or
    /// the caller) runs their `configure` hooks beforehand.
    pub fn new(settings: &Settings, implementations: Implementations) -> SimulationResult<Self> {
        settings.validate()?;
        if implementations.iterations.len() != settings.num_partitions() {
            return Err(SimulationError::InvalidConfig(format!(
                "{} iterations supplied for {} partitions",
                implementations.iterations.len(),
                settings.num_partitions()
            )));
        }

        let Implementations {
            iterations,
            output_condition,
            output_function,
            termination_condition,
            timestep_function,
        } = implementations;

        let groups = settings.group_ranges()?;
        let state_histories = settings
            .iterations
            .iter()
            .map(|it| StateHistory::new(it.state_width, it.state_history_depth, &it.init_state_values))
            .collect::<SimulationResult<Vec<_>>>()?;
        let timesteps_history = CumulativeTimestepsHistory::new(
            settings.timesteps_history_depth,
            settings.init_time_value,
        )?;

        let iterators = iterations
            .into_iter()
            .zip(&settings.iterations)
            .enumerate()
            .map(|(index, (iteration, it))| {
                let mut params = it.params.clone();
                params.set_partition_name(it.name.clone());
                StateIterator::new(
                    iteration,
                    params,
                    NamedPartitionIndex {
                        name: it.name.clone(),
                        index,
                    },
                    it.params_from_upstream.clone(),
                    Arc::clone(&output_condition),
                    Arc::clone(&output_function),
                    &it.init_state_values,
                    settings.init_time_value,
                )
            })
            .collect::<SimulationResult<Vec<_>>>()?;

        let run_id = Uuid::new_v4();
        debug!(
            %run_id,
            partitions = iterators.len(),
            groups = groups.len(),
            init_time = settings.init_time_value,
            "Partition coordinator created"
        );

        Ok(Self {
            run_id,
            partition_names: settings.iterations.iter().map(|it| it.name.clone()).collect(),
            iterators,
            groups,
            state_histories,
            timesteps_history,
            timestep_function,
            termination_condition,
            output_condition,
            output_function,
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state_histories(&self) -> &[StateHistory] {
        &self.state_histories
    }

    /// History of a partition by name
    pub fn state_history(&self, name: &str) -> Option<&StateHistory> {
        self.partition_index(name).map(|i| &self.state_histories[i])
    }

    pub fn timesteps_history(&self) -> &CumulativeTimestepsHistory {
        &self.timesteps_history
    }

    pub fn partition_names(&self) -> &[String] {
        &self.partition_names
    }

    pub fn partition_index(&self, name: &str) -> Option<usize> {
        self.partition_names.iter().position(|n| n == name)
    }

    /// Current state of every partition
    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            run_id: self.run_id,
            step_number: self.timesteps_history.current_step_number(),
            time: self.timesteps_history.current_time(),
            partitions: self
                .partition_names
                .iter()
                .zip(&self.state_histories)
                .enumerate()
                .map(|(index, (name, history))| PartitionSnapshot {
                    name: name.clone(),
                    index,
                    state: history.copy_row(0),
                })
                .collect(),
        }
    }

    /// Tear down the coordinator and hand back its behaviour for reuse
    pub fn into_implementations(self) -> Implementations {
        Implementations {
            iterations: self
                .iterators
                .into_iter()
                .map(StateIterator::into_iteration)
                .collect(),
            output_condition: self.output_condition,
            output_function: self.output_function,
            termination_condition: self.termination_condition,
            timestep_function: self.timestep_function,
        }
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Whether the termination condition holds for the current histories
    pub fn ready_to_terminate(&self) -> bool {
        self.termination_condition
            .terminate(&self.state_histories, &self.timesteps_history)
    }

    /// Step until the termination condition holds
    pub fn run(&mut self) -> SimulationResult<()> {
        let span = info_span!("simulation_run", run_id = %self.run_id);
        let _enter = span.enter();

        info!(
            partitions = self.iterators.len(),
            start_time = self.timesteps_history.current_time(),
            "Simulation run started"
        );
        while !self.ready_to_terminate() {
            self.step()?;
        }
        info!(
            steps = self.timesteps_history.current_step_number(),
            end_time = self.timesteps_history.current_time(),
            "Simulation run finished"
        );
        Ok(())
    }

    /// Execute one full step (both phases) across all partitions
    pub fn step(&mut self) -> SimulationResult<StepResult> {
        let previous_increment = self.timesteps_history.next_increment();
        self.timesteps_history.begin_step();
        let step_number = self.timesteps_history.current_step_number();

        let increment = match self.timestep_function.next_increment(&self.timesteps_history) {
            Ok(increment) => increment,
            Err(e) => {
                self.timesteps_history.abandon_step(previous_increment);
                error!(run_id = %self.run_id, step_number, error = %e, "Timestep function failed");
                return Err(e);
            }
        };
        self.timesteps_history.set_next_increment(increment);

        if let Err(e) = self.compute_pending() {
            for iterator in &mut self.iterators {
                iterator.discard_pending();
            }
            self.timesteps_history.abandon_step(previous_increment);
            error!(run_id = %self.run_id, step_number, error = %e, "Step failed while computing");
            return Err(e);
        }

        let commit = CommitMessage {
            cumulative_time: self.timesteps_history.next_time(),
            step_number,
        };
        let committed = self.commit_pending(commit);
        self.timesteps_history.shift_and_insert(commit.cumulative_time);
        if let Err(e) = committed {
            error!(run_id = %self.run_id, step_number, error = %e, "Step failed while committing");
            return Err(e);
        }

        debug!(step_number, time = commit.cumulative_time, increment, "Step committed");
        Ok(StepResult {
            step_number,
            time: commit.cumulative_time,
        })
    }

    /// Wire one channel per upstream reference for the coming step
    fn state_value_channels(&self) -> Vec<StateValueChannels> {
        let mut channels: Vec<StateValueChannels> = self
            .iterators
            .iter()
            .map(|_| StateValueChannels::default())
            .collect();
        for (reader, iterator) in self.iterators.iter().enumerate() {
            for (param, upstream) in iterator.upstreams() {
                let (sender, receiver) = bounded(1);
                channels[upstream.upstream].downstreams.push(sender);
                channels[reader].upstreams.insert(param.clone(), receiver);
            }
        }
        channels
    }

    /// Phase 1: every group computes pending states from the same snapshot,
    /// passing pending states to same-step readers as they are computed
    fn compute_pending(&mut self) -> SimulationResult<()> {
        let mut channels = self.state_value_channels().into_iter();
        let message = IteratorInputMessage {
            state_histories: &self.state_histories,
            timesteps_history: &self.timesteps_history,
        };
        let groups = &self.groups;
        let names = &self.partition_names;
        let mut remaining = self.iterators.as_mut_slice();

        thread::scope(|scope| {
            let mut senders = Vec::with_capacity(groups.len());
            let mut workers = Vec::with_capacity(groups.len());
            for range in groups {
                let (group, rest) = std::mem::take(&mut remaining).split_at_mut(range.len());
                remaining = rest;
                let group_channels: Vec<StateValueChannels> =
                    channels.by_ref().take(range.len()).collect();
                let leader = names[range.start].clone();
                let (sender, receiver) = bounded::<IteratorInputMessage<'_>>(1);

                let worker_leader = leader.clone();
                let handle = scope.spawn(move || -> SimulationResult<()> {
                    let message = receiver.recv().map_err(|_| {
                        SimulationError::WorkerDisconnected {
                            partition: worker_leader,
                        }
                    })?;
                    // unsent channels are dropped on early return, releasing readers
                    for (iterator, channels) in group.iter_mut().zip(group_channels) {
                        iterator.receive_and_iterate_pending(&message, channels)?;
                    }
                    Ok(())
                });
                senders.push(sender);
                workers.push((leader, handle));
            }

            for sender in senders {
                // a closed channel means the worker died; its join reports why
                let _ = sender.send(message);
            }
            join_workers(workers)
        })
    }

    /// Phase 2: every group commits its pending states into its own histories
    fn commit_pending(&mut self, commit: CommitMessage) -> SimulationResult<()> {
        let groups = &self.groups;
        let names = &self.partition_names;
        let mut remaining_iterators = self.iterators.as_mut_slice();
        let mut remaining_histories = self.state_histories.as_mut_slice();

        thread::scope(|scope| {
            let mut handoffs = Vec::with_capacity(groups.len());
            let mut workers = Vec::with_capacity(groups.len());
            for range in groups {
                let (group, rest) =
                    std::mem::take(&mut remaining_iterators).split_at_mut(range.len());
                remaining_iterators = rest;
                let (histories, rest) =
                    std::mem::take(&mut remaining_histories).split_at_mut(range.len());
                remaining_histories = rest;
                let leader = names[range.start].clone();
                let (sender, receiver) = bounded::<(&mut [StateHistory], CommitMessage)>(1);

                let worker_leader = leader.clone();
                let handle = scope.spawn(move || -> SimulationResult<()> {
                    let (histories, commit) = receiver.recv().map_err(|_| {
                        SimulationError::WorkerDisconnected {
                            partition: worker_leader,
                        }
                    })?;
                    // commit every partition even if an output fails part way
                    let mut first_error = None;
                    for (iterator, history) in group.iter_mut().zip(histories.iter_mut()) {
                        if let Err(e) = iterator.update_history(history, &commit) {
                            if first_error.is_none() {
                                first_error = Some(e);
                            }
                        }
                    }
                    first_error.map_or(Ok(()), Err)
                });
                handoffs.push((sender, histories));
                workers.push((leader, handle));
            }

            for (sender, histories) in handoffs {
                let _ = sender.send((histories, commit));
            }
            join_workers(workers)
        })
    }
}

/// Join every worker in group order and return the first failure
///
/// A reader left without its upstream state only reports a knock-on effect,
/// so any other failure takes precedence.
fn join_workers(
    workers: Vec<(String, thread::ScopedJoinHandle<'_, SimulationResult<()>>)>,
) -> SimulationResult<()> {
    let outcomes: Vec<SimulationResult<()>> = workers
        .into_iter()
        .map(|(leader, handle)| {
            handle
                .join()
                .unwrap_or_else(|_| Err(SimulationError::WorkerPanicked { partition: leader }))
        })
        .collect();

    let mut knock_on = None;
    for outcome in outcomes {
        match outcome {
            Ok(()) => {}
            Err(e @ SimulationError::UpstreamUnavailable { .. }) => {
                if knock_on.is_none() {
                    knock_on = Some(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
    knock_on.map_or(Ok(()), Err)
}

impl std::fmt::Debug for PartitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCoordinator")
            .field("run_id", &self.run_id)
            .field("partition_names", &self.partition_names)
            .field("groups", &self.groups)
            .field("timesteps_history", &self.timesteps_history)
            .finish_non_exhaustive()
    }
}
