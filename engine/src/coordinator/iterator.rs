//! Per-partition driver
//!
//! A [`StateIterator`] binds one partition's update rule to its params, its
//! resolved upstream references and the shared output strategies. It is
//! driven by the coordinator through two phases per step:
//!
//! 1. [`receive_and_iterate_pending`](StateIterator::receive_and_iterate_pending)
//!    waits for the same-step pending states of its upstreams, computes the
//!    next state from a read-only snapshot, keeps it pending and sends it to
//!    its downstream readers.
//! 2. [`update_history`](StateIterator::update_history) commits the pending
//!    state into the partition's own history and emits it if required.

use crate::config::settings::UpstreamConfig;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::strategy::{Iteration, OutputCondition, OutputFunction};
use crossbeam_channel::{Receiver, Sender};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Partition name paired with its run-time index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPartitionIndex {
    pub name: String,
    pub index: usize,
}

/// Read-only view handed to every worker at the start of Phase 1
#[derive(Debug, Clone, Copy)]
pub struct IteratorInputMessage<'a> {
    pub state_histories: &'a [StateHistory],
    pub timesteps_history: &'a CumulativeTimestepsHistory,
}

/// Handed to every worker at the start of Phase 2
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommitMessage {
    /// Cumulative time of the states being committed
    pub cumulative_time: f64,
    pub step_number: usize,
}

/// Channels carrying pending states between partitions within one step
///
/// Built fresh for every step. Dropping the senders without sending (a failed
/// or panicked upstream) wakes every reader with a disconnect.
#[derive(Debug, Default)]
pub struct StateValueChannels {
    /// Param name -> receiver of the upstream's pending state
    pub upstreams: BTreeMap<String, Receiver<Vec<f64>>>,
    /// One sender per downstream reader of this partition's state
    pub downstreams: Vec<Sender<Vec<f64>>>,
}

/// Drives one partition's update rule
pub struct StateIterator {
    iteration: Box<dyn Iteration>,
    params: Params,
    partition: NamedPartitionIndex,
    upstreams: BTreeMap<String, UpstreamConfig>,
    output_condition: Arc<dyn OutputCondition>,
    output_function: Arc<dyn OutputFunction>,
    pending: Option<Vec<f64>>,
}

impl StateIterator {
    /// Create the iterator and emit the initial state if the output
    /// condition holds at step 0
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        iteration: Box<dyn Iteration>,
        params: Params,
        partition: NamedPartitionIndex,
        upstreams: BTreeMap<String, UpstreamConfig>,
        output_condition: Arc<dyn OutputCondition>,
        output_function: Arc<dyn OutputFunction>,
        init_state: &[f64],
        init_time: f64,
    ) -> SimulationResult<Self> {
        let iterator = Self {
            iteration,
            params,
            partition,
            upstreams,
            output_condition,
            output_function,
            pending: None,
        };
        iterator.emit(init_state, init_time, 0)?;
        Ok(iterator)
    }

    pub fn name(&self) -> &str {
        &self.partition.name
    }

    pub fn index(&self) -> usize {
        self.partition.index
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Param name -> upstream partition refreshed into it every step
    pub fn upstreams(&self) -> &BTreeMap<String, UpstreamConfig> {
        &self.upstreams
    }

    pub fn pending(&self) -> Option<&[f64]> {
        self.pending.as_deref()
    }

    /// Drop a pending result from a step that is being abandoned
    pub fn discard_pending(&mut self) {
        self.pending = None;
    }

    /// Give the update rule back
    pub fn into_iteration(self) -> Box<dyn Iteration> {
        self.iteration
    }

    /// Phase 1: refresh upstream params and compute the pending state
    ///
    /// Upstream params are the upstreams' pending states for this step; the
    /// histories in `message` are the snapshot from before the step. Nothing
    /// is written to any history here.
    pub fn receive_and_iterate_pending(
        &mut self,
        message: &IteratorInputMessage<'_>,
        channels: StateValueChannels,
    ) -> SimulationResult<()> {
        let StateValueChannels {
            upstreams,
            downstreams,
        } = channels;
        for (param, receiver) in upstreams {
            let upstream_state =
                receiver
                    .recv()
                    .map_err(|_| SimulationError::UpstreamUnavailable {
                        partition: self.partition.name.clone(),
                        param: param.clone(),
                    })?;
            let values = match self.upstreams.get(&param).and_then(|u| u.indices.as_ref()) {
                Some(indices) => indices.iter().map(|&i| upstream_state[i]).collect(),
                None => upstream_state,
            };
            self.params.set(param, values);
        }

        let time = message.timesteps_history.next_time();
        let state = self
            .iteration
            .iterate(
                &self.params,
                self.partition.index,
                message.state_histories,
                message.timesteps_history,
            )
            .map_err(|source| SimulationError::IterationFailed {
                partition: self.partition.name.clone(),
                time,
                source: Box::new(source),
            })?;

        let expected = message.state_histories[self.partition.index].width();
        if state.len() != expected {
            return Err(SimulationError::WrongStateWidth {
                partition: self.partition.name.clone(),
                time,
                got: state.len(),
                expected,
            });
        }
        for sender in &downstreams {
            // a reader that already failed has dropped its receiver
            let _ = sender.send(state.clone());
        }
        self.pending = Some(state);
        Ok(())
    }

    /// Phase 2: shift the pending state into `history` and emit it
    pub fn update_history(
        &mut self,
        history: &mut StateHistory,
        commit: &CommitMessage,
    ) -> SimulationResult<()> {
        let state = self
            .pending
            .take()
            .ok_or_else(|| SimulationError::NoPendingState {
                partition: self.partition.name.clone(),
            })?;
        history.shift_and_insert(&state)?;
        self.emit(&state, commit.cumulative_time, commit.step_number)
    }

    fn emit(&self, state: &[f64], time: f64, step_number: usize) -> SimulationResult<()> {
        if !self
            .output_condition
            .is_output_step(&self.partition.name, state, time, step_number)
        {
            return Ok(());
        }
        self.output_function
            .output(&self.partition.name, state, time)
            .map_err(|e| SimulationError::OutputFailed {
                partition: self.partition.name.clone(),
                time,
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for StateIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateIterator")
            .field("partition", &self.partition)
            .field("params", &self.params)
            .field("upstreams", &self.upstreams)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}
