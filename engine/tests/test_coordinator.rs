//! Tests for lockstep execution
//!
//! Covers the snapshot isolation between partitions, determinism across
//! parallel groupings and same-step delivery of upstream references.

use lockstep_engine::config::{ConfigGenerator, PartitionConfig, SimulationConfig};
use lockstep_engine::iterations::{ConstantValuesIteration, ParamValuesIteration, WienerProcessIteration};
use lockstep_engine::strategy::{
    ConstantTimestepFunction, EveryStepOutputCondition, Iteration,
    NumberOfStepsTerminationCondition, StateTimeStorageOutputFunction,
    TimeElapsedTerminationCondition,
};
use lockstep_engine::{
    CumulativeTimestepsHistory, Params, PartitionCoordinator, Settings, SimulationError,
    SimulationResult, StateHistory, StateTimeStorage,
};
use std::sync::Arc;

/// Adds one to its previous state
struct CounterIteration;

impl Iteration for CounterIteration {
    fn configure(&mut self, _: usize, _: &Settings) -> SimulationResult<()> {
        Ok(())
    }

    fn iterate(
        &mut self,
        _: &Params,
        partition_index: usize,
        state_histories: &[StateHistory],
        _: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        Ok(state_histories[partition_index]
            .latest()
            .iter()
            .map(|v| v + 1.0)
            .collect())
    }
}

fn steps(n: usize) -> SimulationConfig {
    SimulationConfig::new(
        Box::new(NumberOfStepsTerminationCondition {
            max_number_of_steps: n,
        }),
        Box::new(ConstantTimestepFunction { stepsize: 1.0 }),
    )
}

#[test]
fn test_downstream_sees_upstream_state_of_same_step() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(5));
    generator
        .set_partition(PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]))
        .unwrap();
    generator
        .set_partition(
            PartitionConfig::new("b", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "a", None),
        )
        .unwrap();

    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();

    assert_eq!(coordinator.state_history("a").unwrap().latest(), &[5.0]);
    assert_eq!(coordinator.state_history("b").unwrap().latest(), &[5.0]);
}

#[test]
fn test_reader_declared_before_its_upstream() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(5));
    generator
        .set_partition(
            PartitionConfig::new("b", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "a", None),
        )
        .unwrap();
    generator
        .set_partition(PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]))
        .unwrap();

    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();

    assert_eq!(coordinator.state_history("b").unwrap().latest(), &[5.0]);
}

#[test]
fn test_same_step_delivery_within_a_serial_list() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(5));
    generator
        .set_partition(
            PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]).in_parallel_group("g"),
        )
        .unwrap();
    generator
        .set_partition(
            PartitionConfig::new("b", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "a", None)
                .in_parallel_group("g"),
        )
        .unwrap();

    let (settings, implementations) = generator.generate_configs().unwrap();
    assert_eq!(settings.parallel_groups, vec![vec![0, 1]]);
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();

    assert_eq!(coordinator.state_history("b").unwrap().latest(), &[5.0]);
}

#[test]
fn test_reader_ahead_of_upstream_in_serial_list_rejected() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(5));
    generator
        .set_partition(
            PartitionConfig::new("b", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "a", None)
                .in_parallel_group("g"),
        )
        .unwrap();
    generator
        .set_partition(
            PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]).in_parallel_group("g"),
        )
        .unwrap();

    let err = generator.generate_configs().unwrap_err();
    assert_eq!(
        err,
        SimulationError::UpstreamOrderCycle {
            partition: "b".to_string()
        }
    );
    assert!(err.is_configuration_error());
}

#[test]
fn test_mutual_upstreams_rejected() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(1));
    generator
        .set_partition(
            PartitionConfig::new("x", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "y", None),
        )
        .unwrap();
    generator
        .set_partition(
            PartitionConfig::new("y", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "x", None),
        )
        .unwrap();

    assert!(matches!(
        generator.generate_configs(),
        Err(SimulationError::UpstreamOrderCycle { .. })
    ));
}

#[test]
fn test_upstream_index_selection() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(1));
    generator
        .set_partition(PartitionConfig::new(
            "source",
            Box::new(ConstantValuesIteration),
            vec![1.0, 2.0, 3.0],
        ))
        .unwrap();
    generator
        .set_partition(
            PartitionConfig::new("picked", Box::new(ParamValuesIteration), vec![0.0, 0.0])
                .with_upstream("param_values", "source", Some(vec![2, 0])),
        )
        .unwrap();

    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();
    assert_eq!(coordinator.state_history("picked").unwrap().latest(), &[3.0, 1.0]);
}

fn wiener_network(grouped: bool) -> (Vec<String>, Vec<StateHistory>, Vec<f64>) {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(20));
    let partitions = vec![
        PartitionConfig::new("w1", Box::new(WienerProcessIteration::new()), vec![0.0])
            .with_param("variances", vec![1.0])
            .with_seed(11)
            .with_history_depth(3),
        PartitionConfig::new("w2", Box::new(WienerProcessIteration::new()), vec![0.0, 1.0])
            .with_param("variances", vec![2.0, 0.5])
            .with_seed(12)
            .with_history_depth(2),
        PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0])
            .with_upstream("param_values", "w2", Some(vec![1])),
        PartitionConfig::new("held", Box::new(ConstantValuesIteration), vec![7.0]),
    ];
    for partition in partitions {
        let partition = if grouped {
            partition.in_parallel_group("all")
        } else {
            partition
        };
        generator.set_partition(partition).unwrap();
    }

    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();
    (
        coordinator.partition_names().to_vec(),
        coordinator.state_histories().to_vec(),
        coordinator.timesteps_history().values().to_vec(),
    )
}

#[test]
fn test_identical_runs_are_identical() {
    assert_eq!(wiener_network(false), wiener_network(false));
}

#[test]
fn test_grouping_does_not_change_results() {
    assert_eq!(wiener_network(false), wiener_network(true));
}

#[test]
fn test_copy_tracks_current_upstream_value() {
    let (names, histories, _) = wiener_network(false);
    let w2 = names.iter().position(|n| n == "w2").unwrap();
    let copy = names.iter().position(|n| n == "copy").unwrap();
    assert_eq!(histories[copy].at(0, 0), histories[w2].at(0, 1));
    assert_eq!(histories[3].latest(), &[7.0]);
}

#[test]
fn test_step_by_step_matches_run() {
    let build = || {
        let mut generator = ConfigGenerator::new();
        generator.set_simulation(steps(4));
        generator
            .set_partition(PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]))
            .unwrap();
        generator.generate_configs().unwrap()
    };

    let (settings, implementations) = build();
    let mut stepped = PartitionCoordinator::new(&settings, implementations).unwrap();
    let mut results = Vec::new();
    while !stepped.ready_to_terminate() {
        results.push(stepped.step().unwrap());
    }
    assert_eq!(results.len(), 4);
    assert_eq!(results[3].step_number, 4);
    assert_eq!(results[3].time, 4.0);

    let (settings, implementations) = build();
    let mut ran = PartitionCoordinator::new(&settings, implementations).unwrap();
    ran.run().unwrap();
    assert_eq!(stepped.state_histories(), ran.state_histories());
}

#[test]
fn test_time_elapsed_termination_stops_run() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(SimulationConfig::new(
        Box::new(TimeElapsedTerminationCondition {
            max_time_elapsed: 2.0,
        }),
        Box::new(ConstantTimestepFunction { stepsize: 0.75 }),
    ));
    generator
        .set_partition(PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]))
        .unwrap();
    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();

    assert_eq!(coordinator.timesteps_history().current_step_number(), 3);
    assert_eq!(coordinator.timesteps_history().current_time(), 2.25);
}

#[test]
fn test_outputs_recorded_for_every_partition() {
    let store = Arc::new(StateTimeStorage::new());
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(3).with_init_time_value(10.0).with_output(
        Arc::new(EveryStepOutputCondition),
        Arc::new(StateTimeStorageOutputFunction::new(Arc::clone(&store))),
    ));
    generator
        .set_partition(PartitionConfig::new("a", Box::new(CounterIteration), vec![0.0]))
        .unwrap();
    generator
        .set_partition(PartitionConfig::new("b", Box::new(ConstantValuesIteration), vec![5.0]))
        .unwrap();
    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();

    assert_eq!(store.times(), vec![10.0, 11.0, 12.0, 13.0]);
    assert_eq!(
        store.values("a").unwrap(),
        vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]]
    );
    assert_eq!(store.values("b").unwrap().len(), 4);
}

#[test]
fn test_failed_update_rule_aborts_run() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(3));
    generator
        .set_partition(PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0]))
        .unwrap();
    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();

    let err = coordinator.run().unwrap_err();
    assert!(matches!(err, SimulationError::IterationFailed { ref partition, .. } if partition == "copy"));
    assert!(matches!(err.root_cause(), SimulationError::MissingParam { .. }));
    assert_eq!(coordinator.timesteps_history().current_step_number(), 0);
    assert_eq!(coordinator.state_history("copy").unwrap().latest(), &[0.0]);
}

#[test]
fn test_wrong_width_output_rejected_before_commit() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(steps(1));
    generator
        .set_partition(
            PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0])
                .with_param("param_values", vec![1.0, 2.0]),
        )
        .unwrap();
    let (settings, implementations) = generator.generate_configs().unwrap();
    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();

    assert!(matches!(
        coordinator.step(),
        Err(SimulationError::WrongStateWidth { got: 2, expected: 1, .. })
    ));
    assert_eq!(coordinator.state_history("copy").unwrap().latest(), &[0.0]);
}
