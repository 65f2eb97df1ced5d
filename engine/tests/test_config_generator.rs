//! Tests for building settings and implementations from named partitions

use lockstep_engine::config::derive_seed;
use lockstep_engine::iterations::{ConstantValuesIteration, ParamValuesIteration};
use lockstep_engine::strategy::{ConstantTimestepFunction, NumberOfStepsTerminationCondition};
use lockstep_engine::{
    ConfigGenerator, PartitionConfig, PartitionCoordinator, Settings, SimulationConfig,
    SimulationError,
};

fn simulation() -> SimulationConfig {
    SimulationConfig::new(
        Box::new(NumberOfStepsTerminationCondition {
            max_number_of_steps: 2,
        }),
        Box::new(ConstantTimestepFunction { stepsize: 1.0 }),
    )
}

fn constant(name: &str, values: Vec<f64>) -> PartitionConfig {
    PartitionConfig::new(name, Box::new(ConstantValuesIteration), values)
}

#[test]
fn test_duplicate_partition_rejected() {
    let mut generator = ConfigGenerator::new();
    generator.set_partition(constant("a", vec![1.0])).unwrap();
    assert_eq!(
        generator.set_partition(constant("a", vec![2.0])),
        Err(SimulationError::DuplicatePartition("a".to_string()))
    );
    assert_eq!(generator.partition_names(), &["a".to_string()]);
}

#[test]
fn test_unknown_upstream_rejected() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator
        .set_partition(
            PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "ghost", None),
        )
        .unwrap();

    let err = generator.generate_configs().unwrap_err();
    assert_eq!(
        err,
        SimulationError::UnknownPartition {
            referenced_by: "copy".to_string(),
            name: "ghost".to_string(),
        }
    );
    assert!(err.is_configuration_error());
}

#[test]
fn test_unknown_params_as_partitions_rejected() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator
        .set_partition(
            constant("a", vec![1.0]).with_params_as_partitions("targets", vec!["nope".to_string()]),
        )
        .unwrap();

    assert!(matches!(
        generator.generate_configs(),
        Err(SimulationError::UnknownPartition { ref name, .. }) if name == "nope"
    ));
}

#[test]
fn test_upstream_index_out_of_range_rejected() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator.set_partition(constant("source", vec![1.0, 2.0])).unwrap();
    generator
        .set_partition(
            PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "source", Some(vec![2])),
        )
        .unwrap();

    assert_eq!(
        generator.generate_configs().unwrap_err(),
        SimulationError::UpstreamIndexOutOfRange {
            partition: "copy".to_string(),
            param: "param_values".to_string(),
            upstream: "source".to_string(),
            index: 2,
            width: 2,
        }
    );
}

#[test]
fn test_params_as_partitions_resolve_to_indices() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator.set_partition(constant("x", vec![0.0])).unwrap();
    generator.set_partition(constant("y", vec![0.0])).unwrap();
    generator
        .set_partition(
            constant("z", vec![0.0])
                .with_params_as_partitions("watched", vec!["y".to_string(), "x".to_string()]),
        )
        .unwrap();

    let (settings, _) = generator.generate_configs().unwrap();
    let params = &settings.iterations[2].params;
    assert_eq!(params.get("watched").unwrap(), &[1.0, 0.0]);
    assert_eq!(params.partition_name(), "z");
}

#[test]
fn test_upstream_resolves_to_index_after_group_reordering() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator
        .set_partition(constant("a", vec![1.0]).in_parallel_group("g"))
        .unwrap();
    generator.set_partition(constant("b", vec![2.0])).unwrap();
    generator
        .set_partition(
            PartitionConfig::new("c", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "b", None)
                .in_parallel_group("g"),
        )
        .unwrap();

    let (settings, implementations) = generator.generate_configs().unwrap();
    let names: Vec<&str> = settings.iterations.iter().map(|it| it.name.as_str()).collect();
    assert_eq!(names, vec!["a", "c", "b"]);
    assert_eq!(settings.iterations[1].params_from_upstream["param_values"].upstream, 2);

    let mut coordinator = PartitionCoordinator::new(&settings, implementations).unwrap();
    coordinator.run().unwrap();
    assert_eq!(coordinator.state_history("c").unwrap().latest(), &[2.0]);
}

#[test]
fn test_settings_json_round_trip() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation().with_init_time_value(3.0));
    generator.set_partition(constant("source", vec![1.0, 2.0])).unwrap();
    generator
        .set_partition(
            PartitionConfig::new("copy", Box::new(ParamValuesIteration), vec![0.0])
                .with_upstream("param_values", "source", Some(vec![1]))
                .with_param("scale", vec![0.5, 0.25])
                .with_history_depth(3)
                .with_seed(99),
        )
        .unwrap();

    let (settings, _) = generator.generate_configs().unwrap();
    let json = settings.to_json_string().unwrap();
    let reloaded = Settings::from_json_str(&json).unwrap();

    assert_eq!(reloaded, settings);
    assert_eq!(reloaded.iterations[1].params.partition_name(), "copy");
    assert_eq!(reloaded.timesteps_history_depth, 3);
}

#[test]
fn test_malformed_settings_json_rejected() {
    assert!(matches!(
        Settings::from_json_str("{\"iterations\": 3}"),
        Err(SimulationError::InvalidConfig(_))
    ));
}

#[test]
fn test_missing_simulation_config() {
    let mut generator = ConfigGenerator::new();
    generator.set_partition(constant("a", vec![1.0])).unwrap();
    assert_eq!(
        generator.generate_configs().unwrap_err(),
        SimulationError::MissingSimulationConfig
    );
}

#[test]
fn test_global_seed_applies_derived_seeds() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator.set_global_seed(2024);
    generator.set_partition(constant("a", vec![1.0]).with_seed(5)).unwrap();
    generator.set_partition(constant("b", vec![1.0])).unwrap();

    let (settings, _) = generator.generate_configs().unwrap();
    assert_eq!(settings.iterations[0].seed, derive_seed(2024, "a"));
    assert_eq!(settings.iterations[1].seed, derive_seed(2024, "b"));
    assert_ne!(settings.iterations[0].seed, settings.iterations[1].seed);
}

#[test]
fn test_generated_settings_validate() {
    let mut generator = ConfigGenerator::new();
    generator.set_simulation(simulation());
    generator
        .set_partition(PartitionConfig::new("empty", Box::new(ConstantValuesIteration), vec![]))
        .unwrap();

    assert!(matches!(
        generator.generate_configs(),
        Err(SimulationError::InvalidConfig(_))
    ));
}

#[test]
fn test_loaded_settings_with_duplicate_names_rejected() {
    let settings = Settings::from_json_str(
        r#"{
            "iterations": [
                {"name": "a", "init_state_values": [1.0], "state_width": 1, "state_history_depth": 1},
                {"name": "a", "init_state_values": [2.0], "state_width": 1, "state_history_depth": 1}
            ],
            "timesteps_history_depth": 1
        }"#,
    )
    .unwrap();

    assert_eq!(
        settings.validate(),
        Err(SimulationError::DuplicatePartition("a".to_string()))
    );
    let implementations = lockstep_engine::Implementations::new(
        vec![Box::new(ConstantValuesIteration), Box::new(ConstantValuesIteration)],
        Box::new(NumberOfStepsTerminationCondition {
            max_number_of_steps: 1,
        }),
        Box::new(ConstantTimestepFunction { stepsize: 1.0 }),
    );
    assert!(matches!(
        PartitionCoordinator::new(&settings, implementations),
        Err(SimulationError::DuplicatePartition(_))
    ));
}
