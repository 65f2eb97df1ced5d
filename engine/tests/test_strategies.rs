//! Tests for the stock output, termination and timestep strategies

use lockstep_engine::strategy::{
    ConstantTimestepFunction, EveryNStepsOutputCondition, EveryStepOutputCondition,
    FromHistoryTimestepFunction, NilOutputCondition, NumberOfStepsTerminationCondition,
    OutputCondition, OutputFunction, StateTimeStorageOutputFunction, TerminationCondition,
    TimeElapsedTerminationCondition, TimestepFunction, TracingOutputFunction,
};
use lockstep_engine::{CumulativeTimestepsHistory, SimulationError, StateTimeStorage};
use std::sync::Arc;

fn time_at(step: usize, time: f64) -> CumulativeTimestepsHistory {
    CumulativeTimestepsHistory::from_values(vec![time], 1.0, step).unwrap()
}

#[test]
fn test_output_conditions() {
    assert!(!NilOutputCondition.is_output_step("p", &[1.0], 0.0, 0));
    assert!(EveryStepOutputCondition.is_output_step("p", &[1.0], 3.0, 3));

    let every_two = EveryNStepsOutputCondition { n: 2 };
    assert!(every_two.is_output_step("p", &[], 0.0, 0));
    assert!(!every_two.is_output_step("p", &[], 1.0, 1));
    assert!(every_two.is_output_step("p", &[], 2.0, 2));
}

#[test]
fn test_number_of_steps_termination() {
    let condition = NumberOfStepsTerminationCondition {
        max_number_of_steps: 3,
    };
    assert!(!condition.terminate(&[], &time_at(2, 0.0)));
    assert!(condition.terminate(&[], &time_at(3, 0.0)));
    assert!(condition.terminate(&[], &time_at(4, 0.0)));
}

#[test]
fn test_time_elapsed_termination() {
    let condition = TimeElapsedTerminationCondition {
        max_time_elapsed: 10.0,
    };
    assert!(!condition.terminate(&[], &time_at(1, 9.5)));
    assert!(condition.terminate(&[], &time_at(1, 10.0)));
}

#[test]
fn test_constant_timestep() {
    let mut function = ConstantTimestepFunction { stepsize: 0.25 };
    assert_eq!(function.next_increment(&time_at(1, 0.0)).unwrap(), 0.25);
    assert_eq!(function.next_increment(&time_at(9, 5.0)).unwrap(), 0.25);
}

#[test]
fn test_from_history_timestep_exhaustion_is_error() {
    let data = CumulativeTimestepsHistory::from_values(vec![2.0, 1.0], 0.5, 1).unwrap();
    let mut function = FromHistoryTimestepFunction::new(data);
    assert_eq!(function.next_increment(&time_at(1, 1.0)).unwrap(), 1.0);
    assert_eq!(function.next_increment(&time_at(2, 2.0)).unwrap(), 0.5);
    assert_eq!(
        function.next_increment(&time_at(3, 2.5)).unwrap_err(),
        SimulationError::MemoryExhausted { step: 3, depth: 2 }
    );
}

#[test]
fn test_storage_output_function_is_shared() {
    let store = Arc::new(StateTimeStorage::new());
    let function = StateTimeStorageOutputFunction::new(Arc::clone(&store));

    std::thread::scope(|scope| {
        for name in ["a", "b", "c"] {
            let function = &function;
            scope.spawn(move || {
                for step in 0..10 {
                    function.output(name, &[step as f64], step as f64).unwrap();
                }
            });
        }
    });

    assert_eq!(store.names().len(), 3);
    for name in ["a", "b", "c"] {
        let values = store.values(name).unwrap();
        assert_eq!(values.len(), 10);
        assert_eq!(values[9], vec![9.0]);
    }
}

#[test]
fn test_tracing_output_never_fails() {
    assert!(TracingOutputFunction.output("p", &[1.0, 2.0], 3.0).is_ok());
}
