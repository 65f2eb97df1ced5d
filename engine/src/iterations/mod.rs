//! Stock update rules
//!
//! Small, general-purpose [`Iteration`](crate::strategy::Iteration)
//! implementations that simulations are composed from:
//!
//! - [`ConstantValuesIteration`]: holds the initial state forever
//! - [`ParamValuesIteration`]: copies the `param_values` param into the state
//! - [`FromHistoryIteration`]: replays a stored [`StateHistory`](crate::StateHistory)
//! - [`WienerProcessIteration`]: seeded Brownian motion
//! - [`EmbeddedSimulationRunIteration`]: runs a whole inner simulation per step

pub mod constant;
pub mod embedded;
pub mod from_history;
pub mod param_values;
pub mod wiener;

pub use constant::ConstantValuesIteration;
pub use embedded::EmbeddedSimulationRunIteration;
pub use from_history::FromHistoryIteration;
pub use param_values::ParamValuesIteration;
pub use wiener::WienerProcessIteration;
