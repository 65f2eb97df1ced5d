use crate::config::settings::Settings;
use crate::core::time::CumulativeTimestepsHistory;
use crate::error::{SimulationError, SimulationResult};
use crate::models::history::StateHistory;
use crate::models::params::Params;
use crate::rng::RngManager;
use crate::strategy::Iteration;

/// Per-element variance rates read by [`WienerProcessIteration`]
pub const VARIANCES: &str = "variances";

/// Independent Wiener processes, one per state element
///
/// Each step adds `sqrt(variances[i] * dt) * z` to element `i`, where `dt` is
/// the step's time increment and `z` a standard normal draw. The RNG is
/// re-seeded from the partition's seed on every `configure`, so a
/// reconfigured run reproduces the same path.
#[derive(Debug, Clone, Default)]
pub struct WienerProcessIteration {
    rng: Option<RngManager>,
}

impl WienerProcessIteration {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Iteration for WienerProcessIteration {
    fn configure(&mut self, partition_index: usize, settings: &Settings) -> SimulationResult<()> {
        let seed = settings.iteration(partition_index)?.seed;
        self.rng = Some(RngManager::new(seed));
        Ok(())
    }

    fn iterate(
        &mut self,
        params: &Params,
        partition_index: usize,
        state_histories: &[StateHistory],
        timesteps_history: &CumulativeTimestepsHistory,
    ) -> SimulationResult<Vec<f64>> {
        let rng = self.rng.as_mut().ok_or_else(|| {
            SimulationError::InvalidConfig(format!(
                "partition: {} iterated before configure",
                params.partition_name()
            ))
        })?;
        let variances = params.get(VARIANCES)?;
        let previous = state_histories[partition_index].latest();
        if variances.len() != previous.len() {
            return Err(SimulationError::InvalidConfig(format!(
                "partition: {} has {} variances for state width {}",
                params.partition_name(),
                variances.len(),
                previous.len()
            )));
        }
        let dt = timesteps_history.next_increment();
        Ok(previous
            .iter()
            .zip(variances)
            .map(|(value, variance)| value + (variance * dt).sqrt() * rng.next_normal())
            .collect())
    }
}
