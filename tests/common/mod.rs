//! Shared builders for the integration tests.

use cer_sim::devices::cer::CircuitLabel;
use cer_sim::input::ModelInputs;
use cer_sim::sim::feeder::LinearFeeder;

/// Flat demand at `kw` for every label over the horizon, clear sky at 25 C.
pub fn flat_inputs(steps: usize, labels: &[CircuitLabel], kw: f64) -> ModelInputs {
    let mut inputs = ModelInputs::new();
    for &label in labels {
        inputs.demand_kw.insert(label, vec![kw; steps]);
    }
    inputs.irradiance = vec![1.0; steps];
    inputs.temperature_c = vec![25.0; steps];
    inputs
}

/// A stiff single-bus feeder: terminal voltages pinned at 1.0 pu.
pub fn stiff_feeder(labels: &[CircuitLabel]) -> LinearFeeder {
    LinearFeeder::stiff(labels).expect("stiff feeder builds")
}
