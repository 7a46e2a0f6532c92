//! Scenario driver: owns the fleet, the oracle, the engine and the result
//! registers, and walks the timestep loop.

use std::time::Instant;

use tracing::info;

use crate::devices::cer::{Cer, CerFleet};
use crate::error::SimError;
use crate::input::ModelInputs;
use crate::sim::circuit::PowerFlowSolver;
use crate::sim::engine::{ConvergenceEngine, EngineSettings};
use crate::sim::metrics::{MetricsReport, SummaryReport};
use crate::sim::results::Results;
use crate::sim::types::SimConfig;

/// A fully assembled simulation scenario.
///
/// Construction validates the exogenous series against the horizon and the
/// fleet's labels against the oracle's injection points, so the timestep
/// loop itself only fails on oracle errors.
pub struct Scenario<S: PowerFlowSolver> {
    config: SimConfig,
    fleet: CerFleet,
    inputs: ModelInputs,
    circuit: S,
    engine: ConvergenceEngine,
    results: Results,
    next_step: usize,
}

impl<S: PowerFlowSolver> Scenario<S> {
    /// Assembles a scenario.
    ///
    /// # Errors
    ///
    /// Returns an input-mismatch error when a series is shorter than the
    /// horizon, a load label has no demand schedule, or a CER label has no
    /// injection point on the circuit.
    pub fn new(
        config: SimConfig,
        fleet: CerFleet,
        inputs: ModelInputs,
        circuit: S,
        settings: EngineSettings,
    ) -> Result<Self, SimError> {
        let load_labels: Vec<_> = fleet
            .cers
            .iter()
            .zip(&fleet.labels)
            .filter(|(cer, _)| matches!(cer, Cer::Load(_)))
            .map(|(_, &label)| label)
            .collect();
        inputs.validate(config.steps, &load_labels)?;
        for &label in &fleet.labels {
            if !circuit.has_label(label) {
                return Err(SimError::InputMismatch(format!(
                    "circuit label {label} has no injection point"
                )));
            }
        }
        let engine = ConvergenceEngine::new(settings, fleet.len());
        let results = Results::new(&config, &fleet, &circuit);
        Ok(Self {
            config,
            fleet,
            inputs,
            circuit,
            engine,
            results,
            next_step: 0,
        })
    }

    /// Solves the next pending timestep and records its registers.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn step_once(&mut self) -> Result<(), SimError> {
        let t = self.next_step;
        let start = Instant::now();
        let outcome =
            self.engine
                .solve_timestep(t, &mut self.fleet, &self.inputs, &mut self.circuit)?;
        self.results.record_timestep(
            &self.fleet,
            &self.circuit,
            outcome,
            start.elapsed().as_secs_f64(),
        );
        self.next_step += 1;
        Ok(())
    }

    /// Runs every remaining timestep.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures; the registers keep everything recorded up
    /// to the failing timestep.
    pub fn run(&mut self) -> Result<(), SimError> {
        while self.next_step < self.config.steps {
            self.step_once()?;
        }
        info!(
            steps = self.config.steps,
            warnings = self.results.events.len(),
            "scenario complete"
        );
        Ok(())
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn fleet(&self) -> &CerFleet {
        &self.fleet
    }

    pub fn circuit(&self) -> &S {
        &self.circuit
    }

    pub fn results(&self) -> &Results {
        &self.results
    }

    /// Consumes the scenario, handing out the recorded registers.
    pub fn into_results(self) -> Results {
        self.results
    }

    /// Scenario-level energy summary of the recorded steps.
    pub fn summary(&self) -> SummaryReport {
        SummaryReport::from_results(&self.results)
    }

    /// Benchmark metric set of the recorded steps.
    pub fn metrics(&self) -> MetricsReport {
        MetricsReport::from_results(&self.results)
    }
}
