//! CER convergence engine.
//!
//! Per timestep, the fixed-point iteration drives the tuple (terminal
//! voltage, P, Q) of every CER to a simultaneous solution: tentative device
//! evaluations feed relaxed set-points into the power-flow oracle, the new
//! voltages feed back into the devices, and per-CER relaxation factors adapt
//! to the observed voltage movement to keep the loop from oscillating.
//! Storage SOC is staged throughout and committed exactly once after the
//! loop settles.

use tracing::{debug, warn};

use crate::devices::cer::{Cer, CerFleet};
use crate::devices::types::CerContext;
use crate::error::SimError;
use crate::input::ModelInputs;
use crate::sim::circuit::PowerFlowSolver;

/// Adaptive relaxation coefficients for one quantity (P or Q).
///
/// The factor shrinks while voltage keeps moving between iterations and
/// grows back once it settles, within `[0.2, 0.9]`.
#[derive(Debug, Clone, Copy)]
pub struct RelaxationGains {
    /// Subtracted when `|dv| > 0.8 * old_|dv|`.
    pub decr_high: f64,
    /// Subtracted when `|dv| > 0.6 * old_|dv|`.
    pub decr_low: f64,
    /// Added when `|dv| < 0.2 * old_|dv|`.
    pub incr_low: f64,
    /// Added when `|dv| < 0.4 * old_|dv|`.
    pub incr_high: f64,
}

impl Default for RelaxationGains {
    fn default() -> Self {
        Self {
            decr_high: 0.10,
            decr_low: 0.05,
            incr_low: 0.10,
            incr_high: 0.05,
        }
    }
}

/// Tolerances and relaxation tuning of the convergence engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Voltage movement tolerance between iterations (pu).
    pub v_tolerance_pu: f64,
    /// Active power relaxation residual tolerance (kW).
    pub p_tolerance_kw: f64,
    /// Reactive power relaxation residual tolerance (kVAr).
    pub q_tolerance_kvar: f64,
    /// Iteration budget per timestep.
    pub max_iterations: usize,
    /// Relaxation coefficients for active power.
    pub p_gains: RelaxationGains,
    /// Relaxation coefficients for reactive power.
    pub q_gains: RelaxationGains,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            v_tolerance_pu: 1e-5,
            p_tolerance_kw: 6e-4,
            q_tolerance_kvar: 6e-4,
            max_iterations: 300,
            p_gains: RelaxationGains::default(),
            q_gains: RelaxationGains::default(),
        }
    }
}

/// What one timestep solve produced.
#[derive(Debug, Clone, Copy)]
pub struct TimestepOutcome {
    pub timestep: usize,
    /// False when the iteration budget ran out; the last attempted
    /// set-points were kept.
    pub converged: bool,
    /// Iterations spent inside the fixed-point loop.
    pub iterations: usize,
}

/// Fixed-point iteration state, one slot per CER.
///
/// Relaxation factors and convergence flags reset at the start of every
/// timestep; the voltage trail (`v_prev`, `old_delta_v`) persists across
/// timesteps so a quiet feeder re-converges quickly.
#[derive(Debug, Clone)]
pub struct ConvergenceEngine {
    settings: EngineSettings,
    delta_p: Vec<Option<f64>>,
    delta_q: Vec<Option<f64>>,
    p_inv: Vec<f64>,
    q_inv: Vec<f64>,
    p_out: Vec<f64>,
    q_out: Vec<f64>,
    p_prev: Vec<f64>,
    q_prev: Vec<f64>,
    v_cur: Vec<f64>,
    v_prev: Vec<f64>,
    old_delta_v: Vec<f64>,
    first_iteration: bool,
}

impl ConvergenceEngine {
    /// Creates an engine for a fleet of `n` CERs.
    pub fn new(settings: EngineSettings, n: usize) -> Self {
        Self {
            settings,
            delta_p: vec![None; n],
            delta_q: vec![None; n],
            p_inv: vec![0.0; n],
            q_inv: vec![0.0; n],
            p_out: vec![0.0; n],
            q_out: vec![0.0; n],
            p_prev: vec![0.0; n],
            q_prev: vec![0.0; n],
            v_cur: vec![0.0; n],
            v_prev: vec![0.0; n],
            old_delta_v: vec![0.0; n],
            first_iteration: true,
        }
    }

    /// Relaxed set-points pushed to the oracle, in each CER's own sign
    /// convention.
    pub fn set_points(&self) -> (&[f64], &[f64]) {
        (&self.p_out, &self.q_out)
    }

    fn init_timestep(&mut self, fleet: &CerFleet) {
        for (i, cer) in fleet.cers.iter().enumerate() {
            self.delta_p[i] = cer.p_active().then_some(0.5);
            self.delta_q[i] = cer.q_active().then_some(0.5);
        }
        self.first_iteration = true;
    }

    fn context_for(fleet: &CerFleet, i: usize, t: usize, volt: f64, inputs: &ModelInputs) -> CerContext {
        let label = fleet.labels[i];
        match &fleet.cers[i] {
            Cer::Load(_) => CerContext::for_load(
                t,
                inputs.demand_at(label, t),
                inputs.load_power_factor,
                volt,
            ),
            Cer::Pv(_) => {
                CerContext::for_pv(t, inputs.irradiance_at(t), inputs.temperature_at(t), volt)
            }
            Cer::HybridPv(_) => CerContext::for_hybrid(
                t,
                inputs.irradiance_at(t),
                inputs.temperature_at(t),
                volt,
                fleet.local_demand_kw(i),
            ),
            Cer::Ev(_) => CerContext::for_ev(t, volt),
        }
    }

    /// Updates and steps every CER in fleet order against the oracle's
    /// last-solved voltages. Hybrid systems see the local demand as of the
    /// CERs already evaluated this pass.
    fn run_pass<S: PowerFlowSolver>(
        &self,
        t: usize,
        fleet: &mut CerFleet,
        inputs: &ModelInputs,
        circuit: &S,
    ) {
        for i in 0..fleet.len() {
            let volt = circuit.voltage_pu(fleet.labels[i]);
            let ctx = Self::context_for(fleet, i, t, volt, inputs);
            fleet.cers[i].update(&ctx);
            fleet.cers[i].step(t);
        }
    }

    fn adapt(delta: &mut f64, dv: f64, old_dv: f64, gains: &RelaxationGains) {
        if dv > 0.8 * old_dv && *delta > 0.2 {
            *delta -= gains.decr_high;
        } else if dv > 0.6 * old_dv && *delta > 0.2 {
            *delta -= gains.decr_low;
        } else if dv < 0.2 * old_dv && *delta < 0.9 {
            *delta += gains.incr_low;
        } else if dv < 0.4 * old_dv && *delta < 0.9 {
            *delta += gains.incr_high;
        }
    }

    fn push_injections<S: PowerFlowSolver>(
        &self,
        fleet: &CerFleet,
        circuit: &mut S,
    ) -> Result<(), SimError> {
        for i in 0..fleet.len() {
            let sign = fleet.cers[i].injection_sign();
            circuit.set_injection(fleet.labels[i], sign * self.p_out[i], sign * self.q_out[i])?;
        }
        Ok(())
    }

    /// Drives one timestep to a simultaneous (V, P, Q) solution, then runs
    /// the final pass that commits storage and leaves the oracle solved at
    /// the agreed operating point.
    ///
    /// Non-convergence within the iteration budget is not fatal: the last
    /// attempted set-points are kept and reported via the outcome.
    ///
    /// # Errors
    ///
    /// Propagates oracle failures.
    pub fn solve_timestep<S: PowerFlowSolver>(
        &mut self,
        t: usize,
        fleet: &mut CerFleet,
        inputs: &ModelInputs,
        circuit: &mut S,
    ) -> Result<TimestepOutcome, SimError> {
        self.init_timestep(fleet);
        let mut converged = false;
        let mut iterations = 0;

        while !converged && iterations < self.settings.max_iterations {
            // Tentative pass: SOC stays staged, nothing commits
            self.run_pass(t, fleet, inputs, circuit);
            for (i, cer) in fleet.cers.iter().enumerate() {
                let (p, q) = cer.output();
                self.p_inv[i] = p;
                self.q_inv[i] = q;
                self.v_cur[i] = cer.volt_pu();
            }

            for i in 0..fleet.len() {
                let dv = (self.v_cur[i] - self.v_prev[i]).abs();
                if let Some(delta) = self.delta_p[i].as_mut() {
                    Self::adapt(delta, dv, self.old_delta_v[i], &self.settings.p_gains);
                }
                if let Some(delta) = self.delta_q[i].as_mut() {
                    Self::adapt(delta, dv, self.old_delta_v[i], &self.settings.q_gains);
                }
                self.old_delta_v[i] = dv;
            }

            if self.first_iteration {
                self.first_iteration = false;
                self.p_out.copy_from_slice(&self.p_inv);
                self.q_out.copy_from_slice(&self.q_inv);
            } else {
                for i in 0..fleet.len() {
                    self.p_out[i] = match self.delta_p[i] {
                        Some(delta) => self.p_prev[i] + delta * (self.p_inv[i] - self.p_prev[i]),
                        None => self.p_inv[i],
                    };
                    self.q_out[i] = match self.delta_q[i] {
                        Some(delta) => self.q_prev[i] + delta * (self.q_inv[i] - self.q_prev[i]),
                        None => self.q_inv[i],
                    };
                }
                converged = (0..fleet.len()).all(|i| {
                    (self.v_cur[i] - self.v_prev[i]).abs() <= self.settings.v_tolerance_pu
                        && (self.p_out[i] - self.p_inv[i]).abs() <= self.settings.p_tolerance_kw
                        && (self.q_out[i] - self.q_inv[i]).abs() <= self.settings.q_tolerance_kvar
                });
            }

            self.v_prev.copy_from_slice(&self.v_cur);
            self.p_prev.copy_from_slice(&self.p_out);
            self.q_prev.copy_from_slice(&self.q_out);

            self.push_injections(fleet, circuit)?;
            circuit.solve()?;
            iterations += 1;
        }

        // Final pass on the settled voltages: the only one that advances SOC
        self.run_pass(t, fleet, inputs, circuit);
        for cer in &mut fleet.cers {
            cer.commit_storage();
        }
        self.push_injections(fleet, circuit)?;
        circuit.solve()?;

        if converged {
            debug!(timestep = t, iterations, "timestep converged");
        } else {
            warn!(timestep = t, iterations, "convergence error!");
        }
        Ok(TimestepOutcome {
            timestep: t,
            converged,
            iterations,
        })
    }
}
