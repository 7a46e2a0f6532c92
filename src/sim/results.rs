//! Per-timestep result registers.
//!
//! One `Results` value is owned by the scenario driver and handed to the
//! recording call after every solved timestep; there is no process-wide
//! state. Register layouts are fixed at construction from the feeder
//! topology and the fleet, so every series has one entry per timestep.

use num_complex::Complex64;

use crate::devices::cer::{Cer, CerFleet, CircuitLabel};
use crate::devices::meter::FlowKind;
use crate::sim::circuit::{PhaseVoltage, PowerFlowSolver};
use crate::sim::engine::TimestepOutcome;
use crate::sim::types::SimConfig;

/// A non-fatal event recorded against a timestep, exported alongside the
/// numeric results.
#[derive(Debug, Clone)]
pub struct SimEvent {
    pub timestep: usize,
    pub message: String,
}

/// Energy-flow history of one meter.
#[derive(Debug, Clone)]
pub struct EnergyFlowRegister {
    /// Circuit label of the meter's coupling point.
    pub label: CircuitLabel,
    /// Categories applicable to the meter's device set, in export order.
    pub columns: Vec<FlowKind>,
    /// One series per column, one entry per timestep (kW).
    pub series: Vec<Vec<f64>>,
}

/// Negative- over positive-sequence voltage ratio in percent.
fn voltage_unbalance_pct(phasors: &[PhaseVoltage; 3]) -> f64 {
    let v: Vec<Complex64> = phasors
        .iter()
        .map(|ph| Complex64::from_polar(ph.v_pu, ph.angle_rad))
        .collect();
    let a = Complex64::from_polar(1.0, 2.0 * std::f64::consts::PI / 3.0);
    let a2 = a * a;
    let v1 = (v[0] + a * v[1] + a2 * v[2]) / 3.0;
    let v2 = (v[0] + a2 * v[1] + a * v[2]) / 3.0;
    if v1.norm() == 0.0 {
        0.0
    } else {
        100.0 * v2.norm() / v1.norm()
    }
}

/// All per-timestep registers of one scenario run.
#[derive(Debug, Clone)]
pub struct Results {
    /// Time-of-day label per timestep, `"HH: MM"`.
    pub time_labels: Vec<String>,
    /// Timestep duration in hours.
    pub dt_hours: f64,

    /// Voltage column names, `bus.phase`, phase-major like the exports.
    pub voltage_columns: Vec<String>,
    /// Voltage magnitude series per column (pu).
    pub voltages_pu: Vec<Vec<f64>>,
    /// Bus names carrying a VUF series.
    pub vuf_buses: Vec<String>,
    /// Voltage unbalance factor series per bus (percent).
    pub vuf_pct: Vec<Vec<f64>>,
    /// Line column names, `line.phase`, phase-major.
    pub line_columns: Vec<String>,
    /// Line loading series per column (percent of rating).
    pub line_loading_pct: Vec<Vec<f64>>,

    /// Source active power per timestep (kW).
    pub total_active_kw: Vec<f64>,
    /// Source reactive power per timestep (kVAr).
    pub total_reactive_kvar: Vec<f64>,
    /// Series active losses per timestep (kW).
    pub active_losses_kw: Vec<f64>,
    /// Series reactive losses per timestep (kVAr).
    pub reactive_losses_kvar: Vec<f64>,

    /// Register key per PV-bearing CER: `pv_<label>` or `hybridpv_<label>`.
    pub pv_keys: Vec<String>,
    /// Phase (1-based) of each PV-bearing CER's injection point.
    pub pv_phases: Vec<usize>,
    pv_indices: Vec<usize>,
    /// DC generation per PV key (kW).
    pub dc_generation_kw: Vec<Vec<f64>>,
    /// Potential inverter AC output per PV key (kW).
    pub ac_potential_kw: Vec<Vec<f64>>,
    /// AC curtailment per PV key (kW).
    pub ac_curtailment_kw: Vec<Vec<f64>>,
    /// DC curtailment per PV key (kW).
    pub dc_curtailment_kw: Vec<Vec<f64>>,
    /// Inverter active output per PV key (kW).
    pub pv_active_kw: Vec<Vec<f64>>,
    /// Inverter reactive output per PV key (kVAr).
    pub pv_reactive_kvar: Vec<Vec<f64>>,

    /// Register key per hybrid battery, `hybridpv_<label>`.
    pub battery_keys: Vec<String>,
    battery_indices: Vec<usize>,
    /// Stored energy per hybrid battery (kWh).
    pub battery_stored_kwh: Vec<Vec<f64>>,

    /// Register key per EV, `ev_<label>`.
    pub ev_keys: Vec<String>,
    ev_indices: Vec<usize>,
    /// EV grid-port active power (kW, import positive).
    pub ev_active_kw: Vec<Vec<f64>>,
    /// EV grid-port reactive power (kVAr).
    pub ev_reactive_kvar: Vec<Vec<f64>>,
    /// Stored energy per EV battery (kWh).
    pub ev_stored_kwh: Vec<Vec<f64>>,

    /// Energy-flow history per meter.
    pub energy_flows: Vec<EnergyFlowRegister>,

    /// Iterations the engine spent per timestep.
    pub iterations: Vec<usize>,
    /// Wall-clock seconds per timestep.
    pub step_seconds: Vec<f64>,
    /// Non-fatal events, in order of occurrence.
    pub events: Vec<SimEvent>,
}

impl Results {
    /// Builds empty registers sized for the topology and fleet.
    pub fn new<S: PowerFlowSolver>(config: &SimConfig, fleet: &CerFleet, circuit: &S) -> Self {
        let topology = circuit.topology();
        let mut voltage_columns = Vec::new();
        for phase in 1..=3 {
            for bus in &topology.buses {
                voltage_columns.push(format!("{bus}.{phase}"));
            }
        }
        let mut line_columns = Vec::new();
        for phase in 1..=3 {
            for line in &topology.lines {
                line_columns.push(format!("{}.{phase}", line.name));
            }
        }

        let mut pv_keys = Vec::new();
        let mut pv_phases = Vec::new();
        let mut pv_indices = Vec::new();
        let mut battery_keys = Vec::new();
        let mut battery_indices = Vec::new();
        let mut ev_keys = Vec::new();
        let mut ev_indices = Vec::new();
        for (i, cer) in fleet.cers.iter().enumerate() {
            let label = fleet.labels[i];
            match cer {
                Cer::Pv(_) => {
                    pv_keys.push(format!("pv_{label}"));
                    pv_phases.push(circuit.label_phase(label));
                    pv_indices.push(i);
                }
                Cer::HybridPv(_) => {
                    pv_keys.push(format!("hybridpv_{label}"));
                    pv_phases.push(circuit.label_phase(label));
                    pv_indices.push(i);
                    battery_keys.push(format!("hybridpv_{label}"));
                    battery_indices.push(i);
                }
                Cer::Ev(_) => {
                    ev_keys.push(format!("ev_{label}"));
                    ev_indices.push(i);
                }
                Cer::Load(_) => {}
            }
        }

        let energy_flows = fleet
            .meters
            .iter()
            .map(|meter| {
                let columns = meter.applicable_columns(&fleet.cers);
                EnergyFlowRegister {
                    label: meter.label(),
                    series: vec![Vec::new(); columns.len()],
                    columns,
                }
            })
            .collect();

        Self {
            time_labels: config.time_labels(),
            dt_hours: config.dt_hours,
            voltages_pu: vec![Vec::new(); voltage_columns.len()],
            voltage_columns,
            vuf_pct: vec![Vec::new(); topology.buses.len()],
            vuf_buses: topology.buses.clone(),
            line_loading_pct: vec![Vec::new(); line_columns.len()],
            line_columns,
            total_active_kw: Vec::new(),
            total_reactive_kvar: Vec::new(),
            active_losses_kw: Vec::new(),
            reactive_losses_kvar: Vec::new(),
            dc_generation_kw: vec![Vec::new(); pv_keys.len()],
            ac_potential_kw: vec![Vec::new(); pv_keys.len()],
            ac_curtailment_kw: vec![Vec::new(); pv_keys.len()],
            dc_curtailment_kw: vec![Vec::new(); pv_keys.len()],
            pv_active_kw: vec![Vec::new(); pv_keys.len()],
            pv_reactive_kvar: vec![Vec::new(); pv_keys.len()],
            pv_keys,
            pv_phases,
            pv_indices,
            battery_stored_kwh: vec![Vec::new(); battery_keys.len()],
            battery_keys,
            battery_indices,
            ev_active_kw: vec![Vec::new(); ev_keys.len()],
            ev_reactive_kvar: vec![Vec::new(); ev_keys.len()],
            ev_stored_kwh: vec![Vec::new(); ev_keys.len()],
            ev_keys,
            ev_indices,
            energy_flows,
            iterations: Vec::new(),
            step_seconds: Vec::new(),
            events: Vec::new(),
        }
    }

    /// Records everything for one solved timestep.
    pub fn record_timestep<S: PowerFlowSolver>(
        &mut self,
        fleet: &CerFleet,
        circuit: &S,
        outcome: TimestepOutcome,
        elapsed_seconds: f64,
    ) {
        let buses = circuit.bus_voltages();
        let n_buses = buses.len();
        for (col, series) in self.voltages_pu.iter_mut().enumerate() {
            let phase = col / n_buses;
            let bus = col % n_buses;
            series.push(buses[bus][phase].v_pu);
        }
        for (bus, series) in self.vuf_pct.iter_mut().enumerate() {
            series.push(voltage_unbalance_pct(&buses[bus]));
        }

        let currents = circuit.line_currents();
        let ratings: Vec<f64> = circuit
            .topology()
            .lines
            .iter()
            .map(|line| line.rating_amps)
            .collect();
        let n_lines = ratings.len();
        for (col, series) in self.line_loading_pct.iter_mut().enumerate() {
            let phase = col / n_lines;
            let line = col % n_lines;
            series.push(100.0 * currents[line][phase] / ratings[line]);
        }

        let totals = circuit.totals();
        self.total_active_kw.push(totals.active_power_kw);
        self.total_reactive_kvar.push(totals.reactive_power_kvar);
        self.active_losses_kw.push(totals.active_losses_kw);
        self.reactive_losses_kvar.push(totals.reactive_losses_kvar);

        for (slot, &i) in self.pv_indices.iter().enumerate() {
            let (dc_gen, ac_pot, ac_curt, dc_curt, p, q) = match &fleet.cers[i] {
                Cer::Pv(pv) => (
                    pv.dc_generation(),
                    pv.ac_potential_output(),
                    pv.ac_curtailment(),
                    pv.dc_curtailment(),
                    pv.p_out(),
                    pv.q_out(),
                ),
                Cer::HybridPv(hybrid) => (
                    hybrid.dc_generation(),
                    hybrid.ac_potential_output(),
                    hybrid.ac_curtailment(),
                    hybrid.dc_curtailment(),
                    hybrid.p_out(),
                    hybrid.q_out(),
                ),
                _ => (0.0, 0.0, 0.0, 0.0, 0.0, 0.0),
            };
            self.dc_generation_kw[slot].push(dc_gen);
            self.ac_potential_kw[slot].push(ac_pot);
            self.ac_curtailment_kw[slot].push(ac_curt);
            self.dc_curtailment_kw[slot].push(dc_curt);
            self.pv_active_kw[slot].push(p);
            self.pv_reactive_kvar[slot].push(q);
        }

        for (slot, &i) in self.battery_indices.iter().enumerate() {
            if let Cer::HybridPv(hybrid) = &fleet.cers[i] {
                self.battery_stored_kwh[slot].push(hybrid.battery().stored_energy_kwh());
            }
        }

        for (slot, &i) in self.ev_indices.iter().enumerate() {
            if let Cer::Ev(ev) = &fleet.cers[i] {
                self.ev_active_kw[slot].push(ev.p_in());
                self.ev_reactive_kvar[slot].push(ev.q_in());
                self.ev_stored_kwh[slot].push(ev.battery().stored_energy_kwh());
            }
        }

        for (register, meter) in self.energy_flows.iter_mut().zip(&fleet.meters) {
            let flows = meter.flows(&fleet.cers);
            for (series, &kind) in register.series.iter_mut().zip(&register.columns) {
                series.push(flows.value(kind));
            }
        }

        self.iterations.push(outcome.iterations);
        self.step_seconds.push(elapsed_seconds);
        if !outcome.converged {
            self.events.push(SimEvent {
                timestep: outcome.timestep,
                message: "convergence error!".to_string(),
            });
        }
    }

    /// Number of recorded timesteps.
    pub fn recorded_steps(&self) -> usize {
        self.total_active_kw.len()
    }

    /// Energy-flow register of one meter label.
    pub fn flows_for_label(&self, label: CircuitLabel) -> Option<&EnergyFlowRegister> {
        self.energy_flows.iter().find(|r| r.label == label)
    }

    /// Series of one flow category at one meter label.
    pub fn flow_series(&self, label: CircuitLabel, kind: FlowKind) -> Option<&[f64]> {
        let register = self.flows_for_label(label)?;
        let idx = register.columns.iter().position(|&k| k == kind)?;
        Some(&register.series[idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_phasors_have_zero_unbalance() {
        let phasors = [
            PhaseVoltage { v_pu: 1.0, angle_rad: 0.0 },
            PhaseVoltage { v_pu: 1.0, angle_rad: -2.0 * std::f64::consts::PI / 3.0 },
            PhaseVoltage { v_pu: 1.0, angle_rad: 2.0 * std::f64::consts::PI / 3.0 },
        ];
        assert!(voltage_unbalance_pct(&phasors) < 1e-9);
    }

    #[test]
    fn magnitude_unbalance_is_detected() {
        let phasors = [
            PhaseVoltage { v_pu: 1.05, angle_rad: 0.0 },
            PhaseVoltage { v_pu: 0.95, angle_rad: -2.0 * std::f64::consts::PI / 3.0 },
            PhaseVoltage { v_pu: 1.0, angle_rad: 2.0 * std::f64::consts::PI / 3.0 },
        ];
        let vuf = voltage_unbalance_pct(&phasors);
        assert!(vuf > 1.0);
        assert!(vuf < 10.0);
    }

    #[test]
    fn collapsed_positive_sequence_reports_zero() {
        let phasors = [
            PhaseVoltage { v_pu: 0.0, angle_rad: 0.0 },
            PhaseVoltage { v_pu: 0.0, angle_rad: 0.0 },
            PhaseVoltage { v_pu: 0.0, angle_rad: 0.0 },
        ];
        assert_eq!(voltage_unbalance_pct(&phasors), 0.0);
    }
}
