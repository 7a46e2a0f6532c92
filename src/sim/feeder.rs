//! Linearised radial feeder: the crate's bundled power-flow oracle.
//!
//! A chain of series segments from the source bus, each carrying the whole
//! downstream demand of its phase. Voltage drops use the standard
//! `(R*P + X*Q) / V^2` linearisation per phase, which captures the
//! voltage-injection coupling the convergence engine must tame without
//! pulling in a full unbalanced solver. Not a power-flow implementation —
//! production studies should wrap a real solver behind
//! [`PowerFlowSolver`].

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::devices::cer::CircuitLabel;
use crate::error::SimError;
use crate::sim::circuit::{CircuitTotals, FeederTopology, LineSpec, PhaseVoltage, PowerFlowSolver};

/// Nominal line-neutral voltage of the LV feeder (volts).
const V_BASE_LN: f64 = 230.0;

/// One series segment of the radial chain; bus `i` is the downstream end of
/// segment `i`.
#[derive(Debug, Clone)]
pub struct FeederSegment {
    pub name: String,
    pub r_ohm: f64,
    pub x_ohm: f64,
    /// Thermal rating per phase in amps.
    pub rating_amps: f64,
}

/// Connection point of one CER: a bus index and a phase (0, 1, 2).
#[derive(Debug, Clone, Copy)]
pub struct FeederTap {
    pub label: CircuitLabel,
    pub bus: usize,
    pub phase: usize,
}

/// A linearised radial LV feeder implementing the oracle interface.
#[derive(Debug, Clone)]
pub struct LinearFeeder {
    topology: FeederTopology,
    segments: Vec<FeederSegment>,
    taps: HashMap<CircuitLabel, FeederTap>,
    injections: HashMap<CircuitLabel, (f64, f64)>,
    bus_voltages: Vec<[PhaseVoltage; 3]>,
    currents: Vec<[f64; 3]>,
    totals: CircuitTotals,
}

fn phase_angle(phase: usize) -> f64 {
    match phase {
        0 => 0.0,
        1 => -2.0 * PI / 3.0,
        _ => 2.0 * PI / 3.0,
    }
}

impl LinearFeeder {
    /// Builds a feeder from a segment chain and the CER connection points.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty chain, an out-of-range
    /// tap, or a duplicate label.
    pub fn new(segments: Vec<FeederSegment>, taps: Vec<FeederTap>) -> Result<Self, SimError> {
        if segments.is_empty() {
            return Err(SimError::configuration("feeder", "at least one segment required"));
        }
        let mut tap_map = HashMap::new();
        for tap in taps {
            if tap.bus >= segments.len() {
                return Err(SimError::configuration(
                    "feeder",
                    format!("tap for label {} references bus {} of {}", tap.label, tap.bus, segments.len()),
                ));
            }
            if tap.phase >= 3 {
                return Err(SimError::configuration(
                    "feeder",
                    format!("tap for label {} references phase {}", tap.label, tap.phase),
                ));
            }
            if tap_map.insert(tap.label, tap).is_some() {
                return Err(SimError::configuration(
                    "feeder",
                    format!("duplicate tap for label {}", tap.label),
                ));
            }
        }
        let topology = FeederTopology {
            buses: (1..=segments.len()).map(|i| format!("bus{i}")).collect(),
            lines: segments
                .iter()
                .map(|s| LineSpec {
                    name: s.name.clone(),
                    rating_amps: s.rating_amps,
                })
                .collect(),
        };
        let flat = [
            PhaseVoltage { v_pu: 1.0, angle_rad: phase_angle(0) },
            PhaseVoltage { v_pu: 1.0, angle_rad: phase_angle(1) },
            PhaseVoltage { v_pu: 1.0, angle_rad: phase_angle(2) },
        ];
        let n = segments.len();
        Ok(Self {
            topology,
            segments,
            taps: tap_map,
            injections: HashMap::new(),
            bus_voltages: vec![flat; n],
            currents: vec![[0.0; 3]; n],
            totals: CircuitTotals::default(),
        })
    }

    /// A uniform radial chain of `buses` segments with one tap per label,
    /// spread round-robin over the three phases along the feeder.
    pub fn radial(
        buses: usize,
        r_ohm: f64,
        x_ohm: f64,
        rating_amps: f64,
        labels: &[CircuitLabel],
    ) -> Result<Self, SimError> {
        let segments = (1..=buses)
            .map(|i| FeederSegment {
                name: format!("line{i}"),
                r_ohm,
                x_ohm,
                rating_amps,
            })
            .collect();
        let taps = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| FeederTap {
                label,
                bus: i % buses,
                phase: i % 3,
            })
            .collect();
        Self::new(segments, taps)
    }

    /// A single zero-impedance bus holding every label: terminal voltages
    /// stay pinned at 1.0 pu. Useful for device-level scenarios where the
    /// circuit should not talk back.
    pub fn stiff(labels: &[CircuitLabel]) -> Result<Self, SimError> {
        let segments = vec![FeederSegment {
            name: "line1".to_string(),
            r_ohm: 0.0,
            x_ohm: 0.0,
            rating_amps: 1000.0,
        }];
        let taps = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| FeederTap {
                label,
                bus: 0,
                phase: i % 3,
            })
            .collect();
        Self::new(segments, taps)
    }
}

impl PowerFlowSolver for LinearFeeder {
    fn topology(&self) -> &FeederTopology {
        &self.topology
    }

    fn has_label(&self, label: CircuitLabel) -> bool {
        self.taps.contains_key(&label)
    }

    fn set_injection(
        &mut self,
        label: CircuitLabel,
        p_kw: f64,
        q_kvar: f64,
    ) -> Result<(), SimError> {
        if !self.taps.contains_key(&label) {
            return Err(SimError::InputMismatch(format!(
                "no injection point for circuit label {label}"
            )));
        }
        self.injections.insert(label, (p_kw, q_kvar));
        Ok(())
    }

    fn solve(&mut self) -> Result<(), SimError> {
        let n = self.segments.len();
        // Demand hanging at each bus, per phase (kW, kVAr)
        let mut bus_p = vec![[0.0_f64; 3]; n];
        let mut bus_q = vec![[0.0_f64; 3]; n];
        for (label, &(p, q)) in &self.injections {
            let tap = &self.taps[label];
            bus_p[tap.bus][tap.phase] += p;
            bus_q[tap.bus][tap.phase] += q;
        }

        // Each segment carries the whole demand downstream of it
        let mut down_p = vec![[0.0_f64; 3]; n];
        let mut down_q = vec![[0.0_f64; 3]; n];
        for m in (0..n).rev() {
            for phase in 0..3 {
                down_p[m][phase] = bus_p[m][phase];
                down_q[m][phase] = bus_q[m][phase];
                if m + 1 < n {
                    down_p[m][phase] += down_p[m + 1][phase];
                    down_q[m][phase] += down_q[m + 1][phase];
                }
            }
        }

        let mut active_losses = 0.0;
        let mut reactive_losses = 0.0;
        for m in 0..n {
            let upstream = if m == 0 {
                [1.0, 1.0, 1.0]
            } else {
                [
                    self.bus_voltages[m - 1][0].v_pu,
                    self.bus_voltages[m - 1][1].v_pu,
                    self.bus_voltages[m - 1][2].v_pu,
                ]
            };
            for phase in 0..3 {
                let seg = &self.segments[m];
                // (R*P + X*Q) / V^2 linearised series drop, in pu
                let drop_pu = (seg.r_ohm * down_p[m][phase] + seg.x_ohm * down_q[m][phase])
                    * 1000.0
                    / (V_BASE_LN * V_BASE_LN);
                let v_pu = (upstream[phase] - drop_pu).max(0.2);
                self.bus_voltages[m][phase] = PhaseVoltage {
                    v_pu,
                    angle_rad: phase_angle(phase),
                };

                let s_kva = down_p[m][phase].hypot(down_q[m][phase]);
                let amps = s_kva * 1000.0 / (V_BASE_LN * v_pu);
                self.currents[m][phase] = amps;
                active_losses += seg.r_ohm * amps * amps / 1000.0;
                reactive_losses += seg.x_ohm * amps * amps / 1000.0;
            }
        }

        let injected_p: f64 = self.injections.values().map(|&(p, _)| p).sum();
        let injected_q: f64 = self.injections.values().map(|&(_, q)| q).sum();
        self.totals = CircuitTotals {
            active_power_kw: injected_p + active_losses,
            reactive_power_kvar: injected_q + reactive_losses,
            active_losses_kw: active_losses,
            reactive_losses_kvar: reactive_losses,
        };
        Ok(())
    }

    fn voltage_pu(&self, label: CircuitLabel) -> f64 {
        match self.taps.get(&label) {
            Some(tap) => self.bus_voltages[tap.bus][tap.phase].v_pu,
            None => 1.0,
        }
    }

    fn label_phase(&self, label: CircuitLabel) -> usize {
        self.taps.get(&label).map_or(1, |tap| tap.phase + 1)
    }

    fn bus_voltages(&self) -> Vec<[PhaseVoltage; 3]> {
        self.bus_voltages.clone()
    }

    fn line_currents(&self) -> Vec<[f64; 3]> {
        self.currents.clone()
    }

    fn totals(&self) -> CircuitTotals {
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_start_before_first_solve() {
        let feeder = LinearFeeder::radial(3, 0.1, 0.05, 100.0, &[1, 2, 3]).expect("feeder");
        assert_eq!(feeder.voltage_pu(1), 1.0);
        assert_eq!(feeder.voltage_pu(3), 1.0);
    }

    #[test]
    fn load_depresses_downstream_voltage() {
        let mut feeder = LinearFeeder::radial(3, 0.2, 0.1, 100.0, &[1, 2, 3]).expect("feeder");
        feeder.set_injection(3, 5.0, 1.0).expect("known label");
        feeder.solve().expect("solvable");
        // Label 3 sits at the end of the chain on phase 2
        assert!(feeder.voltage_pu(3) < 1.0);
    }

    #[test]
    fn generation_raises_voltage() {
        let mut feeder = LinearFeeder::radial(2, 0.2, 0.1, 100.0, &[1, 2]).expect("feeder");
        feeder.set_injection(2, -4.0, 0.0).expect("known label");
        feeder.solve().expect("solvable");
        assert!(feeder.voltage_pu(2) > 1.0);
    }

    #[test]
    fn stiff_bus_holds_nominal_voltage() {
        let mut feeder = LinearFeeder::stiff(&[7]).expect("feeder");
        feeder.set_injection(7, 10.0, 3.0).expect("known label");
        feeder.solve().expect("solvable");
        assert_eq!(feeder.voltage_pu(7), 1.0);
    }

    #[test]
    fn rejects_unknown_label() {
        let mut feeder = LinearFeeder::stiff(&[1]).expect("feeder");
        assert!(feeder.set_injection(9, 1.0, 0.0).is_err());
    }

    #[test]
    fn rejects_out_of_range_tap() {
        let segments = vec![FeederSegment {
            name: "line1".to_string(),
            r_ohm: 0.1,
            x_ohm: 0.05,
            rating_amps: 100.0,
        }];
        let taps = vec![FeederTap { label: 1, bus: 5, phase: 0 }];
        assert!(LinearFeeder::new(segments, taps).is_err());
    }

    #[test]
    fn losses_are_positive_under_load() {
        let mut feeder = LinearFeeder::radial(2, 0.3, 0.1, 100.0, &[1, 2]).expect("feeder");
        feeder.set_injection(1, 3.0, 0.5).expect("known label");
        feeder.set_injection(2, 2.0, 0.5).expect("known label");
        feeder.solve().expect("solvable");
        let totals = feeder.totals();
        assert!(totals.active_losses_kw > 0.0);
        assert!(totals.active_power_kw > 5.0);
    }

    #[test]
    fn currents_follow_downstream_demand() {
        let mut feeder = LinearFeeder::radial(2, 0.1, 0.05, 100.0, &[1, 2]).expect("feeder");
        // Both labels on different phases; only the chain head carries both
        feeder.set_injection(1, 2.0, 0.0).expect("known label");
        feeder.set_injection(2, 2.0, 0.0).expect("known label");
        feeder.solve().expect("solvable");
        let currents = feeder.line_currents();
        // Phase 0 (label 1 at bus 0): segment 0 carries it, segment 1 does not
        assert!(currents[0][0] > 0.0);
        assert_eq!(currents[1][0], 0.0);
        // Phase 1 (label 2 at bus 1): both segments carry it
        assert!(currents[0][1] > 0.0);
        assert!(currents[1][1] > 0.0);
    }
}
