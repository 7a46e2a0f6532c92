//! Power-flow oracle interface.
//!
//! The engine treats the three-phase power-flow solver as an opaque oracle:
//! it pushes per-CER injections, asks for a solve, and reads back voltages,
//! line currents and system totals. Any unbalanced solver can sit behind
//! [`PowerFlowSolver`]; the crate ships a linearised radial feeder in
//! [`crate::sim::feeder`] for tests and offline studies.

use crate::devices::cer::CircuitLabel;
use crate::error::SimError;

/// A line with its thermal rating, identified by a stable name.
#[derive(Debug, Clone)]
pub struct LineSpec {
    pub name: String,
    /// Thermal rating per phase in amps.
    pub rating_amps: f64,
}

/// Stable, ordered description of the feeder the oracle solves.
///
/// Buses and lines are listed in increasing distance from the source; the
/// per-timestep result vectors of the oracle are aligned with these lists.
#[derive(Debug, Clone)]
pub struct FeederTopology {
    /// End-bus names, sorted by distance from the source.
    pub buses: Vec<String>,
    /// Lines with ratings, sorted by distance from the source.
    pub lines: Vec<LineSpec>,
}

/// Voltage phasor of one phase at one bus.
#[derive(Debug, Clone, Copy)]
pub struct PhaseVoltage {
    /// Magnitude in per-unit.
    pub v_pu: f64,
    /// Angle in radians.
    pub angle_rad: f64,
}

/// System-level quantities after a solve.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitTotals {
    /// Total active power supplied from the source (kW).
    pub active_power_kw: f64,
    /// Total reactive power supplied from the source (kVAr).
    pub reactive_power_kvar: f64,
    /// Total series active losses (kW).
    pub active_losses_kw: f64,
    /// Total series reactive losses (kVAr).
    pub reactive_losses_kvar: f64,
}

/// The power-flow oracle the convergence engine drives.
///
/// Injections use load sign convention: consumption enters positive, so PV
/// export and EV discharge are pushed with negative active power. Voltage
/// queries before the first `solve` return the flat-start profile (1.0 pu).
pub trait PowerFlowSolver {
    /// Stable description of buses and lines.
    fn topology(&self) -> &FeederTopology;

    /// True when the oracle has an injection point for the label.
    fn has_label(&self, label: CircuitLabel) -> bool;

    /// Sets the operating point of one CER's injection.
    ///
    /// # Errors
    ///
    /// Returns an input-mismatch error for an undefined label.
    fn set_injection(&mut self, label: CircuitLabel, p_kw: f64, q_kvar: f64)
    -> Result<(), SimError>;

    /// Solves the power flow for the current injections.
    ///
    /// # Errors
    ///
    /// Returns an oracle error when no solution exists.
    fn solve(&mut self) -> Result<(), SimError>;

    /// Voltage magnitude at a CER's injection point (pu).
    fn voltage_pu(&self, label: CircuitLabel) -> f64;

    /// Phase (1-based) of a CER's injection point; 1 for unknown labels.
    fn label_phase(&self, label: CircuitLabel) -> usize;

    /// Three-phase voltage phasors per bus, aligned with `topology().buses`.
    fn bus_voltages(&self) -> Vec<[PhaseVoltage; 3]>;

    /// Per-phase current magnitudes in amps, aligned with
    /// `topology().lines`.
    fn line_currents(&self) -> Vec<[f64; 3]>;

    /// System totals for the last solve.
    fn totals(&self) -> CircuitTotals;
}
