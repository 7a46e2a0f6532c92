//! Battery energy storage with a staged state-of-charge advance.

use crate::error::SimError;

/// A battery behind a charger with round-trip losses.
///
/// `Battery` models stored energy through a state of charge (SOC) bounded to
/// `[min_soc, 1.0]`. Charge and discharge powers are capped both by the
/// charger rating and by the energy headroom available within one timestep.
///
/// # Staged SOC
///
/// The convergence engine evaluates every CER many times per timestep while
/// searching for a consistent operating point; only the final evaluation may
/// advance stored energy. `stage_charge`/`stage_discharge` therefore compute
/// the *next* SOC from the committed one without mutating it, and
/// [`Battery::commit`] applies the staged value exactly once per timestep.
/// Re-staging with identical inputs is idempotent.
#[derive(Debug, Clone)]
pub struct Battery {
    /// Usable energy capacity in kilowatt-hours.
    pub capacity_kwh: f64,
    /// Lower SOC bound the charger will not discharge below.
    pub min_soc: f64,
    /// Charger one-way efficiency (0..=1.0).
    pub charger_eff: f64,
    /// Charger power rating in kilowatts.
    pub charger_kw: f64,
    soc: f64,
    staged_soc: f64,
}

impl Battery {
    /// Creates a battery at the given initial SOC.
    ///
    /// The initial SOC is raised to `min_soc` if it starts below the floor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for non-positive capacity, efficiency
    /// outside `(0, 1]`, a negative charger rating, or an SOC floor outside
    /// `[0, 1]`.
    pub fn new(
        capacity_kwh: f64,
        initial_soc: f64,
        min_soc: f64,
        charger_eff: f64,
        charger_kw: f64,
    ) -> Result<Self, SimError> {
        if capacity_kwh <= 0.0 {
            return Err(SimError::configuration("battery.capacity_kwh", "must be > 0"));
        }
        if !(0.0..=1.0).contains(&min_soc) {
            return Err(SimError::configuration("battery.min_soc", "must be in [0, 1]"));
        }
        if !(initial_soc <= 1.0) {
            return Err(SimError::configuration("battery.initial_soc", "must be <= 1"));
        }
        if charger_eff <= 0.0 || charger_eff > 1.0 {
            return Err(SimError::configuration("battery.charger_eff", "must be in (0, 1]"));
        }
        if charger_kw < 0.0 {
            return Err(SimError::configuration("battery.charger_kw", "must be >= 0"));
        }
        let soc = initial_soc.max(min_soc);
        Ok(Self {
            capacity_kwh,
            min_soc,
            charger_eff,
            charger_kw,
            soc,
            staged_soc: soc,
        })
    }

    /// Committed state of charge.
    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Committed stored energy in kilowatt-hours.
    pub fn stored_energy_kwh(&self) -> f64 {
        self.soc * self.capacity_kwh
    }

    /// Maximum charging power over one timestep of `dt_hours`, limited by
    /// the charger rating and the headroom to full.
    pub fn max_charge_kw(&self, dt_hours: f64) -> f64 {
        let headroom_kw = (1.0 - self.soc) * self.capacity_kwh / dt_hours / self.charger_eff;
        self.charger_kw.min(headroom_kw.max(0.0))
    }

    /// Maximum discharging power over one timestep of `dt_hours`, limited by
    /// the charger rating and the energy above the SOC floor.
    pub fn max_discharge_kw(&self, dt_hours: f64) -> f64 {
        let available_kw = self.charger_eff * (self.soc - self.min_soc) * self.capacity_kwh / dt_hours;
        self.charger_kw.min(available_kw.max(0.0))
    }

    /// Stages a charge at `|power_kw|` for one timestep. The accepted power
    /// is capped at [`Battery::max_charge_kw`]; losses are taken on the way
    /// in, so the SOC gains `accepted * eff * dt / capacity`.
    pub fn stage_charge(&mut self, power_kw: f64, dt_hours: f64) {
        let accepted = power_kw.abs().min(self.max_charge_kw(dt_hours));
        let soc = self.soc + accepted * self.charger_eff * dt_hours / self.capacity_kwh;
        self.staged_soc = soc.min(1.0);
    }

    /// Stages a discharge at `|power_kw|` for one timestep. The delivered
    /// power is capped at [`Battery::max_discharge_kw`]; losses are taken on
    /// the way out, so the SOC drops `delivered * dt / (eff * capacity)`.
    pub fn stage_discharge(&mut self, power_kw: f64, dt_hours: f64) {
        let delivered = power_kw.abs().min(self.max_discharge_kw(dt_hours));
        let soc = self.soc - delivered * dt_hours / self.capacity_kwh / self.charger_eff;
        self.staged_soc = soc.max(self.min_soc);
    }

    /// Applies the staged SOC. Called once per timestep, after the
    /// convergence loop has settled.
    pub fn commit(&mut self) {
        self.soc = self.staged_soc;
    }
}
