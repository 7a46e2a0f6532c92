//! Common types shared by the CER device models.

/// Exogenous inputs handed to a CER at the start of every evaluation.
///
/// The engine builds one context per CER per iteration; `update` copies the
/// relevant fields into the device and has no circuit side-effects. Fields a
/// given CER kind does not consume are left at their defaults.
#[derive(Debug, Clone, Copy)]
pub struct CerContext {
    /// Current simulation timestep index.
    pub timestep: usize,
    /// Terminal voltage at the CER's bus (pu).
    pub volt_pu: f64,
    /// Active demand for load CERs (kW).
    pub demand_kw: f64,
    /// Load power factor.
    pub power_factor: f64,
    /// Plane-of-array irradiance (pu of standard test conditions).
    pub irradiance: f64,
    /// Ambient temperature (degrees Celsius).
    pub temperature_c: f64,
    /// AC demand seen behind the CER's meter (kW, >= 0); consumed by hybrid
    /// systems running maximise-self-consumption.
    pub local_demand_kw: f64,
}

impl CerContext {
    /// Context for a passive load.
    pub fn for_load(timestep: usize, demand_kw: f64, power_factor: f64, volt_pu: f64) -> Self {
        Self {
            volt_pu,
            demand_kw,
            power_factor,
            ..Self::empty(timestep)
        }
    }

    /// Context for a PV system.
    pub fn for_pv(timestep: usize, irradiance: f64, temperature_c: f64, volt_pu: f64) -> Self {
        Self {
            volt_pu,
            irradiance,
            temperature_c,
            ..Self::empty(timestep)
        }
    }

    /// Context for a hybrid PV+battery system.
    pub fn for_hybrid(
        timestep: usize,
        irradiance: f64,
        temperature_c: f64,
        volt_pu: f64,
        local_demand_kw: f64,
    ) -> Self {
        Self {
            volt_pu,
            irradiance,
            temperature_c,
            local_demand_kw,
            ..Self::empty(timestep)
        }
    }

    /// Context for an EV system; driving behaviour lives on the vehicle.
    pub fn for_ev(timestep: usize, volt_pu: f64) -> Self {
        Self {
            volt_pu,
            ..Self::empty(timestep)
        }
    }

    fn empty(timestep: usize) -> Self {
        Self {
            timestep,
            volt_pu: 1.0,
            demand_kw: 0.0,
            power_factor: 1.0,
            irradiance: 0.0,
            temperature_c: 25.0,
            local_demand_kw: 0.0,
        }
    }
}

/// True when `hour` falls inside any half-open `[start, end)` window.
///
/// Shared by the time-of-use and EV charging schedules, which express their
/// windows in hours of day.
pub fn hour_in_windows(windows: &[(f64, f64)], hour: f64) -> bool {
    windows.iter().any(|&(start, end)| start <= hour && hour < end)
}
