//! Exogenous input series for a scenario: per-label demand schedules,
//! irradiance, temperature, and EV behaviour descriptors.
//!
//! Series are validated against the simulation horizon once at scenario
//! start. Synthetic day-profile builders cover tests and offline studies
//! where no measured data is wired in.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::devices::cer::CircuitLabel;
use crate::error::SimError;

/// Driving behaviour descriptor of one EV, keyed by circuit label.
#[derive(Debug, Clone)]
pub struct EvBehaviour {
    /// Total daily driving distance in kilometres.
    pub daily_distance_km: f64,
    /// Away-from-home windows as `(start_hour, end_hour)` pairs.
    pub driving_intervals: Vec<(f64, f64)>,
}

/// All exogenous series a scenario consumes.
#[derive(Debug, Clone, Default)]
pub struct ModelInputs {
    /// Active demand schedule per circuit label (kW).
    pub demand_kw: HashMap<CircuitLabel, Vec<f64>>,
    /// Load power factor applied to every demand schedule.
    pub load_power_factor: f64,
    /// Plane-of-array irradiance (pu of standard test conditions).
    pub irradiance: Vec<f64>,
    /// Ambient temperature (degrees Celsius).
    pub temperature_c: Vec<f64>,
    /// EV behaviour per circuit label.
    pub ev_behaviour: HashMap<CircuitLabel, EvBehaviour>,
}

impl ModelInputs {
    /// Empty inputs at the default 0.95 load power factor.
    pub fn new() -> Self {
        Self {
            demand_kw: HashMap::new(),
            load_power_factor: 0.95,
            irradiance: Vec::new(),
            temperature_c: Vec::new(),
            ev_behaviour: HashMap::new(),
        }
    }

    /// Demand of one label at timestep `t`, zero when no schedule exists.
    pub fn demand_at(&self, label: CircuitLabel, t: usize) -> f64 {
        self.demand_kw
            .get(&label)
            .and_then(|series| series.get(t).copied())
            .unwrap_or(0.0)
    }

    /// Irradiance at timestep `t`, zero past the end of the series.
    pub fn irradiance_at(&self, t: usize) -> f64 {
        self.irradiance.get(t).copied().unwrap_or(0.0)
    }

    /// Temperature at timestep `t`, 25 C past the end of the series.
    pub fn temperature_at(&self, t: usize) -> f64 {
        self.temperature_c.get(t).copied().unwrap_or(25.0)
    }

    /// Checks every series covers `steps` timesteps and that demand exists
    /// for each of `load_labels`.
    ///
    /// # Errors
    ///
    /// Returns an input-mismatch error naming the offending label or series.
    pub fn validate(&self, steps: usize, load_labels: &[CircuitLabel]) -> Result<(), SimError> {
        for &label in load_labels {
            match self.demand_kw.get(&label) {
                None => {
                    return Err(SimError::InputMismatch(format!(
                        "no demand schedule for circuit label {label}"
                    )));
                }
                Some(series) if series.len() < steps => {
                    return Err(SimError::InputMismatch(format!(
                        "demand schedule for label {label} has {} of {steps} steps",
                        series.len()
                    )));
                }
                Some(_) => {}
            }
        }
        if !self.irradiance.is_empty() && self.irradiance.len() < steps {
            return Err(SimError::InputMismatch(format!(
                "irradiance series has {} of {steps} steps",
                self.irradiance.len()
            )));
        }
        if !self.temperature_c.is_empty() && self.temperature_c.len() < steps {
            return Err(SimError::InputMismatch(format!(
                "temperature series has {} of {steps} steps",
                self.temperature_c.len()
            )));
        }
        Ok(())
    }
}

/// Gaussian noise via the Box-Muller transform.
fn gaussian_noise(rng: &mut StdRng, std_dev: f64) -> f64 {
    if std_dev <= 0.0 {
        return 0.0;
    }
    let u1: f64 = rng.random::<f64>().clamp(1e-12, 1.0);
    let u2: f64 = rng.random::<f64>();
    let z0 = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
    z0 * std_dev
}

/// Synthetic residential demand day: a sinusoid around `base_kw` with
/// amplitude `amp_kw`, phase `phase_rad`, and seeded Gaussian noise.
pub fn synthetic_demand_day(
    steps: usize,
    base_kw: f64,
    amp_kw: f64,
    phase_rad: f64,
    noise_std: f64,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..steps)
        .map(|t| {
            let angle = 2.0 * std::f64::consts::PI * t as f64 / steps as f64 + phase_rad;
            (base_kw + amp_kw * angle.sin() + gaussian_noise(&mut rng, noise_std)).max(0.0)
        })
        .collect()
}

/// Synthetic clear-sky irradiance day: a half-cosine bump between sunrise
/// and sunset step indices, zero at night, with seeded Gaussian noise.
pub fn synthetic_irradiance_day(
    steps: usize,
    sunrise_idx: usize,
    sunset_idx: usize,
    noise_std: f64,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..steps)
        .map(|t| {
            if t < sunrise_idx || t >= sunset_idx {
                return 0.0;
            }
            let span = (sunset_idx - sunrise_idx) as f64;
            let x = (t - sunrise_idx) as f64 / span;
            let clear = (std::f64::consts::PI * (x - 0.5)).cos();
            (clear * (1.0 + gaussian_noise(&mut rng, noise_std))).clamp(0.0, 1.0)
        })
        .collect()
}

/// Flat temperature day at `value_c` degrees.
pub fn flat_temperature_day(steps: usize, value_c: f64) -> Vec<f64> {
    vec![value_c; steps]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_flags_missing_demand() {
        let inputs = ModelInputs::new();
        let err = inputs.validate(24, &[1]);
        assert!(err.is_err());
    }

    #[test]
    fn validate_flags_short_series() {
        let mut inputs = ModelInputs::new();
        inputs.demand_kw.insert(1, vec![1.0; 10]);
        assert!(inputs.validate(24, &[1]).is_err());
        inputs.demand_kw.insert(1, vec![1.0; 24]);
        assert!(inputs.validate(24, &[1]).is_ok());
    }

    #[test]
    fn validate_flags_short_irradiance() {
        let mut inputs = ModelInputs::new();
        inputs.irradiance = vec![0.5; 10];
        assert!(inputs.validate(24, &[]).is_err());
    }

    #[test]
    fn demand_at_defaults_to_zero() {
        let inputs = ModelInputs::new();
        assert_eq!(inputs.demand_at(42, 0), 0.0);
    }

    #[test]
    fn synthetic_demand_is_deterministic_per_seed() {
        let a = synthetic_demand_day(24, 0.8, 0.4, 1.2, 0.05, 7);
        let b = synthetic_demand_day(24, 0.8, 0.4, 1.2, 0.05, 7);
        assert_eq!(a, b);
        let c = synthetic_demand_day(24, 0.8, 0.4, 1.2, 0.05, 8);
        assert_ne!(a, c);
    }

    #[test]
    fn synthetic_demand_never_negative() {
        let day = synthetic_demand_day(48, 0.1, 0.5, 0.0, 0.2, 3);
        assert!(day.iter().all(|&kw| kw >= 0.0));
    }

    #[test]
    fn irradiance_dark_outside_daylight() {
        let day = synthetic_irradiance_day(24, 6, 18, 0.0, 0);
        assert_eq!(day[0], 0.0);
        assert_eq!(day[5], 0.0);
        assert_eq!(day[18], 0.0);
        assert!(day[12] > 0.9);
        assert!(day.iter().all(|&irr| (0.0..=1.0).contains(&irr)));
    }
}
