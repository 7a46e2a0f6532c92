//! Core simulation timing types.

/// Centralized simulation timing configuration.
///
/// All devices and the engine reference this struct for timing parameters,
/// eliminating duplicated `dt_hours` computations. Timesteps are uniform
/// energy-balance intervals, typically 30 or 60 minutes.
///
/// # Examples
///
/// ```
/// use cer_sim::sim::types::SimConfig;
///
/// let cfg = SimConfig::new(30, 48);
/// assert_eq!(cfg.dt_hours, 0.5);
/// assert_eq!(cfg.steps, 48);
/// ```
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Duration of one timestep in minutes.
    pub step_minutes: u32,
    /// Total number of timesteps to simulate.
    pub steps: usize,
    /// Duration of one timestep in hours, derived as `step_minutes / 60`.
    pub dt_hours: f64,
}

impl SimConfig {
    /// Creates a new simulation timing configuration.
    ///
    /// # Panics
    ///
    /// Panics if `step_minutes` or `steps` is zero.
    pub fn new(step_minutes: u32, steps: usize) -> Self {
        assert!(step_minutes > 0, "step_minutes must be > 0");
        assert!(steps > 0, "steps must be > 0");
        Self {
            step_minutes,
            steps,
            dt_hours: f64::from(step_minutes) / 60.0,
        }
    }

    /// Simulated hour-of-day at the start of timestep `t`.
    pub fn hour_at(&self, t: usize) -> f64 {
        t as f64 * self.dt_hours
    }

    /// Time-of-day labels for every timestep, formatted `"HH: MM"` starting
    /// at midnight and wrapping after 24 hours.
    pub fn time_labels(&self) -> Vec<String> {
        (0..self.steps)
            .map(|t| {
                let minutes = (t as u32 * self.step_minutes) % (24 * 60);
                format!("{:02}: {:02}", minutes / 60, minutes % 60)
            })
            .collect()
    }
}
