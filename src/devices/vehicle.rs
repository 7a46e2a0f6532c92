//! Vehicle driving behaviour for EV systems.

use crate::error::SimError;

/// Daily driving pattern of an electric vehicle.
///
/// The vehicle is away from home during each `driving_intervals` window
/// (hours of day, half-open `[start, end)`), covering `daily_distance_km`
/// spread uniformly over the total driving time.
#[derive(Debug, Clone)]
pub struct Vehicle {
    /// Total distance driven per day in kilometres.
    pub daily_distance_km: f64,
    /// Away-from-home windows as `(start_hour, end_hour)` pairs.
    pub driving_intervals: Vec<(f64, f64)>,
    /// Electric range on a full battery in kilometres.
    pub battery_range_km: f64,
    step_minutes: u32,
}

impl Vehicle {
    /// Creates a vehicle from its behaviour descriptor.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when no driving interval is given, an
    /// interval is empty or reversed, or range/distance are not positive.
    pub fn new(
        daily_distance_km: f64,
        driving_intervals: Vec<(f64, f64)>,
        battery_range_km: f64,
        step_minutes: u32,
    ) -> Result<Self, SimError> {
        if daily_distance_km < 0.0 {
            return Err(SimError::configuration("vehicle.daily_distance_km", "must be >= 0"));
        }
        if battery_range_km <= 0.0 {
            return Err(SimError::configuration("vehicle.battery_range_km", "must be > 0"));
        }
        if driving_intervals.is_empty() {
            return Err(SimError::configuration(
                "vehicle.driving_intervals",
                "at least one interval required",
            ));
        }
        if driving_intervals.iter().any(|&(start, end)| end <= start) {
            return Err(SimError::configuration(
                "vehicle.driving_intervals",
                "intervals must satisfy start < end",
            ));
        }
        Ok(Self {
            daily_distance_km,
            driving_intervals,
            battery_range_km,
            step_minutes,
        })
    }

    /// Total time spent driving per day, in minutes.
    pub fn driving_minutes(&self) -> f64 {
        self.driving_intervals
            .iter()
            .map(|(start, end)| (end - start) * 60.0)
            .sum()
    }

    /// Distance covered during one timestep while on the road (km).
    pub fn distance_per_step_km(&self) -> f64 {
        f64::from(self.step_minutes) * self.daily_distance_km / self.driving_minutes()
    }

    /// True when the vehicle is home (not inside any driving interval) at
    /// timestep `t`.
    pub fn at_home(&self, t: usize) -> bool {
        let hour = t as f64 * f64::from(self.step_minutes) / 60.0;
        !self
            .driving_intervals
            .iter()
            .any(|&(start, end)| start <= hour && hour < end)
    }
}
