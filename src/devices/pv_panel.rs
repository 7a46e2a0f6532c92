//! PV panel array DC production.

use crate::curves::ControlCurve;
use crate::error::SimError;

/// A PV panel array characterised by its maximum power point and a
/// temperature derating curve.
#[derive(Debug, Clone)]
pub struct PvPanels {
    /// Array power at maximum power point under standard conditions (kW).
    pub pmpp_kw: f64,
    derating: ControlCurve,
}

impl PvPanels {
    /// Creates a panel array.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a negative `pmpp_kw`.
    pub fn new(pmpp_kw: f64, derating: ControlCurve) -> Result<Self, SimError> {
        if pmpp_kw < 0.0 {
            return Err(SimError::configuration("pv_panel.pmpp_kw", "must be >= 0"));
        }
        Ok(Self { pmpp_kw, derating })
    }

    /// Panel array with the default temperature derating.
    pub fn with_default_derating(pmpp_kw: f64) -> Result<Self, SimError> {
        Self::new(pmpp_kw, ControlCurve::temperature_derating_default())
    }

    /// DC power for the given plane-of-array irradiance (pu) and ambient
    /// temperature (degrees Celsius).
    pub fn dc_power_kw(&self, irradiance: f64, temperature_c: f64) -> f64 {
        self.pmpp_kw * irradiance * self.derating.evaluate(temperature_c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_output_at_standard_conditions() {
        let pv = PvPanels::with_default_derating(7.2).expect("valid panels");
        assert!((pv.dc_power_kw(1.0, 25.0) - 7.2).abs() < 1e-12);
    }

    #[test]
    fn cold_panels_overproduce() {
        let pv = PvPanels::with_default_derating(7.2).expect("valid panels");
        assert!(pv.dc_power_kw(1.0, 0.0) > 7.2);
    }

    #[test]
    fn hot_panels_derate() {
        let pv = PvPanels::with_default_derating(7.2).expect("valid panels");
        // 50 C sits halfway between 25 C (1.0) and 75 C (0.8)
        assert!((pv.dc_power_kw(1.0, 50.0) - 7.2 * 0.9).abs() < 1e-12);
    }

    #[test]
    fn zero_irradiance_means_zero_power() {
        let pv = PvPanels::with_default_derating(7.2).expect("valid panels");
        assert_eq!(pv.dc_power_kw(0.0, 25.0), 0.0);
    }

    #[test]
    fn rejects_negative_pmpp() {
        assert!(PvPanels::with_default_derating(-1.0).is_err());
    }
}
