//! Hybrid (PV + battery) inverter: battery scheduling policies layered on
//! the base grid inverter.

use crate::curves::ControlCurve;
use crate::devices::inverter::Inverter;
use crate::devices::types::hour_in_windows;
use crate::error::SimError;

/// Battery scheduling policy of a hybrid inverter. Exactly one is active.
#[derive(Debug, Clone)]
pub enum HybridPolicy {
    /// Battery absorbs surplus PV after meeting local load and discharges
    /// into the deficit.
    MaximiseSelfConsumption,
    /// Charge from surplus PV and top up from the grid inside the charge
    /// windows; discharge to the inverter cap inside the discharge windows.
    TimeOfUse {
        /// Charging windows as `(start_hour, end_hour)` pairs.
        charge_windows: Vec<(f64, f64)>,
        /// Discharging windows as `(start_hour, end_hour)` pairs.
        discharge_windows: Vec<(f64, f64)>,
    },
}

fn validate_windows(field: &str, windows: &[(f64, f64)]) -> Result<(), SimError> {
    if windows.iter().any(|&(start, end)| end <= start) {
        return Err(SimError::configuration(
            field,
            "windows must satisfy start < end",
        ));
    }
    Ok(())
}

/// A hybrid inverter with one DC port for PV and one for a battery.
///
/// Battery flow is signed: positive charges the battery, negative feeds the
/// inverter. The battery's admissible power band is refreshed by the owning
/// system before every evaluation via [`HybridInverter::update_battery_limits`].
#[derive(Debug, Clone)]
pub struct HybridInverter {
    inv: Inverter,
    charging_volt_watt: Option<ControlCurve>,
    policy: HybridPolicy,
    step_minutes: u32,
    battery_power_kw: f64,
    max_charge_kw: f64,
    max_discharge_kw: f64,
}

impl HybridInverter {
    /// Creates a hybrid inverter from a base inverter, a scheduling policy
    /// and an optional charging Volt-Watt curve limiting grid-side charging
    /// at depressed voltage.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for reversed or empty time-of-use
    /// windows.
    pub fn new(
        inv: Inverter,
        policy: HybridPolicy,
        charging_volt_watt: Option<ControlCurve>,
        step_minutes: u32,
    ) -> Result<Self, SimError> {
        if let HybridPolicy::TimeOfUse {
            charge_windows,
            discharge_windows,
        } = &policy
        {
            validate_windows("hybrid_inverter.charge_windows", charge_windows)?;
            validate_windows("hybrid_inverter.discharge_windows", discharge_windows)?;
        }
        Ok(Self {
            inv,
            charging_volt_watt,
            policy,
            step_minutes,
            battery_power_kw: 0.0,
            max_charge_kw: 0.0,
            max_discharge_kw: 0.0,
        })
    }

    /// The underlying grid inverter.
    pub fn inner(&self) -> &Inverter {
        &self.inv
    }

    /// Refreshes the battery's admissible power band for this timestep.
    pub fn update_battery_limits(&mut self, max_charge_kw: f64, max_discharge_kw: f64) {
        self.max_charge_kw = max_charge_kw;
        self.max_discharge_kw = max_discharge_kw;
    }

    /// Signed battery flow chosen at the last evaluation (kW, charging
    /// positive).
    pub fn battery_power_kw(&self) -> f64 {
        self.battery_power_kw
    }

    fn hour_at(&self, t: usize) -> f64 {
        t as f64 * f64::from(self.step_minutes) / 60.0
    }

    /// Maximum AC power the inverter can draw while charging from the grid.
    /// No VArs are produced while charging, so this is the full rating.
    fn max_input_ac_kw(&self) -> f64 {
        self.inv.rated_kva
    }

    /// Grid-side charge power ceiling, backed off by the charging Volt-Watt
    /// curve when enabled.
    pub fn charge_limit_kw(&self, volt: f64) -> f64 {
        match &self.charging_volt_watt {
            Some(curve) => self.max_input_ac_kw() * curve.evaluate(volt),
            None => self.max_input_ac_kw(),
        }
    }

    /// DC-referred power that would satisfy the local AC demand through the
    /// inverter, capped by the largest output the inverter can produce at
    /// this voltage.
    fn dc_power_to_meet_load_kw(&self, p_pv_kw: f64, load_kw: f64, volt: f64) -> f64 {
        let (max_ac, _) = self.inv.desired_output(self.inv.max_dc_input_kw(), volt);
        if load_kw >= max_ac {
            let (pv_ac, _) = self.inv.desired_output(p_pv_kw, volt);
            self.inv.dc_input_for_ac(pv_ac)
        } else {
            self.inv.dc_input_for_ac(load_kw)
        }
    }

    fn battery_to_inverter_kw(&self, p_pv_kw: f64, load_kw: f64, volt: f64, t: usize) -> f64 {
        match &self.policy {
            HybridPolicy::MaximiseSelfConsumption => {
                let required = self.dc_power_to_meet_load_kw(p_pv_kw, load_kw, volt);
                (required - p_pv_kw).max(0.0).min(self.max_discharge_kw)
            }
            HybridPolicy::TimeOfUse {
                discharge_windows, ..
            } => {
                if hour_in_windows(discharge_windows, self.hour_at(t)) {
                    // Discharge into the room between available PV and the
                    // largest DC input convertible at this voltage
                    let (max_ac, _) = self.inv.desired_output(self.inv.max_dc_input_kw(), volt);
                    let max_dc = self.inv.dc_input_for_ac(max_ac);
                    (max_dc - p_pv_kw).max(0.0).min(self.max_discharge_kw)
                } else {
                    0.0
                }
            }
        }
    }

    fn pv_to_battery_kw(&self, p_pv_kw: f64, load_kw: f64, volt: f64, t: usize) -> f64 {
        match &self.policy {
            HybridPolicy::MaximiseSelfConsumption => {
                let required = self.dc_power_to_meet_load_kw(p_pv_kw, load_kw, volt);
                (p_pv_kw - required).max(0.0).min(self.max_charge_kw)
            }
            HybridPolicy::TimeOfUse { charge_windows, .. } => {
                if hour_in_windows(charge_windows, self.hour_at(t)) {
                    p_pv_kw.max(0.0).min(self.max_charge_kw)
                } else {
                    0.0
                }
            }
        }
    }

    fn inverter_to_battery_kw(&self, p_pv_kw: f64, load_kw: f64, volt: f64, t: usize) -> f64 {
        match &self.policy {
            HybridPolicy::MaximiseSelfConsumption => 0.0,
            HybridPolicy::TimeOfUse { charge_windows, .. } => {
                if hour_in_windows(charge_windows, self.hour_at(t)) {
                    let room = self.max_charge_kw - self.pv_to_battery_kw(p_pv_kw, load_kw, volt, t);
                    if room > 0.0 {
                        let limit = self.charge_limit_kw(volt);
                        let available = limit * self.inv.efficiency(limit);
                        available.min(room)
                    } else {
                        0.0
                    }
                } else {
                    0.0
                }
            }
        }
    }

    /// Chooses the signed battery flow for this evaluation: positive charges
    /// the battery (from PV and, under time-of-use, from the grid), negative
    /// feeds the inverter.
    pub fn select_battery_power_kw(
        &mut self,
        p_pv_kw: f64,
        load_kw: f64,
        volt: f64,
        t: usize,
    ) -> f64 {
        self.battery_power_kw = -self.battery_to_inverter_kw(p_pv_kw, load_kw, volt, t)
            + self.pv_to_battery_kw(p_pv_kw, load_kw, volt, t)
            + self.inverter_to_battery_kw(p_pv_kw, load_kw, volt, t);
        self.battery_power_kw
    }

    /// Grid-port output for the net DC power `p_pv - p_batt`.
    ///
    /// A non-negative net DC goes through the normal PV path; a negative net
    /// DC means the battery is charging from the grid, drawing the
    /// AC-equivalent of the DC demand with no reactive output.
    pub fn output_power(&mut self, p_dc_kw: f64, volt: f64) -> (f64, f64) {
        if p_dc_kw >= 0.0 {
            self.inv.output_power(p_dc_kw, volt)
        } else {
            let p = -self.inv.ac_input_for_dc(-p_dc_kw);
            self.inv.set_output(p, 0.0);
            (p, 0.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::inverter::InverterSettings;

    fn base_inverter() -> Inverter {
        Inverter::with_defaults(6.0, InverterSettings::new()).expect("valid inverter")
    }

    fn tou() -> HybridInverter {
        let mut hybrid = HybridInverter::new(
            base_inverter(),
            HybridPolicy::TimeOfUse {
                charge_windows: vec![(10.0, 15.0)],
                discharge_windows: vec![(15.0, 21.0)],
            },
            None,
            60,
        )
        .expect("valid hybrid inverter");
        hybrid.update_battery_limits(5.0, 5.0);
        hybrid
    }

    #[test]
    fn tou_charges_from_pv_inside_window() {
        let mut hybrid = tou();
        // 12:00, 3 kW PV: all of it goes to the battery, grid tops up
        let p_batt = hybrid.select_battery_power_kw(3.0, 1.0, 1.0, 12);
        assert!(p_batt > 3.0);
        assert!(p_batt <= 5.0 + 1e-9);
    }

    #[test]
    fn tou_grid_top_up_respects_charge_room() {
        let mut hybrid = tou();
        hybrid.update_battery_limits(2.0, 5.0);
        let p_batt = hybrid.select_battery_power_kw(3.0, 0.0, 1.0, 12);
        // PV alone already fills the 2 kW charge band
        assert!((p_batt - 2.0).abs() < 1e-9);
    }

    #[test]
    fn tou_idle_outside_windows() {
        let mut hybrid = tou();
        let p_batt = hybrid.select_battery_power_kw(3.0, 1.0, 1.0, 8);
        assert_eq!(p_batt, 0.0);
    }

    #[test]
    fn tou_discharges_inside_discharge_window() {
        let mut hybrid = tou();
        let p_batt = hybrid.select_battery_power_kw(0.0, 1.0, 1.0, 18);
        assert!(p_batt < 0.0);
        assert!(p_batt >= -5.0 - 1e-9);
    }

    #[test]
    fn charging_volt_watt_backs_off_grid_charge() {
        let mut hybrid = HybridInverter::new(
            base_inverter(),
            HybridPolicy::TimeOfUse {
                charge_windows: vec![(10.0, 15.0)],
                discharge_windows: vec![(15.0, 21.0)],
            },
            Some(ControlCurve::charging_volt_watt_default()),
            60,
        )
        .expect("valid hybrid inverter");
        hybrid.update_battery_limits(5.0, 5.0);
        // At 0.90 pu the charging Volt-Watt curve allows 20% of rating
        assert!((hybrid.charge_limit_kw(0.90) - 1.2).abs() < 1e-9);
        let depressed = hybrid.select_battery_power_kw(0.0, 0.0, 0.90, 12);
        let nominal = hybrid.select_battery_power_kw(0.0, 0.0, 1.0, 12);
        assert!(depressed < nominal);
    }

    #[test]
    fn msc_charges_surplus_and_discharges_deficit() {
        let mut hybrid = HybridInverter::new(
            base_inverter(),
            HybridPolicy::MaximiseSelfConsumption,
            None,
            60,
        )
        .expect("valid hybrid inverter");
        hybrid.update_battery_limits(5.0, 5.0);

        // Surplus: 4 kW PV against 1 kW load charges the battery
        let surplus = hybrid.select_battery_power_kw(4.0, 1.0, 1.0, 12);
        assert!(surplus > 0.0);

        // Deficit: no PV against 2 kW load discharges into it
        let deficit = hybrid.select_battery_power_kw(0.0, 2.0, 1.0, 20);
        assert!(deficit < 0.0);
        // Discharge covers the DC-referred load, no more
        assert!(deficit.abs() <= 2.5);
    }

    #[test]
    fn msc_never_charges_from_grid() {
        let mut hybrid = HybridInverter::new(
            base_inverter(),
            HybridPolicy::MaximiseSelfConsumption,
            None,
            60,
        )
        .expect("valid hybrid inverter");
        hybrid.update_battery_limits(5.0, 5.0);
        // No PV, no load: nothing moves
        let idle = hybrid.select_battery_power_kw(0.0, 0.0, 1.0, 12);
        assert_eq!(idle, 0.0);
    }

    #[test]
    fn grid_charging_draws_ac_equivalent() {
        let mut hybrid = tou();
        // Net DC of -4 kW: AC draw inverts the efficiency map
        let (p, q) = hybrid.output_power(-4.0, 1.0);
        assert!(p < 0.0);
        assert!(p.abs() > 4.0); // losses make the draw exceed the DC demand
        assert_eq!(q, 0.0);
    }

    #[test]
    fn rejects_reversed_window() {
        let err = HybridInverter::new(
            base_inverter(),
            HybridPolicy::TimeOfUse {
                charge_windows: vec![(15.0, 10.0)],
                discharge_windows: vec![],
            },
            None,
            60,
        );
        assert!(err.is_err());
    }
}
