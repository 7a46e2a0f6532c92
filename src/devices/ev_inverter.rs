//! EV charger inverter: charging policies, vehicle-to-grid discharge, and
//! wheel-load accounting.

use crate::curves::ControlCurve;
use crate::devices::inverter::Inverter;
use crate::devices::types::hour_in_windows;
use crate::error::SimError;

/// Charging policy of an EV inverter. Exactly one is active; the variant is
/// required at construction, so an EV charger can never be left without a
/// policy.
#[derive(Debug, Clone)]
pub enum EvChargingPolicy {
    /// Charge at the maximum allowed rate whenever the vehicle is home.
    Unmanaged,
    /// Charge only inside the windows, when home.
    Managed {
        /// Charging windows as `(start_hour, end_hour)` pairs.
        charge_windows: Vec<(f64, f64)>,
    },
    /// Charge inside the charge windows; discharge to the grid inside the
    /// discharge windows.
    V2g {
        /// Charging windows as `(start_hour, end_hour)` pairs.
        charge_windows: Vec<(f64, f64)>,
        /// Discharging windows as `(start_hour, end_hour)` pairs.
        discharge_windows: Vec<(f64, f64)>,
    },
}

/// An EV charger built on the base grid inverter.
///
/// Grid-port power is expressed in import convention: positive while the
/// vehicle charges, negative while it discharges to the grid. While the
/// vehicle is away the battery only serves the wheels and the grid port is
/// dead.
#[derive(Debug, Clone)]
pub struct EvInverter {
    inv: Inverter,
    charging_volt_watt: Option<ControlCurve>,
    policy: EvChargingPolicy,
    step_minutes: u32,
    energy_per_km: f64,
    max_charge_kw: f64,
    max_discharge_kw: f64,
    battery_power_kw: f64,
}

impl EvInverter {
    /// Creates an EV inverter with the given charging policy.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for reversed policy windows.
    pub fn new(
        inv: Inverter,
        policy: EvChargingPolicy,
        charging_volt_watt: Option<ControlCurve>,
        step_minutes: u32,
    ) -> Result<Self, SimError> {
        let windows_ok = |field: &str, windows: &[(f64, f64)]| -> Result<(), SimError> {
            if windows.iter().any(|&(start, end)| end <= start) {
                return Err(SimError::configuration(
                    field,
                    "windows must satisfy start < end",
                ));
            }
            Ok(())
        };
        match &policy {
            EvChargingPolicy::Unmanaged => {}
            EvChargingPolicy::Managed { charge_windows } => {
                windows_ok("ev_inverter.charge_windows", charge_windows)?;
            }
            EvChargingPolicy::V2g {
                charge_windows,
                discharge_windows,
            } => {
                windows_ok("ev_inverter.charge_windows", charge_windows)?;
                windows_ok("ev_inverter.discharge_windows", discharge_windows)?;
            }
        }
        Ok(Self {
            inv,
            charging_volt_watt,
            policy,
            step_minutes,
            energy_per_km: 0.0,
            max_charge_kw: 0.0,
            max_discharge_kw: 0.0,
            battery_power_kw: 0.0,
        })
    }

    /// The underlying grid inverter.
    pub fn inner(&self) -> &Inverter {
        &self.inv
    }

    /// Refreshes the battery band and the vehicle's energy intensity for
    /// this timestep.
    pub fn update_battery_limits(
        &mut self,
        energy_per_km: f64,
        max_charge_kw: f64,
        max_discharge_kw: f64,
    ) {
        self.energy_per_km = energy_per_km;
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

    fn dt_hours(&self) -> f64 {
        f64::from(self.step_minutes) / 60.0
    }

    fn in_charge_window(&self, t: usize) -> bool {
        match &self.policy {
            EvChargingPolicy::Unmanaged => false,
            EvChargingPolicy::Managed { charge_windows }
            | EvChargingPolicy::V2g { charge_windows, .. } => {
                hour_in_windows(charge_windows, self.hour_at(t))
            }
        }
    }

    fn in_discharge_window(&self, t: usize) -> bool {
        match &self.policy {
            EvChargingPolicy::V2g {
                discharge_windows, ..
            } => hour_in_windows(discharge_windows, self.hour_at(t)),
            _ => false,
        }
    }

    /// Grid-side charge power ceiling, backed off by the charging Volt-Watt
    /// curve when enabled.
    pub fn charge_limit_kw(&self, volt: f64) -> f64 {
        match &self.charging_volt_watt {
            Some(curve) => self.inv.rated_kva * curve.evaluate(volt),
            None => self.inv.rated_kva,
        }
    }

    fn charge_rate_kw(&self, volt: f64) -> f64 {
        let limit = self.charge_limit_kw(volt);
        (limit * self.inv.efficiency(limit)).min(self.max_charge_kw)
    }

    fn battery_to_inverter_kw(&self, volt: f64, home: bool, t: usize) -> f64 {
        if home && self.in_discharge_window(t) {
            let (max_ac, _) = self.inv.desired_output(self.max_discharge_kw, volt);
            self.inv.dc_input_for_ac(max_ac).min(self.max_discharge_kw)
        } else {
            0.0
        }
    }

    fn battery_to_wheel_kw(&self, home: bool, distance_km: f64) -> f64 {
        if home {
            0.0
        } else {
            (distance_km * self.energy_per_km / self.dt_hours()).min(self.max_discharge_kw)
        }
    }

    fn inverter_to_battery_kw(&self, volt: f64, home: bool, t: usize) -> f64 {
        if !home {
            return 0.0;
        }
        match &self.policy {
            EvChargingPolicy::Unmanaged => self.charge_rate_kw(volt),
            EvChargingPolicy::Managed { .. } | EvChargingPolicy::V2g { .. } => {
                if self.in_charge_window(t) {
                    self.charge_rate_kw(volt)
                } else {
                    0.0
                }
            }
        }
    }

    /// Chooses the signed battery flow for this evaluation: charging from
    /// the grid, discharging to the grid (V2G), or serving the wheels while
    /// away.
    pub fn select_battery_power_kw(
        &mut self,
        volt: f64,
        home: bool,
        distance_km: f64,
        t: usize,
    ) -> f64 {
        self.battery_power_kw = -self.battery_to_inverter_kw(volt, home, t)
            - self.battery_to_wheel_kw(home, distance_km)
            + self.inverter_to_battery_kw(volt, home, t);
        self.battery_power_kw
    }

    /// Grid-port power in import convention for the DC power exchanged with
    /// the battery: charging draws the AC equivalent of the DC demand with
    /// no reactive output; discharging exports through the normal inverter
    /// path with the signs flipped.
    pub fn output_power(&mut self, p_dc_kw: f64, volt: f64) -> (f64, f64) {
        if p_dc_kw >= 0.0 {
            let p = self.inv.ac_input_for_dc(p_dc_kw);
            self.inv.set_output(p, 0.0);
            (p, 0.0)
        } else {
            let (p, q) = self.inv.output_power(-p_dc_kw, volt);
            self.inv.set_output(-p, -q);
            (-p, -q)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::inverter::InverterSettings;

    fn base_inverter() -> Inverter {
        Inverter::with_defaults(5.0, InverterSettings::new()).expect("valid inverter")
    }

    fn v2g() -> EvInverter {
        let mut ev = EvInverter::new(
            base_inverter(),
            EvChargingPolicy::V2g {
                charge_windows: vec![(9.0, 15.0)],
                discharge_windows: vec![(17.0, 21.0)],
            },
            None,
            60,
        )
        .expect("valid ev inverter");
        ev.update_battery_limits(62.0 / 350.0, 5.0, 5.0);
        ev
    }

    #[test]
    fn unmanaged_charges_whenever_home() {
        let mut ev = EvInverter::new(base_inverter(), EvChargingPolicy::Unmanaged, None, 60)
            .expect("valid ev inverter");
        ev.update_battery_limits(0.2, 5.0, 5.0);
        assert!(ev.select_battery_power_kw(1.0, true, 0.0, 3) > 0.0);
        assert_eq!(ev.select_battery_power_kw(1.0, false, 0.0, 3), 0.0);
    }

    #[test]
    fn managed_charges_only_inside_window() {
        let mut ev = EvInverter::new(
            base_inverter(),
            EvChargingPolicy::Managed {
                charge_windows: vec![(10.0, 15.0)],
            },
            None,
            60,
        )
        .expect("valid ev inverter");
        ev.update_battery_limits(0.2, 5.0, 5.0);
        assert!(ev.select_battery_power_kw(1.0, true, 0.0, 12) > 0.0);
        assert_eq!(ev.select_battery_power_kw(1.0, true, 0.0, 8), 0.0);
    }

    #[test]
    fn v2g_charges_then_discharges() {
        let mut ev = v2g();
        let charging = ev.select_battery_power_kw(1.0, true, 0.0, 10);
        assert!(charging > 0.0);
        let discharging = ev.select_battery_power_kw(1.0, true, 0.0, 18);
        assert!(discharging < 0.0);
        let idle = ev.select_battery_power_kw(1.0, true, 0.0, 22);
        assert_eq!(idle, 0.0);
    }

    #[test]
    fn away_battery_serves_wheels_only() {
        let mut ev = v2g();
        // 20 km at 62/350 kWh/km over one hour
        let p_batt = ev.select_battery_power_kw(1.0, false, 20.0, 10);
        let wheel = 20.0 * 62.0 / 350.0;
        assert!((p_batt + wheel).abs() < 1e-9);
        // No grid exchange while away
        let (p, q) = ev.output_power(0.0, 1.0);
        assert_eq!((p, q), (0.0, 0.0));
    }

    #[test]
    fn wheel_load_capped_by_discharge_limit() {
        let mut ev = v2g();
        ev.update_battery_limits(1.0, 5.0, 3.0);
        let p_batt = ev.select_battery_power_kw(1.0, false, 100.0, 10);
        assert!((p_batt + 3.0).abs() < 1e-9);
    }

    #[test]
    fn charging_grid_draw_inverts_efficiency() {
        let mut ev = v2g();
        let p_batt = ev.select_battery_power_kw(1.0, true, 0.0, 10);
        let (p_in, q_in) = ev.output_power(p_batt, 1.0);
        // Import exceeds the DC charge power by the conversion losses
        assert!(p_in > p_batt);
        assert_eq!(q_in, 0.0);
    }

    #[test]
    fn discharge_exports_negative_power() {
        let mut ev = v2g();
        let p_batt = ev.select_battery_power_kw(1.0, true, 0.0, 18);
        let (p_in, q_in) = ev.output_power(p_batt, 1.0);
        assert!(p_in < 0.0);
        assert_eq!(q_in, 0.0);
    }

    #[test]
    fn rejects_reversed_discharge_window() {
        let err = EvInverter::new(
            base_inverter(),
            EvChargingPolicy::V2g {
                charge_windows: vec![(9.0, 15.0)],
                discharge_windows: vec![(21.0, 17.0)],
            },
            None,
            60,
        );
        assert!(err.is_err());
    }
}
