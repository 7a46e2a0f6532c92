//! EV CER wrapper: vehicle, traction battery, and charger inverter.

use crate::devices::battery::Battery;
use crate::devices::ev_inverter::EvInverter;
use crate::devices::types::CerContext;
use crate::devices::vehicle::Vehicle;

/// An electric vehicle behind a home charger.
///
/// Grid-port power is in import convention: `p_in` positive while charging,
/// negative while discharging to the grid (V2G). While the vehicle is away
/// the battery serves the wheels and the grid port is dead. The SOC advance
/// is staged during `step` and applied by [`EvSystem::commit_storage`].
#[derive(Debug, Clone)]
pub struct EvSystem {
    vehicle: Vehicle,
    battery: Battery,
    inverter: EvInverter,
    dt_hours: f64,
    volt_pu: f64,
    p_in: f64,
    q_in: f64,
}

impl EvSystem {
    pub fn new(vehicle: Vehicle, battery: Battery, inverter: EvInverter, dt_hours: f64) -> Self {
        Self {
            vehicle,
            battery,
            inverter,
            dt_hours,
            volt_pu: 1.0,
            p_in: 0.0,
            q_in: 0.0,
        }
    }

    /// Traction energy per kilometre driven (kWh/km).
    pub fn energy_per_km(&self) -> f64 {
        self.battery.capacity_kwh / self.vehicle.battery_range_km
    }

    /// Loads the terminal voltage and refreshes the battery band from the
    /// committed SOC.
    pub fn update(&mut self, ctx: &CerContext) {
        self.volt_pu = ctx.volt_pu;
        self.inverter.update_battery_limits(
            self.energy_per_km(),
            self.battery.max_charge_kw(self.dt_hours),
            self.battery.max_discharge_kw(self.dt_hours),
        );
    }

    /// Evaluates the grid-port power for timestep `t`, staging the battery
    /// SOC advance.
    pub fn step(&mut self, t: usize) -> (f64, f64) {
        let distance = self.vehicle.distance_per_step_km();
        let home = self.vehicle.at_home(t);

        let p_batt = self
            .inverter
            .select_battery_power_kw(self.volt_pu, home, distance, t);

        let p_inv_dc = if p_batt >= 0.0 {
            self.battery.stage_charge(p_batt, self.dt_hours);
            p_batt
        } else {
            self.battery.stage_discharge(-p_batt, self.dt_hours);
            if home { p_batt } else { 0.0 }
        };

        let (p, q) = self.inverter.output_power(p_inv_dc, self.volt_pu);
        self.p_in = p;
        self.q_in = q;
        (p, q)
    }

    /// Applies the staged battery SOC. Called once per timestep.
    pub fn commit_storage(&mut self) {
        self.battery.commit();
    }

    pub fn inverter(&self) -> &EvInverter {
        &self.inverter
    }

    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    pub fn vehicle(&self) -> &Vehicle {
        &self.vehicle
    }

    /// Active power drawn at the grid port (kW, import positive).
    pub fn p_in(&self) -> f64 {
        self.p_in
    }

    /// Reactive power at the grid port (kVAr).
    pub fn q_in(&self) -> f64 {
        self.q_in
    }

    pub fn volt_pu(&self) -> f64 {
        self.volt_pu
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::ev_inverter::EvChargingPolicy;
    use crate::devices::inverter::{Inverter, InverterSettings};

    fn v2g_system() -> EvSystem {
        // Home all day except a noon errand, hourly steps
        let vehicle =
            Vehicle::new(20.0, vec![(12.0, 13.0)], 350.0, 60).expect("valid vehicle");
        let battery = Battery::new(62.0, 0.5, 0.2, 0.98, 5.0).expect("valid battery");
        let inverter = Inverter::with_defaults(5.0, InverterSettings::new()).expect("inverter");
        let ev_inverter = EvInverter::new(
            inverter,
            EvChargingPolicy::V2g {
                charge_windows: vec![(9.0, 12.0)],
                discharge_windows: vec![(17.0, 21.0)],
            },
            None,
            60,
        )
        .expect("valid ev inverter");
        EvSystem::new(vehicle, battery, ev_inverter, 1.0)
    }

    #[test]
    fn charging_imports_and_raises_soc() {
        let mut ev = v2g_system();
        ev.update(&CerContext::for_ev(10, 1.0));
        let soc_before = ev.battery().soc();
        let (p, q) = ev.step(10);
        assert!(p > 0.0);
        assert_eq!(q, 0.0);
        ev.commit_storage();
        assert!(ev.battery().soc() > soc_before);
    }

    #[test]
    fn discharging_exports_and_lowers_soc() {
        let mut ev = v2g_system();
        ev.update(&CerContext::for_ev(18, 1.0));
        let soc_before = ev.battery().soc();
        let (p, _) = ev.step(18);
        assert!(p < 0.0);
        ev.commit_storage();
        assert!(ev.battery().soc() < soc_before);
    }

    #[test]
    fn away_drains_soc_without_grid_exchange() {
        let mut ev = v2g_system();
        ev.update(&CerContext::for_ev(12, 1.0));
        let soc_before = ev.battery().soc();
        let (p, q) = ev.step(12);
        assert_eq!((p, q), (0.0, 0.0));
        ev.commit_storage();
        // 20 km at 62/350 kWh/km left the battery through the wheels
        let expected_drop = 20.0 * (62.0 / 350.0) / 0.98 / 62.0;
        assert!((soc_before - ev.battery().soc() - expected_drop).abs() < 1e-9);
    }

    #[test]
    fn idle_hours_leave_soc_untouched() {
        let mut ev = v2g_system();
        ev.update(&CerContext::for_ev(3, 1.0));
        let soc_before = ev.battery().soc();
        let (p, q) = ev.step(3);
        assert_eq!((p, q), (0.0, 0.0));
        ev.commit_storage();
        assert_eq!(ev.battery().soc(), soc_before);
    }

    #[test]
    fn step_does_not_advance_soc_without_commit() {
        let mut ev = v2g_system();
        ev.update(&CerContext::for_ev(10, 1.0));
        let soc_before = ev.battery().soc();
        ev.step(10);
        ev.step(10);
        assert_eq!(ev.battery().soc(), soc_before);
    }
}
