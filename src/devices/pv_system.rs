//! PV and hybrid PV+battery CER wrappers.

use crate::devices::battery::Battery;
use crate::devices::hybrid_inverter::HybridInverter;
use crate::devices::inverter::Inverter;
use crate::devices::pv_panel::PvPanels;
use crate::devices::types::CerContext;

/// A rooftop PV system: panels behind a grid inverter.
///
/// `update` loads the exogenous inputs, `step` evaluates the grid-port
/// output and refreshes the curtailment registers. Output convention:
/// positive exports to the grid.
#[derive(Debug, Clone)]
pub struct PvSystem {
    panels: PvPanels,
    inverter: Inverter,
    irradiance: f64,
    temperature_c: f64,
    volt_pu: f64,
    p_out: f64,
    q_out: f64,
    dc_generation: f64,
    dc_curtailment: f64,
    ac_potential: f64,
    ac_curtailment: f64,
}

impl PvSystem {
    pub fn new(panels: PvPanels, inverter: Inverter) -> Self {
        Self {
            panels,
            inverter,
            irradiance: 0.0,
            temperature_c: 25.0,
            volt_pu: 1.0,
            p_out: 0.0,
            q_out: 0.0,
            dc_generation: 0.0,
            dc_curtailment: 0.0,
            ac_potential: 0.0,
            ac_curtailment: 0.0,
        }
    }

    /// Loads exogenous inputs; no circuit side-effects.
    pub fn update(&mut self, ctx: &CerContext) {
        self.irradiance = ctx.irradiance;
        self.temperature_c = ctx.temperature_c;
        self.volt_pu = ctx.volt_pu;
    }

    /// Evaluates the grid-port output for the stored inputs.
    pub fn step(&mut self) -> (f64, f64) {
        let p_dc = self.panels.dc_power_kw(self.irradiance, self.temperature_c);
        self.dc_generation = p_dc;
        self.dc_curtailment = (p_dc - self.inverter.max_dc_input_kw()).max(0.0);
        self.ac_potential = self.inverter.potential_generation_kw(p_dc);
        let (p, q) = self.inverter.output_power(p_dc, self.volt_pu);
        self.p_out = p;
        self.q_out = q;
        self.ac_curtailment = self.ac_potential - self.p_out;
        (p, q)
    }

    pub fn inverter(&self) -> &Inverter {
        &self.inverter
    }

    /// Active power exported at the grid port (kW).
    pub fn p_out(&self) -> f64 {
        self.p_out
    }

    /// Reactive power at the grid port (kVAr, positive injects).
    pub fn q_out(&self) -> f64 {
        self.q_out
    }

    pub fn volt_pu(&self) -> f64 {
        self.volt_pu
    }

    /// DC power available from the panels this step (kW).
    pub fn dc_generation(&self) -> f64 {
        self.dc_generation
    }

    /// DC power the inverter could not accept (kW).
    pub fn dc_curtailment(&self) -> f64 {
        self.dc_curtailment
    }

    /// AC output the inverter could have produced absent voltage limits (kW).
    pub fn ac_potential_output(&self) -> f64 {
        self.ac_potential
    }

    /// AC output lost to the voltage-dependent controls (kW).
    pub fn ac_curtailment(&self) -> f64 {
        self.ac_curtailment
    }
}

/// A hybrid PV system: panels and a battery sharing one hybrid inverter.
///
/// The battery's SOC advance is staged during `step` and only applied by
/// [`HybridPvSystem::commit_storage`], which the engine calls once per
/// timestep after the convergence loop settles.
#[derive(Debug, Clone)]
pub struct HybridPvSystem {
    panels: PvPanels,
    battery: Battery,
    inverter: HybridInverter,
    dt_hours: f64,
    irradiance: f64,
    temperature_c: f64,
    volt_pu: f64,
    local_demand_kw: f64,
    p_out: f64,
    q_out: f64,
    dc_generation: f64,
    dc_curtailment: f64,
    ac_potential: f64,
    ac_curtailment: f64,
}

impl HybridPvSystem {
    pub fn new(
        panels: PvPanels,
        battery: Battery,
        inverter: HybridInverter,
        dt_hours: f64,
    ) -> Self {
        Self {
            panels,
            battery,
            inverter,
            dt_hours,
            irradiance: 0.0,
            temperature_c: 25.0,
            volt_pu: 1.0,
            local_demand_kw: 0.0,
            p_out: 0.0,
            q_out: 0.0,
            dc_generation: 0.0,
            dc_curtailment: 0.0,
            ac_potential: 0.0,
            ac_curtailment: 0.0,
        }
    }

    /// Loads exogenous inputs and refreshes the battery's admissible power
    /// band from the committed SOC.
    pub fn update(&mut self, ctx: &CerContext) {
        self.irradiance = ctx.irradiance;
        self.temperature_c = ctx.temperature_c;
        self.volt_pu = ctx.volt_pu;
        self.local_demand_kw = ctx.local_demand_kw;
        self.inverter.update_battery_limits(
            self.battery.max_charge_kw(self.dt_hours),
            self.battery.max_discharge_kw(self.dt_hours),
        );
    }

    /// Evaluates the grid-port output for the stored inputs, staging the
    /// battery SOC advance.
    pub fn step(&mut self, t: usize) -> (f64, f64) {
        let p_pv = self.panels.dc_power_kw(self.irradiance, self.temperature_c);
        self.dc_generation = p_pv;

        let p_batt = self.inverter.select_battery_power_kw(
            p_pv,
            self.local_demand_kw,
            self.volt_pu,
            t,
        );
        if p_batt >= 0.0 {
            self.battery.stage_charge(p_batt, self.dt_hours);
        } else {
            self.battery.stage_discharge(-p_batt, self.dt_hours);
        }

        let p_inv_dc = p_pv - p_batt;
        self.dc_curtailment = (p_inv_dc - self.inverter.inner().max_dc_input_kw()).max(0.0);
        let (p, q) = self.inverter.output_power(p_inv_dc, self.volt_pu);
        self.p_out = p;
        self.q_out = q;
        self.refresh_ac_curtailment(p_pv, p_batt);
        (p, q)
    }

    /// Applies the staged battery SOC. Called once per timestep.
    pub fn commit_storage(&mut self) {
        self.battery.commit();
    }

    // Potential output is referenced to the PV power net of the battery
    // exchange; a grid-charging step curtails nothing.
    fn refresh_ac_curtailment(&mut self, p_pv: f64, p_batt: f64) {
        let inner = self.inverter.inner();
        if p_pv > 0.0 {
            if p_batt > 0.0 {
                self.ac_potential = inner.potential_generation_kw((p_pv - p_batt).max(0.0));
                self.ac_curtailment = if self.ac_potential > 0.0 {
                    self.ac_potential - self.p_out
                } else {
                    0.0
                };
            } else {
                self.ac_potential = inner.potential_generation_kw(p_pv + p_batt.abs());
                self.ac_curtailment = self.ac_potential - self.p_out;
            }
        } else if p_batt > 0.0 {
            self.ac_potential = 0.0;
            self.ac_curtailment = 0.0;
        } else {
            self.ac_potential = inner.potential_generation_kw(p_batt.abs());
            self.ac_curtailment = 0.0;
        }
    }

    pub fn inverter(&self) -> &HybridInverter {
        &self.inverter
    }

    pub fn battery(&self) -> &Battery {
        &self.battery
    }

    pub fn p_out(&self) -> f64 {
        self.p_out
    }

    pub fn q_out(&self) -> f64 {
        self.q_out
    }

    pub fn volt_pu(&self) -> f64 {
        self.volt_pu
    }

    pub fn dc_generation(&self) -> f64 {
        self.dc_generation
    }

    pub fn dc_curtailment(&self) -> f64 {
        self.dc_curtailment
    }

    pub fn ac_potential_output(&self) -> f64 {
        self.ac_potential
    }

    pub fn ac_curtailment(&self) -> f64 {
        self.ac_curtailment
    }

    /// Signed battery flow chosen at the last step (kW, charging positive).
    pub fn battery_power_kw(&self) -> f64 {
        self.inverter.battery_power_kw()
    }
}
