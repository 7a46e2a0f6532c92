//! TOML-based scenario configuration.
//!
//! All tables and fields have defaults matching the reference parameter
//! set, so a scenario file only states what it changes. Validation returns
//! every violation with a dotted field path rather than stopping at the
//! first.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::curves::ControlCurve;
use crate::devices::battery::Battery;
use crate::devices::cer::{Cer, CerFleet, CircuitLabel};
use crate::devices::ev_inverter::{EvChargingPolicy, EvInverter};
use crate::devices::ev_system::EvSystem;
use crate::devices::hybrid_inverter::{HybridInverter, HybridPolicy};
use crate::devices::inverter::{Inverter, InverterSettings, OutputPriority};
use crate::devices::load::Load;
use crate::devices::meter::Meter;
use crate::devices::pv_panel::PvPanels;
use crate::devices::pv_system::{HybridPvSystem, PvSystem};
use crate::devices::vehicle::Vehicle;
use crate::error::SimError;
use crate::input::ModelInputs;
use crate::sim::engine::{EngineSettings, RelaxationGains};
use crate::sim::types::SimConfig;

/// Piecewise-linear curve override in a scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurveConfig {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl CurveConfig {
    fn build(&self) -> Result<ControlCurve, SimError> {
        ControlCurve::new(self.x.clone(), self.y.clone())
    }
}

/// Simulation timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Timestep duration in minutes.
    pub step_minutes: u32,
    /// Number of timesteps to simulate.
    pub steps: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_minutes: 30,
            steps: 48,
        }
    }
}

/// Convergence engine tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub v_tolerance_pu: f64,
    pub p_tolerance_kw: f64,
    pub q_tolerance_kvar: f64,
    pub max_iterations: usize,
    /// Relaxation coefficients for P: decrease high/low, increase low/high.
    pub p_gains: [f64; 4],
    /// Relaxation coefficients for Q: decrease high/low, increase low/high.
    pub q_gains: [f64; 4],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            v_tolerance_pu: 1e-5,
            p_tolerance_kw: 6e-4,
            q_tolerance_kvar: 6e-4,
            max_iterations: 300,
            p_gains: [0.10, 0.05, 0.10, 0.05],
            q_gains: [0.10, 0.05, 0.10, 0.05],
        }
    }
}

/// Stationary (hybrid) battery parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BatteryConfig {
    pub capacity_kwh: f64,
    pub initial_soc: f64,
    pub min_soc: f64,
    pub charger_eff: f64,
    pub charger_kw: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 13.5,
            initial_soc: 0.1,
            min_soc: 0.1,
            charger_eff: 0.98,
            charger_kw: 5.0,
        }
    }
}

impl BatteryConfig {
    fn build(&self) -> Result<Battery, SimError> {
        Battery::new(
            self.capacity_kwh,
            self.initial_soc,
            self.min_soc,
            self.charger_eff,
            self.charger_kw,
        )
    }
}

/// EV traction battery parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvBatteryConfig {
    pub capacity_kwh: f64,
    pub initial_soc: f64,
    pub min_soc: f64,
    pub charger_eff: f64,
    pub charger_kw: f64,
}

impl Default for EvBatteryConfig {
    fn default() -> Self {
        Self {
            capacity_kwh: 62.0,
            initial_soc: 0.5,
            min_soc: 0.2,
            charger_eff: 0.98,
            charger_kw: 5.0,
        }
    }
}

impl EvBatteryConfig {
    fn build(&self) -> Result<Battery, SimError> {
        Battery::new(
            self.capacity_kwh,
            self.initial_soc,
            self.min_soc,
            self.charger_eff,
            self.charger_kw,
        )
    }
}

/// Grid inverter parameters and control modes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InverterConfig {
    pub rated_kva: f64,
    /// Cut-in threshold in percent of rated kVA.
    pub cut_in: f64,
    /// Cut-out threshold in percent of rated kVA.
    pub cut_out: f64,
    pub night_mode: bool,
    /// `"watt"`, `"var"` or `"pf"`.
    pub output_priority: String,
    /// Enable Volt-Watt with the default (or overridden) curve.
    pub volt_watt: bool,
    /// Enable Volt-VAr with the default (or overridden) curve.
    pub volt_var: bool,
    /// Static export limit as a fraction of rated kVA in (0, 1].
    pub export_limit: Option<f64>,
    /// Constant power factor in (0, 1].
    pub power_factor: Option<f64>,
    pub volt_watt_curve: Option<CurveConfig>,
    pub volt_var_curve: Option<CurveConfig>,
    pub efficiency_curve: Option<CurveConfig>,
}

impl Default for InverterConfig {
    fn default() -> Self {
        Self {
            rated_kva: 6.0,
            cut_in: 0.1,
            cut_out: 0.1,
            night_mode: true,
            output_priority: "watt".to_string(),
            volt_watt: false,
            volt_var: false,
            export_limit: None,
            power_factor: None,
            volt_watt_curve: None,
            volt_var_curve: None,
            efficiency_curve: None,
        }
    }
}

impl InverterConfig {
    fn settings(&self) -> Result<InverterSettings, SimError> {
        let mut settings = InverterSettings::new();
        if self.volt_watt {
            let curve = match &self.volt_watt_curve {
                Some(config) => config.build()?,
                None => ControlCurve::volt_watt_default(),
            };
            settings.enable_volt_watt(curve);
        }
        if self.volt_var {
            let curve = match &self.volt_var_curve {
                Some(config) => config.build()?,
                None => ControlCurve::volt_var_default(),
            };
            settings.enable_volt_var(curve);
        }
        if let Some(fraction) = self.export_limit {
            settings.enable_export_limit(fraction)?;
        }
        if let Some(pf) = self.power_factor {
            settings.enable_power_factor(pf)?;
        }
        if !self.night_mode {
            settings.disable_night_mode();
        }
        settings.output_priority = match self.output_priority.to_lowercase().as_str() {
            "var" => OutputPriority::Var,
            "pf" => OutputPriority::PowerFactor,
            _ => OutputPriority::Watt,
        };
        Ok(settings)
    }

    fn build(&self) -> Result<Inverter, SimError> {
        let eff_curve = match &self.efficiency_curve {
            Some(config) => config.build()?,
            None => ControlCurve::efficiency_default(),
        };
        Inverter::new(
            self.rated_kva,
            eff_curve,
            self.cut_in,
            self.cut_out,
            self.settings()?,
        )
    }
}

/// PV panel array parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PvPanelConfig {
    pub pmpp_kw: f64,
    pub derating_curve: Option<CurveConfig>,
}

impl Default for PvPanelConfig {
    fn default() -> Self {
        Self {
            pmpp_kw: 7.2,
            derating_curve: None,
        }
    }
}

impl PvPanelConfig {
    fn build(&self) -> Result<PvPanels, SimError> {
        let curve = match &self.derating_curve {
            Some(config) => config.build()?,
            None => ControlCurve::temperature_derating_default(),
        };
        PvPanels::new(self.pmpp_kw, curve)
    }
}

/// Vehicle parameters; driving intervals come from the EV behaviour table.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VehicleConfig {
    pub battery_range_km: f64,
    pub daily_distance_km: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            battery_range_km: 350.0,
            daily_distance_km: 30.0,
        }
    }
}

/// Hybrid system scheduling.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HybridConfig {
    /// `"self_consumption"` or `"time_of_use"`.
    pub policy: String,
    pub charge_window: (f64, f64),
    pub discharge_window: (f64, f64),
    pub charging_volt_watt: bool,
    pub charging_volt_watt_curve: Option<CurveConfig>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            policy: "self_consumption".to_string(),
            charge_window: (10.0, 15.0),
            discharge_window: (15.0, 21.0),
            charging_volt_watt: false,
            charging_volt_watt_curve: None,
        }
    }
}

/// EV charging policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvChargingConfig {
    /// `"unmanaged"`, `"managed"` or `"v2g"`.
    pub policy: String,
    pub charge_window: (f64, f64),
    pub discharge_window: (f64, f64),
    pub charging_volt_watt: bool,
    pub charging_volt_watt_curve: Option<CurveConfig>,
}

impl Default for EvChargingConfig {
    fn default() -> Self {
        Self {
            policy: "unmanaged".to_string(),
            charge_window: (10.0, 15.0),
            discharge_window: (15.0, 21.0),
            charging_volt_watt: false,
            charging_volt_watt_curve: None,
        }
    }
}

/// Which circuit labels host which CER kinds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacementConfig {
    pub load_labels: Vec<CircuitLabel>,
    pub pv_labels: Vec<CircuitLabel>,
    pub hybrid_labels: Vec<CircuitLabel>,
    pub ev_labels: Vec<CircuitLabel>,
}

/// Top-level scenario configuration parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioConfig {
    pub simulation: SimulationConfig,
    pub engine: EngineConfig,
    pub battery: BatteryConfig,
    pub ev_battery: EvBatteryConfig,
    pub inverter: InverterConfig,
    pub pv_panel: PvPanelConfig,
    pub vehicle: VehicleConfig,
    pub hybrid: HybridConfig,
    pub ev_charging: EvChargingConfig,
    pub fleet: PlacementConfig,
}

impl ScenarioConfig {
    /// Available preset names.
    pub const PRESETS: &[&str] = &["load_only", "pv_volt_watt", "hybrid_time_of_use", "ev_v2g"];

    /// A feeder of passive loads only.
    pub fn load_only(labels: &[CircuitLabel]) -> Self {
        Self {
            fleet: PlacementConfig {
                load_labels: labels.to_vec(),
                ..PlacementConfig::default()
            },
            ..Self::default()
        }
    }

    /// Every label carries a load and a Volt-Watt/Volt-VAr PV system.
    pub fn pv_volt_watt(labels: &[CircuitLabel]) -> Self {
        Self {
            inverter: InverterConfig {
                volt_watt: true,
                volt_var: true,
                ..InverterConfig::default()
            },
            fleet: PlacementConfig {
                load_labels: labels.to_vec(),
                pv_labels: labels.to_vec(),
                ..PlacementConfig::default()
            },
            ..Self::default()
        }
    }

    /// Every label carries a load and a time-of-use hybrid PV+battery.
    pub fn hybrid_time_of_use(labels: &[CircuitLabel]) -> Self {
        Self {
            inverter: InverterConfig {
                volt_watt: true,
                volt_var: true,
                ..InverterConfig::default()
            },
            hybrid: HybridConfig {
                policy: "time_of_use".to_string(),
                charging_volt_watt: true,
                ..HybridConfig::default()
            },
            fleet: PlacementConfig {
                load_labels: labels.to_vec(),
                hybrid_labels: labels.to_vec(),
                ..PlacementConfig::default()
            },
            ..Self::default()
        }
    }

    /// Every label carries a load and a V2G EV charger.
    pub fn ev_v2g(labels: &[CircuitLabel]) -> Self {
        Self {
            ev_charging: EvChargingConfig {
                policy: "v2g".to_string(),
                charge_window: (9.0, 15.0),
                discharge_window: (17.0, 21.0),
                ..EvChargingConfig::default()
            },
            fleet: PlacementConfig {
                load_labels: labels.to_vec(),
                ev_labels: labels.to_vec(),
                ..PlacementConfig::default()
            },
            ..Self::default()
        }
    }

    /// Loads a preset by name with the given labels.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unknown preset name.
    pub fn from_preset(name: &str, labels: &[CircuitLabel]) -> Result<Self, SimError> {
        match name {
            "load_only" => Ok(Self::load_only(labels)),
            "pv_volt_watt" => Ok(Self::pv_volt_watt(labels)),
            "hybrid_time_of_use" => Ok(Self::hybrid_time_of_use(labels)),
            "ev_v2g" => Ok(Self::ev_v2g(labels)),
            _ => Err(SimError::configuration(
                "preset",
                format!("unknown preset \"{name}\", available: {}", Self::PRESETS.join(", ")),
            )),
        }
    }

    /// Parses a scenario from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid TOML or unknown fields.
    pub fn from_toml_str(s: &str) -> Result<Self, SimError> {
        toml::from_str(s).map_err(|e| SimError::configuration("toml", e.to_string()))
    }

    /// Parses a scenario from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or parsed.
    pub fn from_toml_file(path: &Path) -> Result<Self, SimError> {
        let content = fs::read_to_string(path).map_err(|e| {
            SimError::configuration("scenario", format!("cannot read \"{}\": {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Validates all fields, returning every violation.
    pub fn validate(&self) -> Vec<SimError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(SimError::configuration(field, message));
            }
        };

        check(self.simulation.step_minutes > 0, "simulation.step_minutes", "must be > 0");
        check(self.simulation.steps > 0, "simulation.steps", "must be > 0");

        check(self.engine.max_iterations > 0, "engine.max_iterations", "must be > 0");
        check(self.engine.v_tolerance_pu > 0.0, "engine.v_tolerance_pu", "must be > 0");
        check(self.engine.p_tolerance_kw > 0.0, "engine.p_tolerance_kw", "must be > 0");
        check(self.engine.q_tolerance_kvar > 0.0, "engine.q_tolerance_kvar", "must be > 0");

        check(self.battery.capacity_kwh > 0.0, "battery.capacity_kwh", "must be > 0");
        check(
            (0.0..=1.0).contains(&self.battery.min_soc),
            "battery.min_soc",
            "must be in [0, 1]",
        );
        check(
            self.battery.charger_eff > 0.0 && self.battery.charger_eff <= 1.0,
            "battery.charger_eff",
            "must be in (0, 1]",
        );
        check(self.ev_battery.capacity_kwh > 0.0, "ev_battery.capacity_kwh", "must be > 0");

        check(self.inverter.rated_kva > 0.0, "inverter.rated_kva", "must be > 0");
        check(
            self.inverter.cut_in >= self.inverter.cut_out,
            "inverter.cut_in",
            "must be >= inverter.cut_out",
        );
        if let Some(fraction) = self.inverter.export_limit {
            check(
                fraction > 0.0 && fraction <= 1.0,
                "inverter.export_limit",
                "must be a fraction of rated kVA in (0, 1]",
            );
        }
        check(
            ["watt", "var", "pf"].contains(&self.inverter.output_priority.to_lowercase().as_str()),
            "inverter.output_priority",
            "must be \"watt\", \"var\" or \"pf\"",
        );

        check(self.pv_panel.pmpp_kw >= 0.0, "pv_panel.pmpp_kw", "must be >= 0");
        check(self.vehicle.battery_range_km > 0.0, "vehicle.battery_range_km", "must be > 0");

        check(
            ["self_consumption", "time_of_use"].contains(&self.hybrid.policy.as_str()),
            "hybrid.policy",
            "must be \"self_consumption\" or \"time_of_use\"",
        );
        check(
            self.hybrid.charge_window.0 < self.hybrid.charge_window.1,
            "hybrid.charge_window",
            "must satisfy start < end",
        );
        check(
            ["unmanaged", "managed", "v2g"].contains(&self.ev_charging.policy.as_str()),
            "ev_charging.policy",
            "must be \"unmanaged\", \"managed\" or \"v2g\"",
        );
        check(
            self.ev_charging.charge_window.0 < self.ev_charging.charge_window.1,
            "ev_charging.charge_window",
            "must satisfy start < end",
        );

        errors
    }

    /// Simulation timing for this configuration.
    pub fn sim_config(&self) -> SimConfig {
        SimConfig::new(self.simulation.step_minutes, self.simulation.steps)
    }

    /// Engine settings for this configuration.
    pub fn engine_settings(&self) -> EngineSettings {
        let gains = |g: [f64; 4]| RelaxationGains {
            decr_high: g[0],
            decr_low: g[1],
            incr_low: g[2],
            incr_high: g[3],
        };
        EngineSettings {
            v_tolerance_pu: self.engine.v_tolerance_pu,
            p_tolerance_kw: self.engine.p_tolerance_kw,
            q_tolerance_kvar: self.engine.q_tolerance_kvar,
            max_iterations: self.engine.max_iterations,
            p_gains: gains(self.engine.p_gains),
            q_gains: gains(self.engine.q_gains),
        }
    }

    fn charging_volt_watt(
        enabled: bool,
        curve: &Option<CurveConfig>,
    ) -> Result<Option<ControlCurve>, SimError> {
        if !enabled {
            return Ok(None);
        }
        Ok(Some(match curve {
            Some(config) => config.build()?,
            None => ControlCurve::charging_volt_watt_default(),
        }))
    }

    fn hybrid_policy(&self) -> HybridPolicy {
        if self.hybrid.policy == "time_of_use" {
            HybridPolicy::TimeOfUse {
                charge_windows: vec![self.hybrid.charge_window],
                discharge_windows: vec![self.hybrid.discharge_window],
            }
        } else {
            HybridPolicy::MaximiseSelfConsumption
        }
    }

    fn ev_policy(&self) -> EvChargingPolicy {
        match self.ev_charging.policy.as_str() {
            "managed" => EvChargingPolicy::Managed {
                charge_windows: vec![self.ev_charging.charge_window],
            },
            "v2g" => EvChargingPolicy::V2g {
                charge_windows: vec![self.ev_charging.charge_window],
                discharge_windows: vec![self.ev_charging.discharge_window],
            },
            _ => EvChargingPolicy::Unmanaged,
        }
    }

    /// Builds the CER fleet with one meter per occupied label, in engine
    /// iteration order: loads, PV, hybrids, EVs.
    ///
    /// EV labels take their driving behaviour from `inputs.ev_behaviour`;
    /// a missing entry falls back to the configured daily distance with a
    /// default commuter window.
    ///
    /// # Errors
    ///
    /// Returns the first device construction error.
    pub fn build_fleet(&self, inputs: &ModelInputs) -> Result<CerFleet, SimError> {
        let step_minutes = self.simulation.step_minutes;
        let dt_hours = f64::from(step_minutes) / 60.0;
        let mut cers = Vec::new();
        let mut labels = Vec::new();

        for &label in &self.fleet.load_labels {
            cers.push(Cer::Load(Load::new()));
            labels.push(label);
        }
        for &label in &self.fleet.pv_labels {
            let system = PvSystem::new(self.pv_panel.build()?, self.inverter.build()?);
            cers.push(Cer::Pv(system));
            labels.push(label);
        }
        for &label in &self.fleet.hybrid_labels {
            let inverter = HybridInverter::new(
                self.inverter.build()?,
                self.hybrid_policy(),
                Self::charging_volt_watt(
                    self.hybrid.charging_volt_watt,
                    &self.hybrid.charging_volt_watt_curve,
                )?,
                step_minutes,
            )?;
            let system = HybridPvSystem::new(
                self.pv_panel.build()?,
                self.battery.build()?,
                inverter,
                dt_hours,
            );
            cers.push(Cer::HybridPv(system));
            labels.push(label);
        }
        for &label in &self.fleet.ev_labels {
            let (distance, intervals) = match inputs.ev_behaviour.get(&label) {
                Some(behaviour) => (
                    behaviour.daily_distance_km,
                    behaviour.driving_intervals.clone(),
                ),
                None => (self.vehicle.daily_distance_km, vec![(8.0, 9.0), (16.0, 17.0)]),
            };
            let vehicle = Vehicle::new(
                distance,
                intervals,
                self.vehicle.battery_range_km,
                step_minutes,
            )?;
            let inverter = EvInverter::new(
                self.inverter.build()?,
                self.ev_policy(),
                Self::charging_volt_watt(
                    self.ev_charging.charging_volt_watt,
                    &self.ev_charging.charging_volt_watt_curve,
                )?,
                step_minutes,
            )?;
            let system = EvSystem::new(vehicle, self.ev_battery.build()?, inverter, dt_hours);
            cers.push(Cer::Ev(system));
            labels.push(label);
        }

        let mut fleet = CerFleet::new(cers, labels)?;

        // One meter per occupied label, wiring together whatever CER kinds
        // share the coupling point
        let mut occupied: Vec<CircuitLabel> = fleet.labels.clone();
        occupied.sort_unstable();
        occupied.dedup();
        for label in occupied {
            let mut meter = Meter::new(label);
            for (i, cer) in fleet.cers.iter().enumerate() {
                if fleet.labels[i] != label {
                    continue;
                }
                match cer {
                    Cer::Load(_) => meter.add_load(i),
                    Cer::Pv(_) | Cer::HybridPv(_) => meter.add_inverter(i),
                    Cer::Ev(_) => meter.add_ev(i),
                }
            }
            fleet.add_meter(meter)?;
        }
        Ok(fleet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_empty());
    }

    #[test]
    fn all_presets_are_valid() {
        for name in ScenarioConfig::PRESETS {
            let config = ScenarioConfig::from_preset(name, &[1, 2]).expect("preset loads");
            assert!(config.validate().is_empty(), "preset {name} should be valid");
        }
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!(ScenarioConfig::from_preset("bogus", &[1]).is_err());
    }

    #[test]
    fn toml_overrides_defaults() {
        let toml = r#"
[simulation]
step_minutes = 60
steps = 24

[inverter]
rated_kva = 5.0
volt_watt = true

[fleet]
load_labels = [1, 2]
pv_labels = [2]
"#;
        let config = ScenarioConfig::from_toml_str(toml).expect("valid toml");
        assert_eq!(config.simulation.step_minutes, 60);
        assert_eq!(config.inverter.rated_kva, 5.0);
        assert!(config.inverter.volt_watt);
        // Untouched tables keep their defaults
        assert_eq!(config.battery.capacity_kwh, 13.5);
        assert_eq!(config.vehicle.battery_range_km, 350.0);
    }

    #[test]
    fn unknown_field_is_rejected() {
        let toml = r#"
[simulation]
bogus_field = 1
"#;
        assert!(ScenarioConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn validation_collects_multiple_errors() {
        let mut config = ScenarioConfig::default();
        config.simulation.steps = 0;
        config.battery.charger_eff = 1.5;
        config.hybrid.policy = "bogus".to_string();
        let errors = config.validate();
        assert!(errors.len() >= 3);
    }

    #[test]
    fn validation_flags_export_limit_fraction() {
        let mut config = ScenarioConfig::default();
        config.inverter.export_limit = Some(5.0);
        let errors = config.validate();
        assert!(
            errors
                .iter()
                .any(|e| e.to_string().contains("inverter.export_limit"))
        );
    }

    #[test]
    fn build_fleet_wires_meters_per_label() {
        let config = ScenarioConfig::pv_volt_watt(&[1, 2]);
        let inputs = ModelInputs::new();
        let fleet = config.build_fleet(&inputs).expect("fleet builds");
        assert_eq!(fleet.len(), 4);
        assert_eq!(fleet.meters.len(), 2);
        assert!(fleet.meters.iter().all(Meter::has_loads));
        assert!(fleet.meters.iter().all(Meter::has_inverters));
    }

    #[test]
    fn build_fleet_orders_loads_before_generators() {
        let config = ScenarioConfig::hybrid_time_of_use(&[3]);
        let fleet = config.build_fleet(&ModelInputs::new()).expect("fleet builds");
        assert_eq!(fleet.cers[0].kind(), "load");
        assert_eq!(fleet.cers[1].kind(), "hybridpv");
    }

    #[test]
    fn ev_behaviour_feeds_vehicle_construction() {
        use crate::input::EvBehaviour;
        let config = ScenarioConfig::ev_v2g(&[4]);
        let mut inputs = ModelInputs::new();
        inputs.ev_behaviour.insert(
            4,
            EvBehaviour {
                daily_distance_km: 45.0,
                driving_intervals: vec![(7.5, 8.5)],
            },
        );
        let fleet = config.build_fleet(&inputs).expect("fleet builds");
        match &fleet.cers[1] {
            Cer::Ev(ev) => {
                assert_eq!(ev.vehicle().daily_distance_km, 45.0);
                assert_eq!(ev.vehicle().driving_intervals, vec![(7.5, 8.5)]);
            }
            other => panic!("expected an EV, got {}", other.kind()),
        }
    }
}
