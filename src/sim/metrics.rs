//! Post-hoc summary and benchmark metrics derived from the registers.

use std::fmt;

use crate::devices::meter::FlowKind;
use crate::sim::results::Results;

/// Voltage band considered acceptable (pu).
const V_MIN_PU: f64 = 0.9;
const V_MAX_PU: f64 = 1.1;
/// VUF above this is a violation (percent).
const VUF_LIMIT_PCT: f64 = 2.0;

fn series_energy_kwh(series: &[Vec<f64>], dt_hours: f64) -> f64 {
    series.iter().flatten().sum::<f64>() * dt_hours
}

fn flow_energy_kwh(results: &Results, kind: FlowKind) -> f64 {
    results
        .energy_flows
        .iter()
        .filter_map(|register| {
            let idx = register.columns.iter().position(|&k| k == kind)?;
            Some(register.series[idx].iter().sum::<f64>())
        })
        .sum::<f64>()
        * results.dt_hours
}

/// Scenario-level energy accounting, one row per run.
///
/// Computed post-hoc from [`Results`] so the exported totals always agree
/// with the step series.
#[derive(Debug, Clone)]
pub struct SummaryReport {
    /// Total PV DC generation (kWh).
    pub pv_dc_generation_kwh: f64,
    /// Hybrid battery energy held at the final timestep (kWh).
    pub battery_stored_kwh: f64,
    /// EV battery energy held at the final timestep (kWh).
    pub ev_stored_kwh: f64,
    /// Potential inverter AC output (kWh).
    pub potential_ac_output_kwh: f64,
    /// Actual inverter AC output (kWh).
    pub actual_ac_output_kwh: f64,
    /// Directed flow totals (kWh).
    pub inverter_to_load_kwh: f64,
    pub inverter_to_ev_kwh: f64,
    pub inverter_to_grid_kwh: f64,
    pub ev_to_load_kwh: f64,
    pub ev_to_grid_kwh: f64,
    pub grid_to_load_kwh: f64,
    pub grid_to_ev_kwh: f64,
    /// Curtailment totals (kWh) and shares (percent).
    pub dc_curtailment_kwh: f64,
    pub ac_curtailment_kwh: f64,
    pub total_curtailment_kwh: f64,
    pub dc_curtailment_pct: f64,
    pub ac_curtailment_pct: f64,
    pub total_curtailment_pct: f64,
    /// Fairness of curtailment across PV systems (percent); `None` without
    /// any producing PV.
    pub fairness_index_pct: Option<f64>,
    /// System losses over the run.
    pub active_losses_kwh: f64,
    pub reactive_losses_kvarh: f64,
    /// Mean wall-clock seconds per timestep.
    pub mean_step_seconds: f64,
}

impl SummaryReport {
    /// Computes the summary from a complete run.
    pub fn from_results(results: &Results) -> Self {
        let dt = results.dt_hours;
        let dc_generation = series_energy_kwh(&results.dc_generation_kw, dt);
        let potential = series_energy_kwh(&results.ac_potential_kw, dt);
        let dc_curtailment = series_energy_kwh(&results.dc_curtailment_kw, dt);
        let ac_curtailment = series_energy_kwh(&results.ac_curtailment_kw, dt);
        let total_curtailment = dc_curtailment + ac_curtailment;

        let pct = |part: f64, whole: f64| if whole > 0.0 { 100.0 * part / whole } else { 0.0 };

        let steps = results.recorded_steps();
        let mean_step_seconds = if steps > 0 {
            results.step_seconds.iter().sum::<f64>() / steps as f64
        } else {
            0.0
        };

        Self {
            pv_dc_generation_kwh: dc_generation,
            battery_stored_kwh: results
                .battery_stored_kwh
                .iter()
                .filter_map(|series| series.last())
                .sum(),
            ev_stored_kwh: results
                .ev_stored_kwh
                .iter()
                .filter_map(|series| series.last())
                .sum(),
            potential_ac_output_kwh: potential,
            actual_ac_output_kwh: flow_energy_kwh(results, FlowKind::InverterPower),
            inverter_to_load_kwh: flow_energy_kwh(results, FlowKind::InverterToLoad),
            inverter_to_ev_kwh: flow_energy_kwh(results, FlowKind::InverterToEv),
            inverter_to_grid_kwh: flow_energy_kwh(results, FlowKind::InverterToGrid),
            ev_to_load_kwh: flow_energy_kwh(results, FlowKind::EvToLoad),
            ev_to_grid_kwh: flow_energy_kwh(results, FlowKind::EvToGrid),
            grid_to_load_kwh: flow_energy_kwh(results, FlowKind::GridToLoad),
            grid_to_ev_kwh: flow_energy_kwh(results, FlowKind::GridToEv),
            dc_curtailment_kwh: dc_curtailment,
            ac_curtailment_kwh: ac_curtailment,
            total_curtailment_kwh: total_curtailment,
            dc_curtailment_pct: pct(dc_curtailment, dc_generation),
            ac_curtailment_pct: pct(ac_curtailment, potential),
            total_curtailment_pct: pct(total_curtailment, dc_generation),
            fairness_index_pct: fairness_index(results).map(|f| f * 100.0),
            active_losses_kwh: results.active_losses_kw.iter().sum::<f64>() * dt,
            reactive_losses_kvarh: results.reactive_losses_kvar.iter().sum::<f64>() * dt,
            mean_step_seconds,
        }
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Scenario Summary ---")?;
        writeln!(f, "PV dc-generation:       {:.2} kWh", self.pv_dc_generation_kwh)?;
        writeln!(f, "Potential AC output:    {:.2} kWh", self.potential_ac_output_kwh)?;
        writeln!(f, "Actual AC output:       {:.2} kWh", self.actual_ac_output_kwh)?;
        writeln!(
            f,
            "Curtailment:            {:.2} kWh dc / {:.2} kWh ac ({:.1}% total)",
            self.dc_curtailment_kwh, self.ac_curtailment_kwh, self.total_curtailment_pct
        )?;
        match self.fairness_index_pct {
            Some(fairness) => writeln!(f, "Fairness index:         {fairness:.1}%")?,
            None => writeln!(f, "Fairness index:         n/a")?,
        }
        writeln!(f, "Active losses:          {:.3} kWh", self.active_losses_kwh)?;
        write!(f, "Mean step time:         {:.4} s", self.mean_step_seconds)
    }
}

/// Fairness of inverter utilisation across PV systems:
/// `1 - std(ratios) / 0.5`, where each ratio is actual over potential
/// output. `None` when no PV system produced anything.
pub fn fairness_index(results: &Results) -> Option<f64> {
    let mut ratios = Vec::new();
    for (slot, potential) in results.ac_potential_kw.iter().enumerate() {
        let potential_sum: f64 = potential.iter().sum();
        if potential_sum > 0.0 {
            let actual: f64 = results.pv_active_kw[slot].iter().sum();
            ratios.push(actual / potential_sum);
        }
    }
    if ratios.is_empty() {
        return None;
    }
    let mean = ratios.iter().sum::<f64>() / ratios.len() as f64;
    let variance =
        ratios.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / ratios.len() as f64;
    Some(1.0 - variance.sqrt() / 0.5)
}

/// The benchmark metric set.
#[derive(Debug, Clone)]
pub struct MetricsReport {
    /// Metric 1.a: DC curtailment share of DC generation (percent).
    pub dc_curtailment_pct: f64,
    /// Metric 1.b: AC curtailment share of potential output (percent).
    pub ac_curtailment_pct: f64,
    /// Metric 2: node-steps outside the voltage band (percent).
    pub voltage_violation_pct: f64,
    /// Metric 3: line-steps above rated current (percent).
    pub line_overload_pct: f64,
    /// Metric 4: bus-steps above the VUF limit (percent).
    pub vuf_violation_pct: f64,
    /// Metric 5.a: active losses over supplied active energy (percent).
    pub active_loss_ratio_pct: f64,
    /// Metric 5.b: reactive losses over supplied reactive energy (percent).
    pub reactive_loss_ratio_pct: f64,
}

impl MetricsReport {
    /// Computes the metric set from a complete run.
    pub fn from_results(results: &Results) -> Self {
        let steps = results.recorded_steps();

        let violation_share = |series: &[Vec<f64>], violates: &dyn Fn(f64) -> bool| -> f64 {
            let columns = series.len();
            if steps == 0 || columns == 0 {
                return 0.0;
            }
            let count: usize = series
                .iter()
                .flatten()
                .filter(|&&value| violates(value))
                .count();
            100.0 * count as f64 / (steps * columns) as f64
        };

        let dc_generation: f64 = results.dc_generation_kw.iter().flatten().sum();
        let dc_curtailment: f64 = results.dc_curtailment_kw.iter().flatten().sum();
        let potential: f64 = results.ac_potential_kw.iter().flatten().sum();
        let ac_curtailment: f64 = results.ac_curtailment_kw.iter().flatten().sum();

        let loss_ratio = |losses: &[f64], supplied: &[f64]| -> f64 {
            let supplied_abs: f64 = supplied.iter().map(|p| p.abs()).sum();
            if supplied_abs > 0.0 {
                100.0 * losses.iter().sum::<f64>() / supplied_abs
            } else {
                0.0
            }
        };

        Self {
            dc_curtailment_pct: if dc_generation > 0.0 {
                100.0 * dc_curtailment / dc_generation
            } else {
                0.0
            },
            ac_curtailment_pct: if potential > 0.0 {
                100.0 * ac_curtailment / potential
            } else {
                0.0
            },
            voltage_violation_pct: violation_share(&results.voltages_pu, &|v| {
                v > V_MAX_PU || v < V_MIN_PU
            }),
            line_overload_pct: violation_share(&results.line_loading_pct, &|loading| {
                loading > 100.0
            }),
            vuf_violation_pct: violation_share(&results.vuf_pct, &|vuf| vuf > VUF_LIMIT_PCT),
            active_loss_ratio_pct: loss_ratio(&results.active_losses_kw, &results.total_active_kw),
            reactive_loss_ratio_pct: loss_ratio(
                &results.reactive_losses_kvar,
                &results.total_reactive_kvar,
            ),
        }
    }
}

impl fmt::Display for MetricsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Metrics ---")?;
        writeln!(f, "Metric 1.a (dc curtailment):  {:.2}%", self.dc_curtailment_pct)?;
        writeln!(f, "Metric 1.b (ac curtailment):  {:.2}%", self.ac_curtailment_pct)?;
        writeln!(f, "Metric 2 (voltage range):     {:.2}%", self.voltage_violation_pct)?;
        writeln!(f, "Metric 3 (line overload):     {:.2}%", self.line_overload_pct)?;
        writeln!(f, "Metric 4 (voltage unbalance): {:.2}%", self.vuf_violation_pct)?;
        writeln!(f, "Metric 5.a (active losses):   {:.2}%", self.active_loss_ratio_pct)?;
        write!(f, "Metric 5.b (reactive losses): {:.2}%", self.reactive_loss_ratio_pct)
    }
}
