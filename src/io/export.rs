//! CSV export of the result registers.
//!
//! Every register gets a `write_*` function targeting any `Write` plus an
//! `export_*` convenience wrapper creating the file. Output is
//! deterministic for identical inputs. The energy-flow export writes one
//! file per meter label, carrying only the columns applicable to that
//! meter's device set.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::sim::metrics::{MetricsReport, SummaryReport};
use crate::sim::results::Results;

fn write_timeseries(
    headers: &[String],
    time_labels: &[String],
    series: &[Vec<f64>],
    precision: usize,
    writer: impl Write,
) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    let mut header_row = vec!["Time".to_string()];
    header_row.extend(headers.iter().cloned());
    wtr.write_record(&header_row)?;
    let steps = series.first().map_or(0, Vec::len);
    for t in 0..steps {
        let mut row = vec![time_labels.get(t).cloned().unwrap_or_default()];
        for column in series {
            row.push(format!("{:.precision$}", column[t]));
        }
        wtr.write_record(&row)?;
    }
    wtr.flush()
}

fn export_to(path: &Path, write: impl FnOnce(BufWriter<File>) -> io::Result<()>) -> io::Result<()> {
    let file = File::create(path)?;
    write(BufWriter::new(file))
}

/// Writes per-phase end-bus voltage magnitudes (pu).
pub fn write_voltages(results: &Results, writer: impl Write) -> io::Result<()> {
    write_timeseries(
        &results.voltage_columns,
        &results.time_labels,
        &results.voltages_pu,
        6,
        writer,
    )
}

/// Exports `voltages.csv`.
pub fn export_voltages(results: &Results, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_voltages(results, w))
}

/// Writes per-phase line loading (% of rating).
pub fn write_line_currents(results: &Results, writer: impl Write) -> io::Result<()> {
    write_timeseries(
        &results.line_columns,
        &results.time_labels,
        &results.line_loading_pct,
        4,
        writer,
    )
}

/// Exports `line_currents.csv`.
pub fn export_line_currents(results: &Results, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_line_currents(results, w))
}

/// Writes per-bus voltage unbalance (VUF %).
pub fn write_voltage_unbalance(results: &Results, writer: impl Write) -> io::Result<()> {
    write_timeseries(
        &results.vuf_buses,
        &results.time_labels,
        &results.vuf_pct,
        6,
        writer,
    )
}

/// Exports `voltage_unbalance.csv`.
pub fn export_voltage_unbalance(results: &Results, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_voltage_unbalance(results, w))
}

fn curtailment_columns(results: &Results) -> Vec<String> {
    results
        .pv_keys
        .iter()
        .zip(&results.pv_phases)
        .map(|(key, phase)| format!("{key}.{phase}"))
        .collect()
}

/// Writes per-system AC curtailment (kW), columns `pv_<label>.<phase>`.
pub fn write_ac_curtailment(results: &Results, writer: impl Write) -> io::Result<()> {
    write_timeseries(
        &curtailment_columns(results),
        &results.time_labels,
        &results.ac_curtailment_kw,
        4,
        writer,
    )
}

/// Exports `ac_curtailment.csv`.
pub fn export_ac_curtailment(results: &Results, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_ac_curtailment(results, w))
}

/// Writes per-system DC curtailment (kW), columns `pv_<label>.<phase>`.
pub fn write_dc_curtailment(results: &Results, writer: impl Write) -> io::Result<()> {
    write_timeseries(
        &curtailment_columns(results),
        &results.time_labels,
        &results.dc_curtailment_kw,
        4,
        writer,
    )
}

/// Exports `dc_curtailment.csv`.
pub fn export_dc_curtailment(results: &Results, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_dc_curtailment(results, w))
}

/// Writes the one-row scenario summary.
pub fn write_summary(summary: &SummaryReport, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record([
        "PV dc-generation (kWh)",
        "Battery stored energy (kWh)",
        "EV stored energy (kWh)",
        "Potential inverter ac output (kWh)",
        "Actual inverter ac output (kWh)",
        "Total inverter to load (kWh)",
        "Total inverter to ev (kWh)",
        "Total inverter to grid (kWh)",
        "Total ev to load (kWh)",
        "Total ev to grid (kWh)",
        "Total grid to load (kWh)",
        "Total grid to ev (kWh)",
        "Total dc curtailment (kWh)",
        "Total ac curtailment (kWh)",
        "Total curtailment (kWh)",
        "Total dc curtailment (%)",
        "Total ac curtailment (%)",
        "Total curtailment (%)",
        "Fairness Index (%)",
        "Active System Losses (kWh)",
        "Reactive System Losses (kVArh)",
        "Simulation Time (Sec)",
    ])?;
    let fairness = summary
        .fairness_index_pct
        .map_or(String::new(), |f| format!("{f:.4}"));
    wtr.write_record(&[
        format!("{:.4}", summary.pv_dc_generation_kwh),
        format!("{:.4}", summary.battery_stored_kwh),
        format!("{:.4}", summary.ev_stored_kwh),
        format!("{:.4}", summary.potential_ac_output_kwh),
        format!("{:.4}", summary.actual_ac_output_kwh),
        format!("{:.4}", summary.inverter_to_load_kwh),
        format!("{:.4}", summary.inverter_to_ev_kwh),
        format!("{:.4}", summary.inverter_to_grid_kwh),
        format!("{:.4}", summary.ev_to_load_kwh),
        format!("{:.4}", summary.ev_to_grid_kwh),
        format!("{:.4}", summary.grid_to_load_kwh),
        format!("{:.4}", summary.grid_to_ev_kwh),
        format!("{:.4}", summary.dc_curtailment_kwh),
        format!("{:.4}", summary.ac_curtailment_kwh),
        format!("{:.4}", summary.total_curtailment_kwh),
        format!("{:.4}", summary.dc_curtailment_pct),
        format!("{:.4}", summary.ac_curtailment_pct),
        format!("{:.4}", summary.total_curtailment_pct),
        fairness,
        format!("{:.4}", summary.active_losses_kwh),
        format!("{:.4}", summary.reactive_losses_kvarh),
        format!("{:.4}", summary.mean_step_seconds),
    ])?;
    wtr.flush()
}

/// Exports `summary.csv`.
pub fn export_summary(summary: &SummaryReport, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_summary(summary, w))
}

/// Writes the one-row benchmark metric set.
pub fn write_metrics(metrics: &MetricsReport, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record([
        "Metric 1.a",
        "Metric 1.b",
        "Metric 2",
        "Metric 3",
        "Metric 4",
        "Metric 5.a",
        "Metric 5.b",
    ])?;
    wtr.write_record(&[
        format!("{:.4}", metrics.dc_curtailment_pct),
        format!("{:.4}", metrics.ac_curtailment_pct),
        format!("{:.4}", metrics.voltage_violation_pct),
        format!("{:.4}", metrics.line_overload_pct),
        format!("{:.4}", metrics.vuf_violation_pct),
        format!("{:.4}", metrics.active_loss_ratio_pct),
        format!("{:.4}", metrics.reactive_loss_ratio_pct),
    ])?;
    wtr.flush()
}

/// Exports `metrics.csv`.
pub fn export_metrics(metrics: &MetricsReport, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_metrics(metrics, w))
}

/// Writes the energy-flow series of one meter label.
pub fn write_energy_flows_for_label(
    results: &Results,
    label: usize,
    writer: impl Write,
) -> io::Result<()> {
    let Some(register) = results.flows_for_label(label) else {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no meter at circuit label {label}"),
        ));
    };
    let headers: Vec<String> = register
        .columns
        .iter()
        .map(|kind| kind.label().to_string())
        .collect();
    write_timeseries(&headers, &results.time_labels, &register.series, 4, writer)
}

/// Exports `energy_flows_<label>.csv` into `dir` for every meter.
pub fn export_energy_flows(results: &Results, dir: &Path) -> io::Result<()> {
    std::fs::create_dir_all(dir)?;
    for register in &results.energy_flows {
        let path = dir.join(format!("energy_flows_{}.csv", register.label));
        export_to(&path, |w| write_energy_flows_for_label(results, register.label, w))?;
    }
    Ok(())
}

/// Writes the non-fatal event log.
pub fn write_events(results: &Results, writer: impl Write) -> io::Result<()> {
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);
    wtr.write_record(["timestep", "time", "message"])?;
    for event in &results.events {
        wtr.write_record(&[
            event.timestep.to_string(),
            results
                .time_labels
                .get(event.timestep)
                .cloned()
                .unwrap_or_default(),
            event.message.clone(),
        ])?;
    }
    wtr.flush()
}

/// Exports `events.csv`.
pub fn export_events(results: &Results, path: &Path) -> io::Result<()> {
    export_to(path, |w| write_events(results, w))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::cer::{Cer, CerFleet};
    use crate::devices::load::Load;
    use crate::devices::meter::Meter;
    use crate::devices::types::CerContext;
    use crate::sim::circuit::PowerFlowSolver;
    use crate::sim::engine::TimestepOutcome;
    use crate::sim::feeder::LinearFeeder;
    use crate::sim::types::SimConfig;

    fn recorded_results(steps: usize) -> Results {
        let mut fleet = CerFleet::new(vec![Cer::Load(Load::new())], vec![1]).expect("fleet");
        let mut meter = Meter::new(1);
        meter.add_load(0);
        fleet.add_meter(meter).expect("meter wired");
        let mut circuit = LinearFeeder::radial(2, 0.1, 0.05, 100.0, &[1]).expect("feeder");
        let config = SimConfig::new(30, steps);
        let mut results = Results::new(&config, &fleet, &circuit);
        for t in 0..steps {
            fleet.cers[0].update(&CerContext::for_load(t, 1.0, 0.95, 1.0));
            fleet.cers[0].step(t);
            let (p, q) = fleet.cers[0].output();
            circuit.set_injection(1, p, q).expect("known label");
            circuit.solve().expect("solvable");
            results.record_timestep(
                &fleet,
                &circuit,
                TimestepOutcome {
                    timestep: t,
                    converged: t != 1,
                    iterations: 3,
                },
                0.002,
            );
        }
        results
    }

    #[test]
    fn voltages_header_and_row_count() {
        let results = recorded_results(4);
        let mut buf = Vec::new();
        write_voltages(&results, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        // 2 buses x 3 phases + Time
        assert_eq!(lines[0].split(',').count(), 7);
        assert!(lines[0].starts_with("Time,bus1.1,bus2.1,bus1.2"));
        assert!(lines[1].starts_with("00: 00,"));
        assert!(lines[2].starts_with("00: 30,"));
    }

    #[test]
    fn deterministic_output() {
        let results = recorded_results(3);
        let mut buf1 = Vec::new();
        let mut buf2 = Vec::new();
        write_line_currents(&results, &mut buf1).expect("write");
        write_line_currents(&results, &mut buf2).expect("write");
        assert_eq!(buf1, buf2);
    }

    #[test]
    fn energy_flow_columns_match_meter() {
        let results = recorded_results(2);
        let mut buf = Vec::new();
        write_energy_flows_for_label(&results, 1, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let header = text.lines().next().unwrap_or("");
        assert_eq!(header, "Time,Load Power (kW),Grid to Load (kW)");
    }

    #[test]
    fn unknown_label_is_an_error() {
        let results = recorded_results(2);
        let mut buf = Vec::new();
        assert!(write_energy_flows_for_label(&results, 9, &mut buf).is_err());
    }

    #[test]
    fn events_export_lists_warnings() {
        let results = recorded_results(4);
        let mut buf = Vec::new();
        write_events(&results, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("convergence error!"));
        assert!(lines[1].starts_with("1,"));
    }

    #[test]
    fn summary_round_trips_through_csv_reader() {
        let results = recorded_results(2);
        let summary = SummaryReport::from_results(&results);
        let mut buf = Vec::new();
        write_summary(&summary, &mut buf).expect("write");
        let mut rdr = csv::ReaderBuilder::new().from_reader(buf.as_slice());
        let headers = rdr.headers().cloned().expect("headers");
        assert_eq!(headers.len(), 22);
        let rows: Vec<_> = rdr.records().collect();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn metrics_header_names() {
        let results = recorded_results(2);
        let metrics = MetricsReport::from_results(&results);
        let mut buf = Vec::new();
        write_metrics(&metrics, &mut buf).expect("write");
        let text = String::from_utf8(buf).expect("utf8");
        assert!(text.starts_with("Metric 1.a,Metric 1.b,Metric 2,Metric 3,Metric 4,Metric 5.a,Metric 5.b"));
    }

    #[test]
    fn export_files_land_on_disk() {
        let results = recorded_results(2);
        let dir = tempfile::tempdir().expect("tempdir");
        export_voltages(&results, &dir.path().join("voltages.csv")).expect("export");
        export_energy_flows(&results, &dir.path().join("flows")).expect("export");
        assert!(dir.path().join("voltages.csv").exists());
        assert!(dir.path().join("flows/energy_flows_1.csv").exists());
    }
}
