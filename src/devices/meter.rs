//! Meter behind a common coupling point: aggregation and directed
//! energy-flow decomposition.

use crate::devices::cer::{Cer, CircuitLabel};

/// Directed flow and aggregate categories a meter can report.
///
/// The labels match the exported column headers; which categories apply to
/// a given meter depends on the devices behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    LoadPower,
    InverterPower,
    EvPower,
    InverterToLoad,
    InverterToGrid,
    InverterToEv,
    BatteryPower,
    GridToLoad,
    GridToEv,
    EvToLoad,
    EvToGrid,
}

impl FlowKind {
    /// Exported column header for this category.
    pub fn label(&self) -> &'static str {
        match self {
            FlowKind::LoadPower => "Load Power (kW)",
            FlowKind::InverterPower => "Inverter Power (kW)",
            FlowKind::EvPower => "EV Power (kW)",
            FlowKind::InverterToLoad => "Inverter to Load (kW)",
            FlowKind::InverterToGrid => "Inverter to Grid (kW)",
            FlowKind::InverterToEv => "Inverter to EV (kW)",
            FlowKind::BatteryPower => "Battery Power (kW)",
            FlowKind::GridToLoad => "Grid to Load (kW)",
            FlowKind::GridToEv => "Grid to EV (kW)",
            FlowKind::EvToLoad => "EV to Load (kW)",
            FlowKind::EvToGrid => "EV to Grid (kW)",
        }
    }
}

/// Instantaneous balance of one meter, decomposed into directed flows.
///
/// All directed flows are non-negative; aggregates keep their device sign
/// conventions (inverter export positive, EV import positive).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EnergyFlows {
    pub load_kw: f64,
    pub inverter_kw: f64,
    pub ev_kw: f64,
    pub battery_kw: f64,
    /// Net power to the grid: `inverter - ev - load`, export positive.
    pub net_grid_kw: f64,
    pub inverter_to_load_kw: f64,
    pub inverter_to_grid_kw: f64,
    pub inverter_to_ev_kw: f64,
    pub ev_to_load_kw: f64,
    pub ev_to_inverter_kw: f64,
    pub ev_to_grid_kw: f64,
    pub grid_to_load_kw: f64,
    pub grid_to_ev_kw: f64,
}

impl EnergyFlows {
    /// Value of one reported category.
    pub fn value(&self, kind: FlowKind) -> f64 {
        match kind {
            FlowKind::LoadPower => self.load_kw,
            FlowKind::InverterPower => self.inverter_kw,
            FlowKind::EvPower => self.ev_kw,
            FlowKind::InverterToLoad => self.inverter_to_load_kw,
            FlowKind::InverterToGrid => self.inverter_to_grid_kw,
            FlowKind::InverterToEv => self.inverter_to_ev_kw,
            FlowKind::BatteryPower => self.battery_kw,
            FlowKind::GridToLoad => self.grid_to_load_kw,
            FlowKind::GridToEv => self.grid_to_ev_kw,
            FlowKind::EvToLoad => self.ev_to_load_kw,
            FlowKind::EvToGrid => self.ev_to_grid_kw,
        }
    }
}

/// Aggregates a set of loads, inverter-bearing systems and EVs behind one
/// common coupling point.
///
/// The meter is weakly coupled: it stores fleet indices and reads the CERs
/// through a shared borrow. It never mutates them.
#[derive(Debug, Clone)]
pub struct Meter {
    label: CircuitLabel,
    loads: Vec<usize>,
    inverters: Vec<usize>,
    evs: Vec<usize>,
}

impl Meter {
    /// Creates an empty meter for a circuit label.
    pub fn new(label: CircuitLabel) -> Self {
        Self {
            label,
            loads: Vec::new(),
            inverters: Vec::new(),
            evs: Vec::new(),
        }
    }

    /// Circuit label of the coupling point.
    pub fn label(&self) -> CircuitLabel {
        self.label
    }

    /// Registers a load CER by fleet index.
    pub fn add_load(&mut self, idx: usize) {
        self.loads.push(idx);
    }

    /// Registers a PV or hybrid CER by fleet index.
    pub fn add_inverter(&mut self, idx: usize) {
        self.inverters.push(idx);
    }

    /// Registers an EV CER by fleet index.
    pub fn add_ev(&mut self, idx: usize) {
        self.evs.push(idx);
    }

    /// All member indices, in registration order.
    pub fn members(&self) -> impl Iterator<Item = &usize> {
        self.loads.iter().chain(&self.inverters).chain(&self.evs)
    }

    pub fn has_loads(&self) -> bool {
        !self.loads.is_empty()
    }

    pub fn has_inverters(&self) -> bool {
        !self.inverters.is_empty()
    }

    pub fn has_evs(&self) -> bool {
        !self.evs.is_empty()
    }

    fn has_hybrid(&self, cers: &[Cer]) -> bool {
        self.inverters
            .iter()
            .any(|&i| matches!(cers[i], Cer::HybridPv(_)))
    }

    /// Total load draw behind the meter (kW, >= 0).
    pub fn total_load_kw(&self, cers: &[Cer]) -> f64 {
        self.loads
            .iter()
            .map(|&i| match &cers[i] {
                Cer::Load(load) => load.p_in(),
                _ => 0.0,
            })
            .sum()
    }

    /// Total inverter grid-port power (kW, export positive).
    pub fn total_inverter_kw(&self, cers: &[Cer]) -> f64 {
        self.inverters
            .iter()
            .map(|&i| match &cers[i] {
                Cer::Pv(pv) => pv.p_out(),
                Cer::HybridPv(hybrid) => hybrid.p_out(),
                _ => 0.0,
            })
            .sum()
    }

    /// Total EV grid-port power (kW, import positive).
    pub fn total_ev_kw(&self, cers: &[Cer]) -> f64 {
        self.evs
            .iter()
            .map(|&i| match &cers[i] {
                Cer::Ev(ev) => ev.p_in(),
                _ => 0.0,
            })
            .sum()
    }

    /// Total battery flow of hybrid systems behind the meter (kW, charging
    /// positive).
    pub fn battery_power_kw(&self, cers: &[Cer]) -> f64 {
        self.inverters
            .iter()
            .map(|&i| match &cers[i] {
                Cer::HybridPv(hybrid) => hybrid.battery_power_kw(),
                _ => 0.0,
            })
            .sum()
    }

    /// Net power to the grid (kW, export positive).
    pub fn net_grid_kw(&self, cers: &[Cer]) -> f64 {
        self.total_inverter_kw(cers) - self.total_ev_kw(cers) - self.total_load_kw(cers)
    }

    /// Decomposes the instantaneous balance into directed flows, computed
    /// greedily: inverter output serves local load first, then EV charging,
    /// then the grid; EV discharge serves load, then importing inverters,
    /// then the grid; the grid covers what remains.
    pub fn flows(&self, cers: &[Cer]) -> EnergyFlows {
        let load = self.total_load_kw(cers);
        let inv = self.total_inverter_kw(cers);
        let ev = self.total_ev_kw(cers);
        let net = inv - ev - load;

        let inverter_to_load = inv.max(0.0).min(load);
        let remaining_inv = (inv - inverter_to_load).max(0.0);
        let inverter_to_ev = if ev < 0.0 {
            0.0
        } else {
            remaining_inv.min(ev)
        };
        let inverter_to_grid = if net > 0.0 {
            (inv - inverter_to_load - inverter_to_ev).max(0.0)
        } else {
            0.0
        };

        let ev_discharge = (-ev).max(0.0);
        let ev_to_load = ev_discharge.min((load - inverter_to_load).max(0.0));
        let ev_to_inverter = if inv >= 0.0 {
            0.0
        } else {
            (ev_discharge - ev_to_load).max(0.0).min(-inv)
        };
        let ev_to_grid = if net > 0.0 {
            (ev_discharge - ev_to_load - ev_to_inverter).max(0.0)
        } else {
            0.0
        };

        let grid_to_load = if net < 0.0 {
            (load - inverter_to_load - ev_to_load).max(0.0)
        } else {
            0.0
        };
        let grid_to_ev = if ev < 0.0 || net >= 0.0 {
            0.0
        } else {
            (ev - inverter_to_ev).max(0.0)
        };

        EnergyFlows {
            load_kw: load,
            inverter_kw: inv,
            ev_kw: ev,
            battery_kw: self.battery_power_kw(cers),
            net_grid_kw: net,
            inverter_to_load_kw: inverter_to_load,
            inverter_to_grid_kw: inverter_to_grid,
            inverter_to_ev_kw: inverter_to_ev,
            ev_to_load_kw: ev_to_load,
            ev_to_inverter_kw: ev_to_inverter,
            ev_to_grid_kw: ev_to_grid,
            grid_to_load_kw: grid_to_load,
            grid_to_ev_kw: grid_to_ev,
        }
    }

    /// Categories applicable to this meter's device set, in export order.
    pub fn applicable_columns(&self, cers: &[Cer]) -> Vec<FlowKind> {
        let mut columns = Vec::new();
        if self.has_loads() {
            columns.push(FlowKind::LoadPower);
        }
        if self.has_inverters() {
            columns.push(FlowKind::InverterPower);
            if self.has_hybrid(cers) {
                columns.push(FlowKind::BatteryPower);
            }
        }
        if self.has_evs() {
            columns.push(FlowKind::EvPower);
        }
        if self.has_inverters() && self.has_loads() {
            columns.push(FlowKind::InverterToLoad);
        }
        if self.has_inverters() {
            columns.push(FlowKind::InverterToGrid);
        }
        if self.has_inverters() && self.has_evs() {
            columns.push(FlowKind::InverterToEv);
        }
        if self.has_loads() {
            columns.push(FlowKind::GridToLoad);
        }
        if self.has_evs() {
            columns.push(FlowKind::GridToEv);
        }
        if self.has_evs() && self.has_loads() {
            columns.push(FlowKind::EvToLoad);
        }
        if self.has_evs() {
            columns.push(FlowKind::EvToGrid);
        }
        columns
    }
}
