//! The closed CER sum type and the fleet container the engine iterates.

use crate::devices::ev_system::EvSystem;
use crate::devices::load::Load;
use crate::devices::meter::Meter;
use crate::devices::pv_system::{HybridPvSystem, PvSystem};
use crate::devices::types::CerContext;
use crate::error::SimError;

/// Integer label tying a CER to its injection point on the circuit.
pub type CircuitLabel = usize;

/// Any customer energy resource connected to the feeder.
///
/// The engine dispatches over this closed set in four places: input
/// updates, stepping, curtailment accounting and meter wiring. Output
/// conventions follow the device kind — loads and EVs report grid *draw*
/// (`p_in`, import positive), PV and hybrid systems report grid *export*
/// (`p_out`, export positive).
#[derive(Debug, Clone)]
pub enum Cer {
    Load(Load),
    Pv(PvSystem),
    HybridPv(HybridPvSystem),
    Ev(EvSystem),
}

impl Cer {
    /// Loads exogenous inputs; no circuit side-effects.
    pub fn update(&mut self, ctx: &CerContext) {
        match self {
            Cer::Load(load) => load.update(ctx),
            Cer::Pv(pv) => pv.update(ctx),
            Cer::HybridPv(hybrid) => hybrid.update(ctx),
            Cer::Ev(ev) => ev.update(ctx),
        }
    }

    /// Evaluates grid-port power for the stored inputs, returning `(p, q)`
    /// in the device's own convention. Storage-bearing CERs stage their SOC
    /// advance; nothing is committed here.
    pub fn step(&mut self, t: usize) -> (f64, f64) {
        match self {
            Cer::Load(load) => load.step(),
            Cer::Pv(pv) => pv.step(),
            Cer::HybridPv(hybrid) => hybrid.step(t),
            Cer::Ev(ev) => ev.step(t),
        }
    }

    /// Applies any staged SOC advance. Called once per timestep, after the
    /// convergence loop.
    pub fn commit_storage(&mut self) {
        match self {
            Cer::HybridPv(hybrid) => hybrid.commit_storage(),
            Cer::Ev(ev) => ev.commit_storage(),
            Cer::Load(_) | Cer::Pv(_) => {}
        }
    }

    /// Last evaluated grid-port power in the device's own convention.
    pub fn output(&self) -> (f64, f64) {
        match self {
            Cer::Load(load) => (load.p_in(), load.q_in()),
            Cer::Pv(pv) => (pv.p_out(), pv.q_out()),
            Cer::HybridPv(hybrid) => (hybrid.p_out(), hybrid.q_out()),
            Cer::Ev(ev) => (ev.p_in(), ev.q_in()),
        }
    }

    /// Last terminal voltage loaded into the device (pu).
    pub fn volt_pu(&self) -> f64 {
        match self {
            Cer::Load(load) => load.volt_pu(),
            Cer::Pv(pv) => pv.volt_pu(),
            Cer::HybridPv(hybrid) => hybrid.volt_pu(),
            Cer::Ev(ev) => ev.volt_pu(),
        }
    }

    /// Sign applied to `(p, q)` when pushing the operating point to the
    /// oracle, which expects load convention: exporters enter negated.
    pub fn injection_sign(&self) -> f64 {
        match self {
            Cer::Load(_) | Cer::Ev(_) => 1.0,
            Cer::Pv(_) | Cer::HybridPv(_) => -1.0,
        }
    }

    /// True when the engine should relax this CER's active power: an
    /// inverter-bearing CER with Volt-Watt enabled.
    pub fn p_active(&self) -> bool {
        match self {
            Cer::Load(_) => false,
            Cer::Pv(pv) => pv.inverter().settings().vw_enabled(),
            Cer::HybridPv(hybrid) => hybrid.inverter().inner().settings().vw_enabled(),
            Cer::Ev(ev) => ev.inverter().inner().settings().vw_enabled(),
        }
    }

    /// True when the engine should relax this CER's reactive power: an
    /// inverter-bearing CER with Volt-VAr enabled.
    pub fn q_active(&self) -> bool {
        match self {
            Cer::Load(_) => false,
            Cer::Pv(pv) => pv.inverter().settings().vv_enabled(),
            Cer::HybridPv(hybrid) => hybrid.inverter().inner().settings().vv_enabled(),
            Cer::Ev(ev) => ev.inverter().inner().settings().vv_enabled(),
        }
    }

    /// Short kind tag used in register keys and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Cer::Load(_) => "load",
            Cer::Pv(_) => "pv",
            Cer::HybridPv(_) => "hybridpv",
            Cer::Ev(_) => "ev",
        }
    }
}

/// The full CER population of a scenario, with labels and meter wiring.
///
/// Meters hold indices into `cers` rather than references: they read the
/// fleet through a shared borrow and never mutate it.
#[derive(Debug, Clone)]
pub struct CerFleet {
    /// All CERs, in engine iteration order.
    pub cers: Vec<Cer>,
    /// Circuit label of each CER, parallel to `cers`.
    pub labels: Vec<CircuitLabel>,
    /// Meters behind which CER subsets are aggregated.
    pub meters: Vec<Meter>,
    meter_of: Vec<Option<usize>>,
}

impl CerFleet {
    /// Creates a fleet from parallel CER and label vectors.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the vectors differ in length or a
    /// label repeats.
    pub fn new(cers: Vec<Cer>, labels: Vec<CircuitLabel>) -> Result<Self, SimError> {
        if cers.len() != labels.len() {
            return Err(SimError::configuration(
                "fleet",
                format!("{} CERs but {} labels", cers.len(), labels.len()),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for (i, &label) in labels.iter().enumerate() {
            // The same label may host a load plus a generator, but not two
            // CERs of the same kind.
            if !seen.insert((label, cers[i].kind())) {
                return Err(SimError::configuration(
                    "fleet",
                    format!("duplicate {} at circuit label {label}", cers[i].kind()),
                ));
            }
        }
        let meter_of = vec![None; cers.len()];
        Ok(Self {
            cers,
            labels,
            meters: Vec::new(),
            meter_of,
        })
    }

    /// Number of CERs in the fleet.
    pub fn len(&self) -> usize {
        self.cers.len()
    }

    /// True when the fleet holds no CERs.
    pub fn is_empty(&self) -> bool {
        self.cers.is_empty()
    }

    /// Registers a meter; its member indices must refer into this fleet.
    pub fn add_meter(&mut self, meter: Meter) -> Result<(), SimError> {
        let meter_idx = self.meters.len();
        for &i in meter.members() {
            if i >= self.cers.len() {
                return Err(SimError::configuration(
                    "meter",
                    format!("member index {i} out of range"),
                ));
            }
            self.meter_of[i] = Some(meter_idx);
        }
        self.meters.push(meter);
        Ok(())
    }

    /// Meter serving the CER at `idx`, when one exists.
    pub fn meter_of(&self, idx: usize) -> Option<&Meter> {
        self.meter_of[idx].map(|m| &self.meters[m])
    }

    /// AC demand a hybrid system at `idx` must cover: its meter's load plus
    /// any EV charge draw, zero without a meter.
    pub fn local_demand_kw(&self, idx: usize) -> f64 {
        match self.meter_of(idx) {
            Some(meter) => {
                meter.total_load_kw(&self.cers) + meter.total_ev_kw(&self.cers).max(0.0)
            }
            None => 0.0,
        }
    }

    /// Index of the first CER with the given label and kind tag.
    pub fn find(&self, label: CircuitLabel, kind: &str) -> Option<usize> {
        self.cers
            .iter()
            .zip(&self.labels)
            .position(|(cer, &l)| l == label && cer.kind() == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reports_import_sign() {
        let cer = Cer::Load(Load::new());
        assert_eq!(cer.injection_sign(), 1.0);
        assert_eq!(cer.kind(), "load");
        assert!(!cer.p_active());
        assert!(!cer.q_active());
    }

    #[test]
    fn fleet_rejects_duplicate_kind_at_label() {
        let cers = vec![Cer::Load(Load::new()), Cer::Load(Load::new())];
        assert!(CerFleet::new(cers, vec![1, 1]).is_err());
    }

    #[test]
    fn fleet_allows_load_and_generator_at_same_label() {
        use crate::devices::inverter::{Inverter, InverterSettings};
        use crate::devices::pv_panel::PvPanels;
        let pv = PvSystem::new(
            PvPanels::with_default_derating(7.2).expect("panels"),
            Inverter::with_defaults(6.0, InverterSettings::new()).expect("inverter"),
        );
        let cers = vec![Cer::Load(Load::new()), Cer::Pv(pv)];
        assert!(CerFleet::new(cers, vec![1, 1]).is_ok());
    }

    #[test]
    fn fleet_rejects_length_mismatch() {
        assert!(CerFleet::new(vec![Cer::Load(Load::new())], vec![1, 2]).is_err());
    }
}
